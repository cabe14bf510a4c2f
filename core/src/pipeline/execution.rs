// verdant/src/pipeline/execution.rs

//! `Pipeline::run`.

use super::context_data::ContextData;
use super::control::{PipelineControl, PipelineResult};
use super::definition::{Handler, Pipeline};
use crate::error::PipelineError;
use tracing::{event, instrument, Instrument, Level};

enum PhaseOutcome {
  Continue,
  Stopped,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Runs every step in order against `ctx_data`.
  ///
  /// A non-optional step without handlers fails with
  /// [`PipelineError::HandlerMissing`], converted into `Err`.
  #[instrument(name = "pipeline::run", skip_all, fields(pipeline = %self.name, num_steps = self.steps.len()), err(Display))]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "pipeline starting");

    for (step_index, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();
      let step_span = tracing::debug_span!("pipeline_step", step = step_name, step_index);

      if let Some(skip_if) = &step_def.skip_if {
        if skip_if(&ctx_data) {
          event!(parent: &step_span, Level::DEBUG, "step skipped by condition");
          continue;
        }
      }

      if !self.has_handlers(step_name) {
        if step_def.optional {
          continue;
        }
        event!(parent: &step_span, Level::ERROR, "non-optional step has no handlers");
        return Err(Err::from(PipelineError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      }

      for (phase, handlers) in [("before", self.before.get(step_name)), ("on", self.on.get(step_name)), ("after", self.after.get(step_name))] {
        let Some(handlers) = handlers else { continue };
        let outcome = run_phase(handlers, &ctx_data, phase).instrument(step_span.clone()).await?;
        if let PhaseOutcome::Stopped = outcome {
          event!(parent: &step_span, Level::INFO, phase, "pipeline stopped by handler");
          return Ok(PipelineResult::Stopped);
        }
      }
    }

    event!(Level::DEBUG, "pipeline completed");
    Ok(PipelineResult::Completed)
  }
}

async fn run_phase<TData, Err>(
  handlers: &[Handler<TData, Err>],
  ctx_data: &ContextData<TData>,
  phase: &'static str,
) -> Result<PhaseOutcome, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + Send + Sync + 'static,
{
  for handler_fn in handlers {
    match handler_fn(ctx_data.clone()).await {
      Ok(PipelineControl::Continue) => {}
      Ok(PipelineControl::Stop) => return Ok(PhaseOutcome::Stopped),
      Err(e) => {
        event!(Level::WARN, phase, error = %e, "handler failed");
        return Err(e);
      }
    }
  }
  Ok(PhaseOutcome::Continue)
}
