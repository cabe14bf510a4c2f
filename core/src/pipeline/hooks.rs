// verdant/src/pipeline/hooks.rs

//! Registration of `before`, `on` and `after` handlers.

use super::context_data::ContextData;
use super::control::PipelineControl;
use super::definition::{Handler, Pipeline};
use crate::error::PipelineError;
use std::collections::HashMap;
use std::future::Future;

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  pub fn before<F, E>(&mut self, step_name: &str, handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    push_handler(&mut self.before, step_name, wrap(handler_fn));
  }

  pub fn on<F, E>(&mut self, step_name: &str, handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    push_handler(&mut self.on, step_name, wrap(handler_fn));
  }

  pub fn after<F, E>(&mut self, step_name: &str, handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    push_handler(&mut self.after, step_name, wrap(handler_fn));
  }
}

fn wrap<TData, Err, F, E>(handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static) -> Handler<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: 'static,
  F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
  E: Into<Err> + Send + Sync + 'static,
{
  Box::new(move |ctx_data| {
    let fut = handler_fn(ctx_data);
    Box::pin(async move { fut.await.map_err(Into::into) })
  })
}

fn push_handler<TData: Send + Sync + 'static, Err>(
  phase: &mut HashMap<String, Vec<Handler<TData, Err>>>,
  step_name: &str,
  handler: Handler<TData, Err>,
) {
  phase.entry(step_name.to_string()).or_default().push(handler);
}
