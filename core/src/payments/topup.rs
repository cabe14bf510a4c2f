// verdant/src/payments/topup.rs
use super::callback::{build_callback_pipeline, CallbackChannel, CallbackCtx, CallbackOutcome, CallbackStatus};
use crate::error::{CommerceError, CommerceResult, StoreError};
use crate::gateway::{GatewayKind, GatewayRegistry, PaymentInitResult, PaymentRequest};
use crate::models::Money;
use crate::pipeline::{ContextData, Pipeline, PipelineResult};
use crate::store::{LedgerStore, MAX_COMMIT_ATTEMPTS};
use crate::wallet::WalletLedger;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

fn default_min_amount() -> Money {
  10_000
}
fn default_max_amount() -> Money {
  50_000_000
}

/// Bounds on a single top-up, in đồng.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TopUpLimits {
  #[serde(default = "default_min_amount")]
  pub min_amount: Money,
  #[serde(default = "default_max_amount")]
  pub max_amount: Money,
}

impl Default for TopUpLimits {
  fn default() -> Self {
    Self {
      min_amount: default_min_amount(),
      max_amount: default_max_amount(),
    }
  }
}

pub struct TopUpService {
  store: Arc<dyn LedgerStore>,
  ledger: Arc<WalletLedger>,
  gateways: Arc<GatewayRegistry>,
  limits: TopUpLimits,
  callbacks: Pipeline<CallbackCtx, CommerceError>,
}

impl TopUpService {
  pub fn new(store: Arc<dyn LedgerStore>, ledger: Arc<WalletLedger>, gateways: Arc<GatewayRegistry>, limits: TopUpLimits) -> Self {
    Self {
      store,
      ledger,
      gateways,
      limits,
      callbacks: build_callback_pipeline(),
    }
  }

  pub fn gateways(&self) -> &GatewayRegistry {
    &self.gateways
  }

  /// Starts a gateway payment and records the PENDING top-up it will settle.
  /// A gateway failure leaves nothing behind.
  #[instrument(name = "topup::begin", skip_all, fields(%user_id, %gateway, amount), err(Display))]
  pub async fn begin_top_up(
    &self,
    user_id: Uuid,
    gateway: GatewayKind,
    amount: Money,
    client_ip: Option<String>,
  ) -> CommerceResult<PaymentInitResult> {
    if amount < self.limits.min_amount || amount > self.limits.max_amount {
      return Err(CommerceError::Validation(format!(
        "top-up amount must be between {} and {}",
        self.limits.min_amount, self.limits.max_amount
      )));
    }
    self.store.customer(user_id).await?.ok_or(CommerceError::UserNotFound(user_id))?;
    let adapter = self.gateways.get(gateway)?;

    let request = PaymentRequest {
      user_id,
      amount,
      description: format!("Nap tien vao vi {}", amount),
      client_ip,
    };
    let mut attempt = 1;
    loop {
      let init = adapter.create_payment(&request).await?;
      match self
        .ledger
        .record_pending_top_up(user_id, amount, gateway, &init.gateway_transaction_id, &request.description)
        .await
      {
        Ok(_) => {
          info!(gateway_transaction_id = %init.gateway_transaction_id, "top-up started");
          return Ok(init);
        }
        Err(CommerceError::Store(StoreError::DuplicateGatewayTransaction(taken))) if attempt < MAX_COMMIT_ATTEMPTS => {
          warn!(gateway_transaction_id = %taken, attempt, "gateway transaction id collision, regenerating");
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }

  /// Processes a return or IPN callback. Never fails: every problem is
  /// reported through the outcome and its gateway acknowledgement.
  #[instrument(name = "topup::callback", skip_all, fields(%gateway, ?channel))]
  pub async fn handle_callback(
    &self,
    gateway: GatewayKind,
    channel: CallbackChannel,
    params: HashMap<String, String>,
  ) -> CallbackOutcome {
    let adapter = match self.gateways.get(gateway) {
      Ok(adapter) => adapter,
      Err(e) => return CallbackOutcome::new(gateway, channel, CallbackStatus::Rejected(e.to_string()), None),
    };

    let ctx_data = ContextData::new(CallbackCtx::new(adapter, self.ledger.clone(), params));
    let run = self.callbacks.run(ctx_data.clone()).await;
    let ctx = ctx_data.into_inner();

    let status = match run {
      Ok(PipelineResult::Completed) | Ok(PipelineResult::Stopped) => ctx
        .status
        .unwrap_or_else(|| CallbackStatus::Rejected("callback was not settled".to_string())),
      Err(e) => {
        error!(error = %e, "callback processing failed");
        CallbackStatus::Rejected(e.to_string())
      }
    };
    CallbackOutcome::new(gateway, channel, status, ctx.result)
  }
}
