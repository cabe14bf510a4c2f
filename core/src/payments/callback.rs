// verdant/src/payments/callback.rs

//! Gateway callback processing: filter, verify, extract, settle.

use crate::error::CommerceError;
use crate::gateway::vnpay::IpnCode;
use crate::gateway::{CallbackParams, CallbackResult, GatewayKind, PaymentGateway};
use crate::pipeline::{ContextData, Pipeline, PipelineControl};
use crate::models::TransactionStatus;
use crate::wallet::{TopUpConfirmation, WalletLedger};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const CALLBACK_PIPELINE: &str = "payment_callback";

/// Which delivery path a callback arrived on. Both are processed identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackChannel {
  /// Browser redirect back from the gateway.
  Return,
  /// Server-to-server notification.
  Ipn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
  Credited,
  /// The gateway reported a failed or abandoned payment.
  PaymentFailed,
  /// A repeat delivery for a top-up the ledger already credited.
  AlreadyCredited,
  /// A repeat delivery for a top-up the ledger already marked failed. Nothing is credited.
  AlreadyFailed,
  InvalidSignature,
  UnknownTransaction,
  AmountMismatch,
  Rejected(String),
}

/// What the gateway expects back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "gateway", rename_all = "lowercase")]
pub enum GatewayAck {
  #[serde(rename = "vnpay")]
  VnPay {
    #[serde(rename = "RspCode")]
    rsp_code: &'static str,
    #[serde(rename = "Message")]
    message: &'static str,
  },
  #[serde(rename = "momo")]
  MoMo {
    #[serde(rename = "httpStatus")]
    http_status: u16,
  },
}

impl GatewayAck {
  pub fn for_status(gateway: GatewayKind, status: &CallbackStatus) -> Self {
    match gateway {
      GatewayKind::VnPay => {
        let code = match status {
          CallbackStatus::Credited | CallbackStatus::PaymentFailed => IpnCode::Confirmed,
          CallbackStatus::AlreadyCredited | CallbackStatus::AlreadyFailed => IpnCode::AlreadyConfirmed,
          CallbackStatus::InvalidSignature => IpnCode::InvalidSignature,
          CallbackStatus::UnknownTransaction => IpnCode::OrderNotFound,
          CallbackStatus::AmountMismatch => IpnCode::InvalidAmount,
          CallbackStatus::Rejected(_) => IpnCode::Unknown,
        };
        Self::VnPay {
          rsp_code: code.rsp_code(),
          message: code.message(),
        }
      }
      GatewayKind::MoMo => {
        let http_status = match status {
          CallbackStatus::Credited
          | CallbackStatus::PaymentFailed
          | CallbackStatus::AlreadyCredited
          | CallbackStatus::AlreadyFailed => 204,
          _ => 400,
        };
        Self::MoMo { http_status }
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackOutcome {
  pub gateway: GatewayKind,
  pub channel: CallbackChannel,
  pub status: CallbackStatus,
  pub result: Option<CallbackResult>,
  pub ack: GatewayAck,
}

impl CallbackOutcome {
  pub(crate) fn new(gateway: GatewayKind, channel: CallbackChannel, status: CallbackStatus, result: Option<CallbackResult>) -> Self {
    let ack = GatewayAck::for_status(gateway, &status);
    Self {
      gateway,
      channel,
      status,
      result,
      ack,
    }
  }

  /// True when the ledger row behind this callback is a settled credit.
  pub fn is_credited(&self) -> bool {
    matches!(self.status, CallbackStatus::Credited | CallbackStatus::AlreadyCredited)
  }
}

#[derive(Clone)]
pub struct CallbackCtx {
  pub gateway: Arc<PaymentGateway>,
  pub ledger: Arc<WalletLedger>,
  pub raw: HashMap<String, String>,
  pub params: CallbackParams,
  pub result: Option<CallbackResult>,
  pub status: Option<CallbackStatus>,
}

impl CallbackCtx {
  pub fn new(gateway: Arc<PaymentGateway>, ledger: Arc<WalletLedger>, raw: HashMap<String, String>) -> Self {
    Self {
      gateway,
      ledger,
      raw,
      params: CallbackParams::new(),
      result: None,
      status: None,
    }
  }

  fn halt(&mut self, status: CallbackStatus) -> PipelineControl {
    self.status = Some(status);
    PipelineControl::Stop
  }
}

pub(crate) fn build_callback_pipeline() -> Pipeline<CallbackCtx, CommerceError> {
  let mut p = Pipeline::<CallbackCtx, CommerceError>::new(
    CALLBACK_PIPELINE,
    &[
      ("filter_params", false, None),
      ("verify_signature", false, None),
      ("extract_result", false, None),
      ("settle_ledger", false, None),
    ],
  );

  p.on("filter_params", |ctx_data: ContextData<CallbackCtx>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let ctx = &mut *guard;
      ctx.params = ctx.gateway.parse_callback_params(&ctx.raw);
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.on("verify_signature", |ctx_data: ContextData<CallbackCtx>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let ctx = &mut *guard;
      if ctx.gateway.verify_callback(&ctx.params) {
        return Ok::<_, CommerceError>(PipelineControl::Continue);
      }
      warn!(gateway = %ctx.gateway.kind(), "callback failed verification");
      Ok(ctx.halt(CallbackStatus::InvalidSignature))
    })
  });

  p.on("extract_result", |ctx_data: ContextData<CallbackCtx>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let ctx = &mut *guard;
      match ctx.gateway.extract_callback_result(&ctx.params) {
        Ok(result) => {
          ctx.result = Some(result);
          Ok::<_, CommerceError>(PipelineControl::Continue)
        }
        Err(e) => Ok(ctx.halt(CallbackStatus::Rejected(e.to_string()))),
      }
    })
  });

  p.on("settle_ledger", |ctx_data: ContextData<CallbackCtx>| {
    Box::pin(async move {
      let (ledger, result) = {
        let guard = ctx_data.read();
        (guard.ledger.clone(), guard.result.clone())
      };
      let Some(result) = result else {
        return Ok::<_, CommerceError>(ctx_data.write().halt(CallbackStatus::Rejected("no callback result".to_string())));
      };
      let status = settle(&ledger, &result).await?;
      info!(gateway_transaction_id = %result.gateway_transaction_id, ?status, "callback settled");
      ctx_data.write().status = Some(status);
      Ok(PipelineControl::Continue)
    })
  });

  p
}

async fn settle(ledger: &WalletLedger, result: &CallbackResult) -> Result<CallbackStatus, CommerceError> {
  let txn_id = result.gateway_transaction_id.as_str();
  let Some(row) = ledger.top_up_by_gateway_id(txn_id).await? else {
    warn!(gateway_transaction_id = %txn_id, "callback for an unknown transaction");
    return Ok(CallbackStatus::UnknownTransaction);
  };
  if row.amount != result.amount {
    warn!(gateway_transaction_id = %txn_id, recorded = row.amount, reported = result.amount, "callback amount mismatch");
    return Ok(CallbackStatus::AmountMismatch);
  }
  match row.status {
    TransactionStatus::Success => return Ok(CallbackStatus::AlreadyCredited),
    TransactionStatus::Failed => return Ok(CallbackStatus::AlreadyFailed),
    TransactionStatus::Pending => {}
  }

  if result.is_success {
    match ledger.confirm_top_up_by_gateway_id(txn_id, result.amount).await {
      Ok(TopUpConfirmation::Confirmed(_)) => Ok(CallbackStatus::Credited),
      Ok(TopUpConfirmation::AlreadyConfirmed(_)) => Ok(CallbackStatus::AlreadyCredited),
      // Another delivery failed the row between the read above and the confirm.
      Err(CommerceError::InvalidState(_)) => Ok(CallbackStatus::AlreadyFailed),
      Err(e) => Err(e),
    }
  } else {
    let settled = ledger.fail_top_up(txn_id).await?;
    Ok(match settled.status {
      TransactionStatus::Success => CallbackStatus::AlreadyCredited,
      _ => CallbackStatus::PaymentFailed,
    })
  }
}
