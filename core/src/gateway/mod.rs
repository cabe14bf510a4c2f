// verdant/src/gateway/mod.rs

//! Payment gateway adapters.
//!
//! The set of gateways is closed: [`PaymentGateway`] is a tagged enum over the
//! VNPay and MoMo adapters, each with its own signing rules, behind one set of
//! operations: create a signed payment, verify a callback, filter callback
//! parameters, and normalise a callback into a [`CallbackResult`].

pub mod momo;
pub mod registry;
pub mod signing;
pub mod vnpay;

pub use momo::{MoMoConfig, MoMoGateway};
pub use registry::GatewayRegistry;
pub use vnpay::{VnPayConfig, VnPayGateway};

use crate::error::CommerceResult;
use crate::models::{Money, UnknownLabel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Gateway-prefixed callback parameters, sorted by key.
pub type CallbackParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
  VnPay,
  MoMo,
}

impl GatewayKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::VnPay => "vnpay",
      Self::MoMo => "momo",
    }
  }
}

impl fmt::Display for GatewayKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for GatewayKind {
  type Err = UnknownLabel;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "vnpay" => Ok(Self::VnPay),
      "momo" => Ok(Self::MoMo),
      _ => Err(UnknownLabel {
        kind: "payment gateway",
        label: s.to_string(),
      }),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
  pub user_id: Uuid,
  pub amount: Money,
  pub description: String,
  /// Customer address forwarded to gateways that require it.
  pub client_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitResult {
  pub gateway_transaction_id: String,
  pub pay_url: String,
}

/// Gateway-agnostic view of a return or IPN callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResult {
  pub is_success: bool,
  pub gateway_transaction_id: String,
  pub amount: Money,
  pub message: String,
}

#[derive(Debug, Clone)]
pub enum PaymentGateway {
  VnPay(VnPayGateway),
  MoMo(MoMoGateway),
}

impl PaymentGateway {
  pub fn kind(&self) -> GatewayKind {
    match self {
      Self::VnPay(_) => GatewayKind::VnPay,
      Self::MoMo(_) => GatewayKind::MoMo,
    }
  }

  pub async fn create_payment(&self, request: &PaymentRequest) -> CommerceResult<PaymentInitResult> {
    match self {
      Self::VnPay(g) => g.create_payment(request),
      Self::MoMo(g) => g.create_payment(request).await,
    }
  }

  pub fn verify_callback(&self, params: &CallbackParams) -> bool {
    match self {
      Self::VnPay(g) => g.verify_callback(params),
      Self::MoMo(g) => g.verify_callback(params),
    }
  }

  pub fn parse_callback_params(&self, all_params: &HashMap<String, String>) -> CallbackParams {
    match self {
      Self::VnPay(g) => g.parse_callback_params(all_params),
      Self::MoMo(g) => g.parse_callback_params(all_params),
    }
  }

  pub fn extract_callback_result(&self, params: &CallbackParams) -> CommerceResult<CallbackResult> {
    match self {
      Self::VnPay(g) => g.extract_callback_result(params),
      Self::MoMo(g) => g.extract_callback_result(params),
    }
  }
}

pub(crate) fn require_param<'a>(params: &'a CallbackParams, key: &str, gateway: GatewayKind) -> CommerceResult<&'a str> {
  params
    .get(key)
    .map(String::as_str)
    .filter(|v| !v.trim().is_empty())
    .ok_or_else(|| crate::error::CommerceError::Gateway(format!("{} callback is missing '{}'", gateway, key)))
}
