// verdant/src/gateway/momo.rs

//! MoMo: server-to-server create request signed with HMAC-SHA256.

use super::signing::hmac_sha256_hex;
use super::{require_param, CallbackParams, CallbackResult, GatewayKind, PaymentInitResult, PaymentRequest};
use crate::error::{CommerceError, CommerceResult};
use crate::models::Money;
use crate::orders::number::tie_breaker;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

const CALLBACK_KEYS: &[&str] = &[
  "partnerCode",
  "orderId",
  "requestId",
  "amount",
  "orderInfo",
  "orderType",
  "transId",
  "resultCode",
  "message",
  "payType",
  "responseTime",
  "extraData",
  "signature",
];

const REQUIRED_CALLBACK_KEYS: &[&str] = &["partnerCode", "orderId", "requestId", "amount", "resultCode"];

fn default_request_type() -> String {
  "captureWallet".to_string()
}
fn default_lang() -> String {
  "vi".to_string()
}
fn default_timeout_secs() -> u64 {
  30
}

#[derive(Clone, Deserialize)]
pub struct MoMoConfig {
  pub partner_code: String,
  pub access_key: String,
  pub secret_key: String,
  pub endpoint: String,
  pub redirect_url: String,
  pub ipn_url: String,
  #[serde(default = "default_request_type")]
  pub request_type: String,
  #[serde(default = "default_lang")]
  pub lang: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl MoMoConfig {
  pub fn new(
    partner_code: &str,
    access_key: &str,
    secret_key: &str,
    endpoint: &str,
    redirect_url: &str,
    ipn_url: &str,
  ) -> Self {
    Self {
      partner_code: partner_code.to_string(),
      access_key: access_key.to_string(),
      secret_key: secret_key.to_string(),
      endpoint: endpoint.to_string(),
      redirect_url: redirect_url.to_string(),
      ipn_url: ipn_url.to_string(),
      request_type: default_request_type(),
      lang: default_lang(),
      timeout_secs: default_timeout_secs(),
    }
  }

  pub fn validate(&self) -> CommerceResult<()> {
    for (name, value) in [
      ("partner_code", &self.partner_code),
      ("access_key", &self.access_key),
      ("secret_key", &self.secret_key),
      ("endpoint", &self.endpoint),
      ("redirect_url", &self.redirect_url),
      ("ipn_url", &self.ipn_url),
    ] {
      if value.trim().is_empty() {
        return Err(CommerceError::Gateway(format!("MoMo configuration is missing '{}'", name)));
      }
    }
    Ok(())
  }
}

impl std::fmt::Debug for MoMoConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MoMoConfig")
      .field("partner_code", &self.partner_code)
      .field("access_key", &self.access_key)
      .field("secret_key", &"[REDACTED]")
      .field("endpoint", &self.endpoint)
      .finish()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoMoCreateRequest {
  pub partner_code: String,
  pub access_key: String,
  pub request_id: String,
  pub amount: String,
  pub order_id: String,
  pub order_info: String,
  pub redirect_url: String,
  pub ipn_url: String,
  pub extra_data: String,
  pub request_type: String,
  pub signature: String,
  pub lang: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoMoCreateResponse {
  pub result_code: i64,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub pay_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MoMoGateway {
  config: MoMoConfig,
  http: reqwest::Client,
}

impl MoMoGateway {
  pub fn new(config: MoMoConfig) -> CommerceResult<Self> {
    config.validate()?;
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| CommerceError::Gateway(format!("failed to build MoMo HTTP client: {}", e)))?;
    Ok(Self { config, http })
  }

  /// The signed request body for one payment attempt.
  pub fn build_create_request(&self, order_id: &str, request_id: &str, amount: Money, order_info: &str) -> MoMoCreateRequest {
    let extra_data = String::new();
    let raw_signature = format!(
      "accessKey={}&amount={}&extraData={}&ipnUrl={}&orderId={}&orderInfo={}&partnerCode={}&redirectUrl={}&requestId={}&requestType={}",
      self.config.access_key,
      amount,
      extra_data,
      self.config.ipn_url,
      order_id,
      order_info,
      self.config.partner_code,
      self.config.redirect_url,
      request_id,
      self.config.request_type,
    );
    MoMoCreateRequest {
      partner_code: self.config.partner_code.clone(),
      access_key: self.config.access_key.clone(),
      request_id: request_id.to_string(),
      amount: amount.to_string(),
      order_id: order_id.to_string(),
      order_info: order_info.to_string(),
      redirect_url: self.config.redirect_url.clone(),
      ipn_url: self.config.ipn_url.clone(),
      extra_data,
      request_type: self.config.request_type.clone(),
      signature: hmac_sha256_hex(&self.config.secret_key, &raw_signature),
      lang: self.config.lang.clone(),
    }
  }

  #[instrument(name = "momo::create_payment", skip(self, request), fields(user_id = %request.user_id, amount = request.amount))]
  pub async fn create_payment(&self, request: &PaymentRequest) -> CommerceResult<PaymentInitResult> {
    if request.amount <= 0 {
      return Err(CommerceError::Validation("payment amount must be positive".to_string()));
    }
    let order_id = format!("MOMO{}{:04}", Utc::now().timestamp_millis(), tie_breaker());
    let body = self.build_create_request(&order_id, &order_id, request.amount, &request.description);

    let response = self
      .http
      .post(&self.config.endpoint)
      .json(&body)
      .send()
      .await
      .map_err(|e| {
        error!(order_id = %order_id, error = %e, "MoMo create request failed");
        CommerceError::Gateway(format!("MoMo request failed: {}", e))
      })?;
    let parsed: MoMoCreateResponse = response
      .json()
      .await
      .map_err(|e| CommerceError::Gateway(format!("MoMo returned an unreadable response: {}", e)))?;

    let pay_url = parse_create_response(parsed)?;
    debug!(order_id = %order_id, "MoMo payment created");
    Ok(PaymentInitResult {
      gateway_transaction_id: order_id,
      pay_url,
    })
  }

  /// Presence check only. MoMo callbacks are not signature-verified yet.
  pub fn verify_callback(&self, params: &CallbackParams) -> bool {
    let missing: Vec<&str> = REQUIRED_CALLBACK_KEYS
      .iter()
      .copied()
      .filter(|k| params.get(*k).map_or(true, |v| v.trim().is_empty()))
      .collect();
    if !missing.is_empty() {
      warn!(?missing, "MoMo callback is missing required fields");
      return false;
    }
    true
  }

  pub fn parse_callback_params(&self, all_params: &HashMap<String, String>) -> CallbackParams {
    all_params
      .iter()
      .filter(|(k, _)| CALLBACK_KEYS.contains(&k.as_str()))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  pub fn extract_callback_result(&self, params: &CallbackParams) -> CommerceResult<CallbackResult> {
    let order_id = require_param(params, "orderId", GatewayKind::MoMo)?;
    let raw_amount = require_param(params, "amount", GatewayKind::MoMo)?;
    let amount: Money = raw_amount
      .parse()
      .map_err(|_| CommerceError::Gateway(format!("MoMo callback has malformed amount '{}'", raw_amount)))?;
    let result_code = params.get("resultCode").map(String::as_str).unwrap_or_default();
    let message = params.get("message").cloned().unwrap_or_default();

    Ok(CallbackResult {
      is_success: result_code == "0",
      gateway_transaction_id: order_id.to_string(),
      amount,
      message,
    })
  }
}

/// Maps a create response to the pay URL, or a gateway error carrying MoMo's message.
pub fn parse_create_response(response: MoMoCreateResponse) -> CommerceResult<String> {
  if response.result_code != 0 {
    return Err(CommerceError::Gateway(format!(
      "MoMo rejected the payment ({}): {}",
      response.result_code, response.message
    )));
  }
  response
    .pay_url
    .filter(|url| !url.is_empty())
    .ok_or_else(|| CommerceError::Gateway("MoMo response did not include a payUrl".to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gateway() -> MoMoGateway {
    MoMoGateway::new(MoMoConfig::new(
      "MOMO",
      "access",
      "secret",
      "https://test-payment.momo.vn/v2/gateway/api/create",
      "https://shop.test/wallet/momo-return",
      "https://shop.test/api/payments/momo/ipn",
    ))
    .unwrap()
  }

  #[test]
  fn create_request_signs_fixed_field_order() {
    let gw = gateway();
    let req = gw.build_create_request("MOMO1", "MOMO1", 50_000, "Nap tien");
    let raw = "accessKey=access&amount=50000&extraData=&ipnUrl=https://shop.test/api/payments/momo/ipn&orderId=MOMO1&orderInfo=Nap tien&partnerCode=MOMO&redirectUrl=https://shop.test/wallet/momo-return&requestId=MOMO1&requestType=captureWallet";
    assert_eq!(req.signature, hmac_sha256_hex("secret", raw));
    assert_eq!(req.amount, "50000");

    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json["partnerCode"], "MOMO");
    assert_eq!(json["ipnUrl"], "https://shop.test/api/payments/momo/ipn");
  }

  #[test]
  fn non_zero_result_code_is_a_gateway_error() {
    let err = parse_create_response(MoMoCreateResponse {
      result_code: 1001,
      message: "Insufficient funds".to_string(),
      pay_url: None,
    })
    .unwrap_err();
    assert!(matches!(err, CommerceError::Gateway(msg) if msg.contains("Insufficient funds")));

    let ok = parse_create_response(MoMoCreateResponse {
      result_code: 0,
      message: "Successful.".to_string(),
      pay_url: Some("https://pay.momo.vn/x".to_string()),
    })
    .unwrap();
    assert_eq!(ok, "https://pay.momo.vn/x");
  }
}
