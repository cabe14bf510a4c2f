// verdant/src/gateway/vnpay.rs

//! VNPay: redirect URL signed with HMAC-SHA512, amounts in đồng × 100.

use super::signing::{canonical_query, hmac_sha512_hex, verify_hmac_sha512_hex};
use super::{require_param, CallbackParams, CallbackResult, GatewayKind, PaymentInitResult, PaymentRequest};
use crate::error::{CommerceError, CommerceResult};
use crate::models::Money;
use crate::orders::number::tie_breaker;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

pub const SECURE_HASH: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";

const PARAM_PREFIX: &str = "vnp_";
const VIETNAM_UTC_OFFSET_SECS: i32 = 7 * 3600;
const DEFAULT_CLIENT_IP: &str = "127.0.0.1";

fn default_version() -> String {
  "2.1.0".to_string()
}
fn default_command() -> String {
  "pay".to_string()
}
fn default_currency() -> String {
  "VND".to_string()
}
fn default_locale() -> String {
  "vn".to_string()
}
fn default_order_type() -> String {
  "other".to_string()
}
fn default_expire_minutes() -> i64 {
  15
}

#[derive(Clone, Deserialize)]
pub struct VnPayConfig {
  pub tmn_code: String,
  pub hash_secret: String,
  pub pay_url: String,
  pub return_url: String,
  #[serde(default = "default_version")]
  pub version: String,
  #[serde(default = "default_command")]
  pub command: String,
  #[serde(default = "default_currency")]
  pub currency: String,
  #[serde(default = "default_locale")]
  pub locale: String,
  #[serde(default = "default_order_type")]
  pub order_type: String,
  #[serde(default = "default_expire_minutes")]
  pub expire_minutes: i64,
}

impl VnPayConfig {
  pub fn new(tmn_code: &str, hash_secret: &str, pay_url: &str, return_url: &str) -> Self {
    Self {
      tmn_code: tmn_code.to_string(),
      hash_secret: hash_secret.to_string(),
      pay_url: pay_url.to_string(),
      return_url: return_url.to_string(),
      version: default_version(),
      command: default_command(),
      currency: default_currency(),
      locale: default_locale(),
      order_type: default_order_type(),
      expire_minutes: default_expire_minutes(),
    }
  }

  pub fn validate(&self) -> CommerceResult<()> {
    for (name, value) in [
      ("tmn_code", &self.tmn_code),
      ("hash_secret", &self.hash_secret),
      ("pay_url", &self.pay_url),
      ("return_url", &self.return_url),
    ] {
      if value.trim().is_empty() {
        return Err(CommerceError::Gateway(format!("VNPay configuration is missing '{}'", name)));
      }
    }
    if self.expire_minutes <= 0 {
      return Err(CommerceError::Gateway("VNPay expire_minutes must be positive".to_string()));
    }
    Ok(())
  }
}

impl std::fmt::Debug for VnPayConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("VnPayConfig")
      .field("tmn_code", &self.tmn_code)
      .field("hash_secret", &"[REDACTED]")
      .field("pay_url", &self.pay_url)
      .field("return_url", &self.return_url)
      .field("version", &self.version)
      .finish()
  }
}

#[derive(Debug, Clone)]
pub struct VnPayGateway {
  config: VnPayConfig,
}

impl VnPayGateway {
  pub fn new(config: VnPayConfig) -> CommerceResult<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  #[instrument(name = "vnpay::create_payment", skip(self, request), fields(user_id = %request.user_id, amount = request.amount))]
  pub fn create_payment(&self, request: &PaymentRequest) -> CommerceResult<PaymentInitResult> {
    if request.amount <= 0 {
      return Err(CommerceError::Validation("payment amount must be positive".to_string()));
    }
    let now = Utc::now();
    let txn_ref = format!("{}{:04}", vietnam_time(now)?.format("%Y%m%d%H%M%S"), tie_breaker());
    let client_ip = request.client_ip.as_deref().unwrap_or(DEFAULT_CLIENT_IP);
    let pay_url = self.build_payment_url(&txn_ref, request.amount, &request.description, client_ip, now)?;
    debug!(txn_ref = %txn_ref, "VNPay payment URL built");
    Ok(PaymentInitResult {
      gateway_transaction_id: txn_ref,
      pay_url,
    })
  }

  /// The full signed redirect URL for one payment attempt.
  pub fn build_payment_url(
    &self,
    txn_ref: &str,
    amount: Money,
    order_info: &str,
    client_ip: &str,
    now: DateTime<Utc>,
  ) -> CommerceResult<String> {
    let local_now = vietnam_time(now)?;
    let expires = local_now + Duration::minutes(self.config.expire_minutes);

    let mut params = CallbackParams::new();
    params.insert("vnp_Version".into(), self.config.version.clone());
    params.insert("vnp_Command".into(), self.config.command.clone());
    params.insert("vnp_TmnCode".into(), self.config.tmn_code.clone());
    params.insert("vnp_Amount".into(), (amount * 100).to_string());
    params.insert("vnp_CreateDate".into(), local_now.format("%Y%m%d%H%M%S").to_string());
    params.insert("vnp_ExpireDate".into(), expires.format("%Y%m%d%H%M%S").to_string());
    params.insert("vnp_CurrCode".into(), self.config.currency.clone());
    params.insert("vnp_IpAddr".into(), client_ip.to_string());
    params.insert("vnp_Locale".into(), self.config.locale.clone());
    params.insert("vnp_OrderInfo".into(), order_info.to_string());
    params.insert("vnp_OrderType".into(), self.config.order_type.clone());
    params.insert("vnp_ReturnUrl".into(), self.config.return_url.clone());
    params.insert("vnp_TxnRef".into(), txn_ref.to_string());

    let query = canonical_query(&params);
    let secure_hash = hmac_sha512_hex(&self.config.hash_secret, &query);
    Ok(format!("{}?{}&{}={}", self.config.pay_url, query, SECURE_HASH, secure_hash))
  }

  /// Recomputes the signature over every `vnp_` field except the hash fields.
  pub fn verify_callback(&self, params: &CallbackParams) -> bool {
    let Some(supplied) = params.get(SECURE_HASH) else {
      warn!("VNPay callback carries no secure hash");
      return false;
    };
    let signed: CallbackParams = params
      .iter()
      .filter(|(k, _)| k.starts_with(PARAM_PREFIX) && k.as_str() != SECURE_HASH && k.as_str() != SECURE_HASH_TYPE)
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    let valid = verify_hmac_sha512_hex(&self.config.hash_secret, &canonical_query(&signed), supplied);
    if !valid {
      warn!(txn_ref = ?params.get("vnp_TxnRef"), "VNPay callback signature mismatch");
    }
    valid
  }

  pub fn parse_callback_params(&self, all_params: &HashMap<String, String>) -> CallbackParams {
    all_params
      .iter()
      .filter(|(k, _)| k.starts_with(PARAM_PREFIX))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  pub fn extract_callback_result(&self, params: &CallbackParams) -> CommerceResult<CallbackResult> {
    let txn_ref = require_param(params, "vnp_TxnRef", GatewayKind::VnPay)?;
    let raw_amount = require_param(params, "vnp_Amount", GatewayKind::VnPay)?;
    let amount_x100: Money = raw_amount
      .parse()
      .map_err(|_| CommerceError::Gateway(format!("VNPay callback has malformed amount '{}'", raw_amount)))?;
    let response_code = params.get("vnp_ResponseCode").map(String::as_str).unwrap_or_default();
    let transaction_status = params.get("vnp_TransactionStatus").map(String::as_str).unwrap_or_default();

    Ok(CallbackResult {
      is_success: response_code == "00" && transaction_status == "00",
      gateway_transaction_id: txn_ref.to_string(),
      amount: amount_x100 / 100,
      message: response_message(response_code).to_string(),
    })
  }
}

fn vietnam_time(now: DateTime<Utc>) -> CommerceResult<DateTime<FixedOffset>> {
  let offset = FixedOffset::east_opt(VIETNAM_UTC_OFFSET_SECS)
    .ok_or_else(|| CommerceError::Gateway("invalid VNPay timezone offset".to_string()))?;
  Ok(now.with_timezone(&offset))
}

/// Customer-facing text for `vnp_ResponseCode`.
pub fn response_message(code: &str) -> &'static str {
  match code {
    "00" => "Giao dịch thành công",
    "07" => "Trừ tiền thành công. Giao dịch bị nghi ngờ (liên quan tới lừa đảo, giao dịch bất thường)",
    "09" => "Thẻ/Tài khoản chưa đăng ký dịch vụ InternetBanking",
    "10" => "Xác thực thông tin thẻ/tài khoản không đúng quá 3 lần",
    "11" => "Đã hết hạn chờ thanh toán",
    "12" => "Thẻ/Tài khoản bị khóa",
    "13" => "Nhập sai mật khẩu xác thực giao dịch (OTP)",
    "24" => "Khách hàng hủy giao dịch",
    "51" => "Tài khoản không đủ số dư",
    "65" => "Tài khoản đã vượt quá hạn mức giao dịch trong ngày",
    "75" => "Ngân hàng thanh toán đang bảo trì",
    "79" => "Nhập sai mật khẩu thanh toán quá số lần quy định",
    _ => "Giao dịch không thành công",
  }
}

/// `RspCode` values VNPay expects in the IPN reply body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpnCode {
  Confirmed,
  OrderNotFound,
  AlreadyConfirmed,
  InvalidAmount,
  InvalidSignature,
  Unknown,
}

impl IpnCode {
  pub fn rsp_code(self) -> &'static str {
    match self {
      Self::Confirmed => "00",
      Self::OrderNotFound => "01",
      Self::AlreadyConfirmed => "02",
      Self::InvalidAmount => "04",
      Self::InvalidSignature => "97",
      Self::Unknown => "99",
    }
  }

  pub fn message(self) -> &'static str {
    match self {
      Self::Confirmed => "Confirm Success",
      Self::OrderNotFound => "Order not found",
      Self::AlreadyConfirmed => "Order already confirmed",
      Self::InvalidAmount => "Invalid amount",
      Self::InvalidSignature => "Invalid signature",
      Self::Unknown => "Unknown error",
    }
  }
}
