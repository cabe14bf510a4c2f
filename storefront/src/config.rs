// verdant/storefront/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use verdant_core::gateway::{MoMoConfig, VnPayConfig};

const VNPAY_SANDBOX_URL: &str = "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html";
const MOMO_TEST_ENDPOINT: &str = "https://test-payment.momo.vn/v2/gateway/api/create";

#[derive(Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub app_base_url: String,
  pub admin_api_key: String,
  pub run_migrations: bool,

  /// `None` when the gateway's credentials are absent; it is then not registered.
  pub vnpay: Option<VnPayConfig>,
  pub momo: Option<MoMoConfig>,
}

fn optional(var_name: &str) -> Option<String> {
  env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn required(var_name: &str) -> Result<String> {
  optional(var_name).ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", var_name)))
}

fn parsed<T: std::str::FromStr>(var_name: &str, default: T) -> Result<T>
where
  T::Err: std::fmt::Display,
{
  match optional(var_name) {
    Some(raw) => raw
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {} value '{}': {}", var_name, raw, e))),
    None => Ok(default),
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let server_host = optional("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = parsed("SERVER_PORT", 8080u16)?;
    let database_url = required("DATABASE_URL")?;
    let app_base_url = optional("APP_BASE_URL").unwrap_or_else(|| format!("http://{}:{}", server_host, server_port));
    let admin_api_key = required("ADMIN_API_KEY")?;
    let run_migrations = parsed("RUN_MIGRATIONS", true)?;

    let vnpay = Self::vnpay_from_env(&app_base_url)?;
    let momo = Self::momo_from_env(&app_base_url)?;

    tracing::info!(
      vnpay = vnpay.is_some(),
      momo = momo.is_some(),
      "Application configuration loaded."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      app_base_url,
      admin_api_key,
      run_migrations,
      vnpay,
      momo,
    })
  }

  fn vnpay_from_env(app_base_url: &str) -> Result<Option<VnPayConfig>> {
    let (Some(tmn_code), Some(hash_secret)) = (optional("VNPAY_TMN_CODE"), optional("VNPAY_HASH_SECRET")) else {
      tracing::warn!("VNPay credentials not set; VNPay top-ups are disabled.");
      return Ok(None);
    };
    let pay_url = optional("VNPAY_PAY_URL").unwrap_or_else(|| VNPAY_SANDBOX_URL.to_string());
    let return_url =
      optional("VNPAY_RETURN_URL").unwrap_or_else(|| format!("{}/api/v1/payments/vnpay/return", app_base_url));

    let mut config = VnPayConfig::new(&tmn_code, &hash_secret, &pay_url, &return_url);
    config.expire_minutes = parsed("VNPAY_EXPIRE_MINUTES", config.expire_minutes)?;
    if config.expire_minutes <= 0 {
      return Err(AppError::Config("VNPAY_EXPIRE_MINUTES must be positive".to_string()));
    }
    Ok(Some(config))
  }

  fn momo_from_env(app_base_url: &str) -> Result<Option<MoMoConfig>> {
    let (Some(partner_code), Some(access_key), Some(secret_key)) = (
      optional("MOMO_PARTNER_CODE"),
      optional("MOMO_ACCESS_KEY"),
      optional("MOMO_SECRET_KEY"),
    ) else {
      tracing::warn!("MoMo credentials not set; MoMo top-ups are disabled.");
      return Ok(None);
    };
    let endpoint = optional("MOMO_ENDPOINT").unwrap_or_else(|| MOMO_TEST_ENDPOINT.to_string());
    let redirect_url =
      optional("MOMO_REDIRECT_URL").unwrap_or_else(|| format!("{}/api/v1/payments/momo/return", app_base_url));
    let ipn_url = optional("MOMO_IPN_URL").unwrap_or_else(|| format!("{}/api/v1/payments/momo/ipn", app_base_url));

    Ok(Some(MoMoConfig::new(
      &partner_code,
      &access_key,
      &secret_key,
      &endpoint,
      &redirect_url,
      &ipn_url,
    )))
  }
}

impl std::fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AppConfig")
      .field("server_host", &self.server_host)
      .field("server_port", &self.server_port)
      .field("database_url", &"[REDACTED]")
      .field("app_base_url", &self.app_base_url)
      .field("admin_api_key", &"[REDACTED]")
      .field("run_migrations", &self.run_migrations)
      .field("vnpay", &self.vnpay)
      .field("momo", &self.momo)
      .finish()
  }
}
