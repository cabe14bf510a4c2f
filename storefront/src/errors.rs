// verdant/storefront/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use verdant_core::{CommerceError, ErrorKind};

#[derive(Debug, Error)]
pub enum AppError {
  /// A domain failure on a customer-facing route; rendered with the localized message.
  #[error("{0}")]
  Customer(CommerceError),

  /// A domain failure on an admin route; rendered with the raw detail.
  #[error("{0}")]
  Admin(CommerceError),

  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration Error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),
}

impl AppError {
  pub fn admin(err: CommerceError) -> Self {
    AppError::Admin(err)
  }

  fn kind(&self) -> ErrorKind {
    match self {
      AppError::Customer(e) | AppError::Admin(e) => e.kind(),
      AppError::Validation(_) => ErrorKind::Validation,
      AppError::Auth(_) => ErrorKind::Unauthorized,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Migration(_) => ErrorKind::Internal,
    }
  }
}

impl From<CommerceError> for AppError {
  fn from(err: CommerceError) -> Self {
    AppError::Customer(err)
  }
}

fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::InvalidState | ErrorKind::InsufficientStock => StatusCode::CONFLICT,
    ErrorKind::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
    ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
    ErrorKind::Gateway => StatusCode::BAD_GATEWAY,
    ErrorKind::SignatureMismatch | ErrorKind::Validation => StatusCode::BAD_REQUEST,
    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      other => status_for(other.kind()),
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Request rejected");
    }

    let message = match self {
      AppError::Customer(e) => e.customer_message(),
      AppError::Admin(e) => e.to_string(),
      AppError::Validation(m) | AppError::Auth(m) => m.clone(),
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Migration(_) => {
        "Đã có lỗi xảy ra, vui lòng thử lại sau.".to_string()
      }
    };
    HttpResponse::build(status).json(json!({ "error": message, "code": self.kind() }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
