// verdant/storefront/src/web/extractors.rs

//! Request identity. Authentication itself happens upstream; the gateway in
//! front of this service forwards the verified user id in `X-User-ID`.

use crate::errors::AppError;
use crate::state::AppState;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let user_id = req
      .headers()
      .get(USER_ID_HEADER)
      .and_then(|h| h.to_str().ok())
      .and_then(|raw| Uuid::parse_str(raw.trim()).ok());

    ready(match user_id {
      Some(user_id) => Ok(AuthenticatedUser { user_id }),
      None => {
        warn!("Missing or invalid {} header.", USER_ID_HEADER);
        Err(AppError::Auth("Vui lòng đăng nhập để tiếp tục.".to_string()))
      }
    })
  }
}

/// Present on admin routes once `X-Admin-Key` matches the configured key.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser;

fn keys_match(supplied: &[u8], expected: &[u8]) -> bool {
  supplied.len() == expected.len() && supplied.iter().zip(expected).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

impl FromRequest for AdminUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
      return ready(Err(AppError::Config("application state is not configured".to_string())));
    };
    let supplied = req.headers().get(ADMIN_KEY_HEADER).map(|h| h.as_bytes()).unwrap_or_default();

    ready(if keys_match(supplied, state.config.admin_api_key.as_bytes()) {
      Ok(AdminUser)
    } else {
      warn!(path = %req.path(), "Admin request with missing or wrong key.");
      Err(AppError::Auth("Admin credentials required.".to_string()))
    })
  }
}
