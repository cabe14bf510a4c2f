// verdant/storefront/src/web/handlers/wallet_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use tracing::instrument;
use verdant_core::models::Money;
use verdant_core::GatewayKind;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct TopUpPayload {
  pub gateway: GatewayKind,
  pub amount: Money,
}

#[instrument(name = "handler::wallet_balance", skip_all, fields(user_id = %auth_user.user_id))]
pub async fn balance_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let balance = app_state.wallet.balance(auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "balance": balance })))
}

#[instrument(name = "handler::wallet_history", skip_all, fields(user_id = %auth_user.user_id))]
pub async fn history_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let history = app_state.wallet.history(auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(history))
}

#[instrument(
  name = "handler::begin_top_up",
  skip_all,
  fields(user_id = %auth_user.user_id, gateway = %payload.gateway, amount = payload.amount)
)]
pub async fn begin_top_up_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req: HttpRequest,
  payload: web::Json<TopUpPayload>,
) -> Result<HttpResponse, AppError> {
  let client_ip = req
    .connection_info()
    .realip_remote_addr()
    .map(|addr| match addr.parse::<SocketAddr>() {
      Ok(socket) => socket.ip().to_string(),
      Err(_) => addr.to_string(),
    });
  let init = app_state
    .topups
    .begin_top_up(auth_user.user_id, payload.gateway, payload.amount, client_ip)
    .await?;
  Ok(HttpResponse::Created().json(init))
}
