// verdant/storefront/src/web/handlers/admin_handlers.rs

//! Back-office routes. Errors carry the raw detail rather than the customer text.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;
use verdant_core::models::OrderStatus;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AdminUser;

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
  pub status: OrderStatus,
  pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApprovalPayload {
  pub note: Option<String>,
}

#[instrument(name = "handler::admin_update_status", skip_all, fields(order_id = %order_id, status = %payload.status))]
pub async fn update_status_handler(
  app_state: web::Data<AppState>,
  _admin: AdminUser,
  order_id: web::Path<Uuid>,
  payload: web::Json<StatusPayload>,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .orders
    .update_status(order_id.into_inner(), payload.status, payload.reason.as_deref())
    .await
    .map_err(AppError::admin)?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::admin_approve_cancellation", skip_all, fields(order_id = %order_id))]
pub async fn approve_cancellation_handler(
  app_state: web::Data<AppState>,
  _admin: AdminUser,
  order_id: web::Path<Uuid>,
  payload: Option<web::Json<ApprovalPayload>>,
) -> Result<HttpResponse, AppError> {
  let payload = payload.map(web::Json::into_inner).unwrap_or_default();
  let order = app_state
    .orders
    .approve_cancellation(order_id.into_inner(), payload.note.as_deref())
    .await
    .map_err(AppError::admin)?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::admin_reject_cancellation", skip_all, fields(order_id = %order_id))]
pub async fn reject_cancellation_handler(
  app_state: web::Data<AppState>,
  _admin: AdminUser,
  order_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .orders
    .reject_cancellation(order_id.into_inner())
    .await
    .map_err(AppError::admin)?;
  Ok(HttpResponse::Ok().json(order))
}

pub async fn pending_cancellations_handler(
  app_state: web::Data<AppState>,
  _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
  let orders = app_state.orders.pending_cancellations().await.map_err(AppError::admin)?;
  Ok(HttpResponse::Ok().json(orders))
}

pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  _admin: AdminUser,
  order_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = app_state.orders.order(order_id.into_inner()).await.map_err(AppError::admin)?;
  Ok(HttpResponse::Ok().json(order))
}

pub async fn order_by_number_handler(
  app_state: web::Data<AppState>,
  _admin: AdminUser,
  order_number: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .orders
    .order_by_number(&order_number)
    .await
    .map_err(AppError::admin)?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::admin_verify_wallet", skip_all, fields(user_id = %user_id))]
pub async fn verify_wallet_handler(
  app_state: web::Data<AppState>,
  _admin: AdminUser,
  user_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let report = app_state
    .wallet
    .verify_balance(user_id.into_inner())
    .await
    .map_err(AppError::admin)?;
  if !report.is_consistent() {
    tracing::warn!(drift = report.drift(), "Wallet balance drifted from its ledger.");
  }
  Ok(HttpResponse::Ok().json(report))
}
