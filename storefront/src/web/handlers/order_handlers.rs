// verdant/storefront/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use verdant_core::models::{Money, ShippingInfo};
use verdant_core::CheckoutRequest;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPayload {
  pub shipping: ShippingInfo,
  #[serde(default)]
  pub shipping_fee: Money,
  #[serde(default)]
  pub wallet_amount: Money,
  pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancellationPayload {
  pub reason: String,
}

#[instrument(name = "handler::checkout", skip_all, fields(user_id = %auth_user.user_id))]
pub async fn checkout_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  payload: web::Json<CheckoutPayload>,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  let order = app_state
    .orders
    .create_order(CheckoutRequest {
      user_id: auth_user.user_id,
      shipping: payload.shipping,
      shipping_fee: payload.shipping_fee,
      wallet_amount: payload.wallet_amount,
      note: payload.note,
    })
    .await?;
  info!(order_number = %order.order_number, total = order.total, "Order placed.");
  Ok(HttpResponse::Created().json(order))
}

#[instrument(name = "handler::list_orders", skip_all, fields(user_id = %auth_user.user_id))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let orders = app_state.orders.orders_for_customer(auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(orders))
}

#[instrument(name = "handler::get_order", skip_all, fields(user_id = %auth_user.user_id, order_id = %order_id))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  order_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .orders
    .order_for_customer(auth_user.user_id, order_id.into_inner())
    .await?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::request_cancellation", skip_all, fields(user_id = %auth_user.user_id, order_id = %order_id))]
pub async fn request_cancellation_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  order_id: web::Path<Uuid>,
  payload: web::Json<CancellationPayload>,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .orders
    .request_cancellation(auth_user.user_id, order_id.into_inner(), &payload.reason)
    .await?;
  Ok(HttpResponse::Accepted().json(order))
}
