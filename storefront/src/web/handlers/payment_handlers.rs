// verdant/storefront/src/web/handlers/payment_handlers.rs

//! Gateway return and IPN callbacks. Both channels run the same settlement;
//! only the response shape differs. A forged browser return is refused outright,
//! while IPN always answers with the gateway's own acknowledgement.

use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use verdant_core::{CallbackChannel, CallbackStatus, CommerceError, GatewayAck, GatewayKind};

use crate::errors::AppError;
use crate::state::AppState;

fn parse_channel(raw: &str) -> Result<CallbackChannel, AppError> {
  match raw {
    "return" => Ok(CallbackChannel::Return),
    "ipn" => Ok(CallbackChannel::Ipn),
    other => Err(AppError::Validation(format!("unknown callback channel '{}'", other))),
  }
}

/// Flattens a JSON object body into string parameters. Nulls are dropped.
fn json_params(body: &[u8]) -> Result<HashMap<String, String>, AppError> {
  let object: serde_json::Map<String, Value> =
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("malformed callback body: {}", e)))?;
  Ok(
    object
      .into_iter()
      .filter_map(|(key, value)| match value {
        Value::Null => None,
        Value::String(s) => Some((key, s)),
        other => Some((key, other.to_string())),
      })
      .collect(),
  )
}

#[instrument(name = "handler::payment_callback", skip_all, fields(gateway = %path.0, channel = %path.1))]
pub async fn callback_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  path: web::Path<(String, String)>,
  query: web::Query<HashMap<String, String>>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let (gateway_label, channel_label) = path.into_inner();
  let gateway: GatewayKind = gateway_label
    .parse()
    .map_err(|e: verdant_core::models::UnknownLabel| AppError::Validation(e.to_string()))?;
  let channel = parse_channel(&channel_label)?;

  let mut params = query.into_inner();
  if !body.is_empty() {
    let is_json = req
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .is_some_and(|ct| ct.starts_with("application/json"));
    if is_json {
      params.extend(json_params(&body)?);
    } else {
      warn!(bytes = body.len(), "Ignoring non-JSON callback body.");
    }
  }

  let outcome = app_state.topups.handle_callback(gateway, channel, params).await;
  info!(status = ?outcome.status, "Callback handled.");

  if channel == CallbackChannel::Return && outcome.status == CallbackStatus::InvalidSignature {
    return Err(CommerceError::SignatureMismatch(gateway.to_string()).into());
  }

  let response = match (channel, &outcome.ack) {
    (CallbackChannel::Ipn, GatewayAck::VnPay { rsp_code, message }) => {
      HttpResponse::Ok().json(json!({ "RspCode": rsp_code, "Message": message }))
    }
    (CallbackChannel::Ipn, GatewayAck::MoMo { http_status }) => {
      HttpResponse::build(StatusCode::from_u16(*http_status).unwrap_or(StatusCode::BAD_REQUEST)).finish()
    }
    (CallbackChannel::Return, _) => HttpResponse::Ok().json(&outcome),
  };
  Ok(response)
}
