// verdant/storefront/src/web/routes.rs

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::state::AppState;
use crate::web::handlers::{admin_handlers, order_handlers, payment_handlers, wallet_handlers};

async fn health_check_handler(app_state: web::Data<AppState>) -> HttpResponse {
  let gateways: Vec<&str> = app_state.topups.gateways().kinds().into_iter().map(|k| k.as_str()).collect();
  HttpResponse::Ok().json(json!({ "status": "ok", "gateways": gateways }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/orders")
          .route("", web::post().to(order_handlers::checkout_handler))
          .route("", web::get().to(order_handlers::list_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route(
            "/{order_id}/cancellation",
            web::post().to(order_handlers::request_cancellation_handler),
          ),
      )
      .service(
        web::scope("/wallet")
          .route("", web::get().to(wallet_handlers::balance_handler))
          .route("/transactions", web::get().to(wallet_handlers::history_handler))
          .route("/top-ups", web::post().to(wallet_handlers::begin_top_up_handler)),
      )
      .service(
        web::scope("/payments").service(
          web::resource("/{gateway}/{channel}")
            .route(web::get().to(payment_handlers::callback_handler))
            .route(web::post().to(payment_handlers::callback_handler)),
        ),
      )
      .service(
        web::scope("/admin")
          .route("/cancellations", web::get().to(admin_handlers::pending_cancellations_handler))
          .route("/orders/{order_id}", web::get().to(admin_handlers::get_order_handler))
          .route(
            "/orders/by-number/{order_number}",
            web::get().to(admin_handlers::order_by_number_handler),
          )
          .route("/orders/{order_id}/status", web::put().to(admin_handlers::update_status_handler))
          .route(
            "/orders/{order_id}/cancellation/approve",
            web::post().to(admin_handlers::approve_cancellation_handler),
          )
          .route(
            "/orders/{order_id}/cancellation/reject",
            web::post().to(admin_handlers::reject_cancellation_handler),
          )
          .route("/wallets/{user_id}/verify", web::get().to(admin_handlers::verify_wallet_handler)),
      ),
  );
}
