// verdant/storefront/src/main.rs

mod config;
mod db;
mod errors;
mod state;
mod web;

use crate::config::AppConfig;
use crate::db::PgStore;
use crate::errors::{AppError, Result as AppResult};
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use verdant_core::gateway::{MoMoGateway, VnPayGateway};
use verdant_core::{
  BroadcastSink, GatewayRegistry, LedgerStore, OrderEngine, PaymentGateway, TopUpLimits, TopUpService, WalletLedger,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

fn build_registry(config: &AppConfig) -> AppResult<GatewayRegistry> {
  let mut registry = GatewayRegistry::new();
  if let Some(vnpay) = &config.vnpay {
    registry.register(PaymentGateway::VnPay(VnPayGateway::new(vnpay.clone()).map_err(|e| AppError::Config(e.to_string()))?));
  }
  if let Some(momo) = &config.momo {
    registry.register(PaymentGateway::MoMo(MoMoGateway::new(momo.clone()).map_err(|e| AppError::Config(e.to_string()))?));
  }
  if registry.is_empty() {
    tracing::warn!("No payment gateway configured; wallet top-ups are unavailable.");
  }
  Ok(registry)
}

/// Stand-in for the real-time channel: forwards order events to the log.
fn spawn_event_listener(events: &BroadcastSink) {
  let mut receiver = events.subscribe();
  tokio::spawn(async move {
    loop {
      match receiver.recv().await {
        Ok(event) => tracing::info!(
          order_number = %event.order_number,
          user_id = %event.user_id,
          status = %event.status,
          "{}",
          event.message
        ),
        Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Order event listener lagged."),
        Err(RecvError::Closed) => break,
      }
    }
  });
}

async fn build_state(config: Arc<AppConfig>) -> AppResult<AppState> {
  let pool = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
  tracing::info!("Connected to the database.");
  if config.run_migrations {
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied.");
  }

  let store: Arc<dyn LedgerStore> = Arc::new(PgStore::new(pool));
  let events = Arc::new(BroadcastSink::new(EVENT_CHANNEL_CAPACITY));
  spawn_event_listener(&events);

  let wallet = Arc::new(WalletLedger::new(store.clone()));
  let orders = Arc::new(OrderEngine::new(store.clone(), events.clone()));
  let topups = Arc::new(TopUpService::new(
    store,
    wallet.clone(),
    Arc::new(build_registry(&config)?),
    TopUpLimits::default(),
  ));

  Ok(AppState {
    config,
    orders,
    wallet,
    topups,
  })
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting Verdant storefront...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
    }
  };

  let app_state = match build_state(app_config.clone()).await {
    Ok(state) => state,
    Err(e) => {
      tracing::error!(error = %e, "Failed to initialise application state.");
      return Err(std::io::Error::other(e.to_string()));
    }
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Binding server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .app_data(actix_data::JsonConfig::default().error_handler(|err, _req| {
        AppError::Validation(err.to_string()).into()
      }))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
