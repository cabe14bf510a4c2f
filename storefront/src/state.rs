// verdant/storefront/src/state.rs
use crate::config::AppConfig;
use std::sync::Arc;
use verdant_core::{OrderEngine, TopUpService, WalletLedger};

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<AppConfig>,
  pub orders: Arc<OrderEngine>,
  pub wallet: Arc<WalletLedger>,
  pub topups: Arc<TopUpService>,
}
