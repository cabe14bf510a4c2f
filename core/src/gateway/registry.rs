// verdant/src/gateway/registry.rs

use super::{GatewayKind, PaymentGateway};
use crate::error::{CommerceError, CommerceResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Configured gateways, keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct GatewayRegistry {
  gateways: HashMap<GatewayKind, Arc<PaymentGateway>>,
}

impl GatewayRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, gateway: PaymentGateway) {
    let kind = gateway.kind();
    info!(gateway = %kind, "Payment gateway registered");
    self.gateways.insert(kind, Arc::new(gateway));
  }

  pub fn with(mut self, gateway: PaymentGateway) -> Self {
    self.register(gateway);
    self
  }

  pub fn get(&self, kind: GatewayKind) -> CommerceResult<Arc<PaymentGateway>> {
    self
      .gateways
      .get(&kind)
      .cloned()
      .ok_or_else(|| CommerceError::UnsupportedGateway(kind.to_string()))
  }

  /// Resolves a gateway from its external label such as `"vnpay"`.
  pub fn resolve(&self, label: &str) -> CommerceResult<Arc<PaymentGateway>> {
    let kind: GatewayKind = label
      .parse()
      .map_err(|_| CommerceError::UnsupportedGateway(label.to_string()))?;
    self.get(kind)
  }

  pub fn kinds(&self) -> Vec<GatewayKind> {
    let mut kinds: Vec<_> = self.gateways.keys().copied().collect();
    kinds.sort_by_key(|k| k.as_str());
    kinds
  }

  pub fn is_empty(&self) -> bool {
    self.gateways.is_empty()
  }
}
