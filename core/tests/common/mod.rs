// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;
use verdant_core::gateway::{MoMoConfig, MoMoGateway, VnPayConfig, VnPayGateway};
use verdant_core::models::{Cart, CartLine, Customer, Money, Product, ShippingInfo};
use verdant_core::{
  CheckoutRequest, GatewayKind, GatewayRegistry, MemoryStore, NotificationSink, OrderEngine, OrderEvent,
  PaymentGateway, TopUpLimits, TopUpService, WalletLedger,
};

// --- Tracing ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Notification sinks ---
#[derive(Debug, Default)]
pub struct RecordingSink {
  events: Mutex<Vec<OrderEvent>>,
}

impl RecordingSink {
  pub fn events(&self) -> Vec<OrderEvent> {
    self.events.lock().clone()
  }
}

#[async_trait]
impl NotificationSink for RecordingSink {
  async fn publish(&self, event: OrderEvent) -> anyhow::Result<()> {
    self.events.lock().push(event);
    Ok(())
  }
}

#[derive(Debug, Default)]
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
  async fn publish(&self, _event: OrderEvent) -> anyhow::Result<()> {
    anyhow::bail!("realtime hub unreachable")
  }
}

// --- Gateway configuration ---
pub const VNPAY_SECRET: &str = "VNPAYTESTSECRETKEY0123456789ABCD";

pub fn vnpay_config() -> VnPayConfig {
  VnPayConfig::new(
    "VERDANT1",
    VNPAY_SECRET,
    "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html",
    "https://shop.test/wallet/vnpay-return",
  )
}

pub fn momo_config() -> MoMoConfig {
  MoMoConfig::new(
    "MOMOVERDANT",
    "momo-access",
    "momo-secret",
    "http://127.0.0.1:9/v2/gateway/api/create",
    "https://shop.test/wallet/momo-return",
    "https://shop.test/api/payments/momo/ipn",
  )
}

pub fn registry() -> GatewayRegistry {
  GatewayRegistry::new()
    .with(PaymentGateway::VnPay(VnPayGateway::new(vnpay_config()).unwrap()))
    .with(PaymentGateway::MoMo(MoMoGateway::new(momo_config()).unwrap()))
}

// --- Store fixture ---
pub struct Fixture {
  pub store: Arc<MemoryStore>,
  pub sink: Arc<RecordingSink>,
  pub ledger: Arc<WalletLedger>,
  pub engine: OrderEngine,
  pub topups: TopUpService,
  pub customer: Customer,
  pub fern: Product,
  pub monstera: Product,
}

impl Fixture {
  pub fn new() -> Self {
    setup_tracing();
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let ledger = Arc::new(WalletLedger::new(store.clone()));
    let engine = OrderEngine::new(store.clone(), sink.clone());
    let topups = TopUpService::new(store.clone(), ledger.clone(), Arc::new(registry()), TopUpLimits::default());

    let customer = Customer {
      id: Uuid::new_v4(),
      email: "lan@example.vn".to_string(),
      full_name: "Nguyễn Thị Lan".to_string(),
      wallet_balance: 0,
      points: 0,
    };
    let fern = product("FERN-01", "Dương xỉ Boston", 100_000, 10, 2);
    let monstera = product("MONS-02", "Trầu bà lá xẻ", 50_000, 5, 1);
    store.insert_customer(customer.clone());
    store.insert_product(fern.clone());
    store.insert_product(monstera.clone());

    Self {
      store,
      sink,
      ledger,
      engine,
      topups,
      customer,
      fern,
      monstera,
    }
  }

  pub fn user_id(&self) -> Uuid {
    self.customer.id
  }

  /// Credits the wallet through the ledger so the balance and ledger sum agree.
  pub async fn fund(&self, amount: Money) {
    let gateway_id = format!("SEED{}", Uuid::new_v4().simple());
    self
      .ledger
      .record_pending_top_up(self.user_id(), amount, GatewayKind::VnPay, &gateway_id, "seed")
      .await
      .unwrap();
    self.ledger.confirm_top_up_by_gateway_id(&gateway_id, amount).await.unwrap();
  }

  pub fn fill_cart(&self, lines: &[(&Product, i64)], discount_amount: Money) {
    self.store.put_cart(Cart {
      user_id: self.user_id(),
      lines: lines
        .iter()
        .map(|(p, q)| CartLine {
          product_id: p.id,
          quantity: *q,
        })
        .collect(),
      discount_amount,
    });
  }

  pub fn checkout(&self, shipping_fee: Money, wallet_amount: Money) -> CheckoutRequest {
    CheckoutRequest {
      user_id: self.user_id(),
      shipping: shipping(),
      shipping_fee,
      wallet_amount,
      note: None,
    }
  }

  pub fn balance(&self) -> Money {
    self.store.wallet_balance(self.user_id()).unwrap()
  }

  pub fn stock(&self, product: &Product) -> i64 {
    self.store.product_quantity(product.id).unwrap()
  }
}

pub fn product(sku: &str, name: &str, price: Money, quantity: i64, points_per_item: i64) -> Product {
  Product {
    id: Uuid::new_v4(),
    sku: sku.to_string(),
    name: name.to_string(),
    cost_price: price / 2,
    price,
    quantity,
    is_active: true,
    points_per_item,
  }
}

pub fn shipping() -> ShippingInfo {
  ShippingInfo {
    recipient_name: "Nguyễn Thị Lan".to_string(),
    phone: "0901234567".to_string(),
    address: "12 Lý Tự Trọng, Quận 1, TP.HCM".to_string(),
    email: Some("lan@example.vn".to_string()),
  }
}

/// Parses the query string of a redirect URL into a parameter map.
pub fn query_params(url: &str) -> HashMap<String, String> {
  let parsed = url::Url::parse(url).unwrap();
  parsed.query_pairs().into_owned().collect()
}
