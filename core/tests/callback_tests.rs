// tests/callback_tests.rs
mod common;

use async_trait::async_trait;
use common::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;
use verdant_core::gateway::signing::{canonical_query, hmac_sha512_hex};
use verdant_core::gateway::{CallbackParams, VnPayGateway};
use verdant_core::models::{Cart, Customer, Order, Product, TransactionStatus, TransactionType, WalletTransaction};
use verdant_core::store::{LedgerStore, MAX_COMMIT_ATTEMPTS};
use verdant_core::{
  CallbackChannel, CallbackStatus, ChangeSet, CommerceError, GatewayAck, GatewayKind, GatewayRegistry, MemoryStore,
  PaymentGateway, StoreError, StoreResult, TopUpLimits, TopUpService, WalletLedger,
};

fn vnpay_callback(txn_ref: &str, amount: i64, response_code: &str, secret: &str) -> HashMap<String, String> {
  let mut signed = CallbackParams::new();
  signed.insert("vnp_Amount".to_string(), (amount * 100).to_string());
  signed.insert("vnp_BankCode".to_string(), "NCB".to_string());
  signed.insert("vnp_OrderInfo".to_string(), format!("Nap tien vao vi {}", amount));
  signed.insert("vnp_ResponseCode".to_string(), response_code.to_string());
  signed.insert("vnp_TmnCode".to_string(), "VERDANT1".to_string());
  signed.insert("vnp_TransactionNo".to_string(), "14123456".to_string());
  signed.insert("vnp_TransactionStatus".to_string(), response_code.to_string());
  signed.insert("vnp_TxnRef".to_string(), txn_ref.to_string());
  let hash = hmac_sha512_hex(secret, &canonical_query(&signed));
  let mut all: HashMap<String, String> = signed.into_iter().collect();
  all.insert("vnp_SecureHash".to_string(), hash);
  all
}

fn momo_callback(order_id: &str, amount: i64, result_code: &str) -> HashMap<String, String> {
  [
    ("partnerCode", "MOMOVERDANT".to_string()),
    ("orderId", order_id.to_string()),
    ("requestId", order_id.to_string()),
    ("amount", amount.to_string()),
    ("resultCode", result_code.to_string()),
    ("message", "Successful.".to_string()),
    ("signature", "not-checked".to_string()),
  ]
  .into_iter()
  .map(|(k, v)| (k.to_string(), v))
  .collect()
}

fn vnpay_ack(rsp_code: &'static str) -> GatewayAck {
  let message = match rsp_code {
    "00" => "Confirm Success",
    "01" => "Order not found",
    "02" => "Order already confirmed",
    "04" => "Invalid amount",
    "97" => "Invalid signature",
    _ => "Unknown error",
  };
  GatewayAck::VnPay { rsp_code, message }
}

#[tokio::test]
async fn vnpay_top_up_is_credited_once_across_return_and_ipn() {
  let fx = Fixture::new();
  let init = fx
    .topups
    .begin_top_up(fx.user_id(), GatewayKind::VnPay, 250_000, Some("113.161.1.2".to_string()))
    .await
    .unwrap();
  assert!(init.pay_url.starts_with("https://sandbox.vnpayment.vn/paymentv2/vpcpay.html?"));

  let pending = fx.ledger.top_up_by_gateway_id(&init.gateway_transaction_id).await.unwrap().unwrap();
  assert_eq!(pending.status, TransactionStatus::Pending);
  assert_eq!(pending.transaction_type, TransactionType::TopUp);
  assert_eq!(fx.balance(), 0);

  let params = vnpay_callback(&init.gateway_transaction_id, 250_000, "00", VNPAY_SECRET);
  let on_return = fx
    .topups
    .handle_callback(GatewayKind::VnPay, CallbackChannel::Return, params.clone())
    .await;
  assert_eq!(on_return.status, CallbackStatus::Credited);
  assert_eq!(on_return.ack, vnpay_ack("00"));
  assert!(on_return.is_credited());

  let on_ipn = fx.topups.handle_callback(GatewayKind::VnPay, CallbackChannel::Ipn, params).await;
  assert_eq!(on_ipn.status, CallbackStatus::AlreadyCredited);
  assert_eq!(on_ipn.ack, vnpay_ack("02"));
  assert!(on_ipn.is_credited());

  assert_eq!(fx.balance(), 250_000);
  assert!(fx.ledger.verify_balance(fx.user_id()).await.unwrap().is_consistent());
}

#[tokio::test]
async fn vnpay_bad_signature_answers_97_and_changes_nothing() {
  let fx = Fixture::new();
  let init = fx
    .topups
    .begin_top_up(fx.user_id(), GatewayKind::VnPay, 100_000, None)
    .await
    .unwrap();

  let forged = vnpay_callback(&init.gateway_transaction_id, 100_000, "00", "attacker-secret");
  let outcome = fx.topups.handle_callback(GatewayKind::VnPay, CallbackChannel::Ipn, forged).await;

  assert_eq!(outcome.status, CallbackStatus::InvalidSignature);
  assert_eq!(outcome.ack, vnpay_ack("97"));
  assert!(outcome.result.is_none());
  assert_eq!(fx.balance(), 0);
  let row = fx.ledger.top_up_by_gateway_id(&init.gateway_transaction_id).await.unwrap().unwrap();
  assert_eq!(row.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn vnpay_unknown_transaction_and_amount_mismatch() {
  let fx = Fixture::new();
  let unknown = vnpay_callback("NOSUCHREF", 100_000, "00", VNPAY_SECRET);
  let outcome = fx.topups.handle_callback(GatewayKind::VnPay, CallbackChannel::Ipn, unknown).await;
  assert_eq!(outcome.status, CallbackStatus::UnknownTransaction);
  assert_eq!(outcome.ack, vnpay_ack("01"));

  let init = fx
    .topups
    .begin_top_up(fx.user_id(), GatewayKind::VnPay, 100_000, None)
    .await
    .unwrap();
  let inflated = vnpay_callback(&init.gateway_transaction_id, 1_000_000, "00", VNPAY_SECRET);
  let outcome = fx.topups.handle_callback(GatewayKind::VnPay, CallbackChannel::Ipn, inflated).await;
  assert_eq!(outcome.status, CallbackStatus::AmountMismatch);
  assert_eq!(outcome.ack, vnpay_ack("04"));
  assert_eq!(fx.balance(), 0);
}

#[tokio::test]
async fn vnpay_failed_payment_marks_top_up_failed() {
  let fx = Fixture::new();
  let init = fx
    .topups
    .begin_top_up(fx.user_id(), GatewayKind::VnPay, 100_000, None)
    .await
    .unwrap();

  let cancelled = vnpay_callback(&init.gateway_transaction_id, 100_000, "24", VNPAY_SECRET);
  let outcome = fx.topups.handle_callback(GatewayKind::VnPay, CallbackChannel::Return, cancelled).await;

  assert_eq!(outcome.status, CallbackStatus::PaymentFailed);
  assert_eq!(outcome.ack, vnpay_ack("00"));
  assert!(!outcome.is_credited());
  let row = fx.ledger.top_up_by_gateway_id(&init.gateway_transaction_id).await.unwrap().unwrap();
  assert_eq!(row.status, TransactionStatus::Failed);

  // A late success for a failed payment is acknowledged but not credited.
  let late = vnpay_callback(&init.gateway_transaction_id, 100_000, "00", VNPAY_SECRET);
  let outcome = fx.topups.handle_callback(GatewayKind::VnPay, CallbackChannel::Ipn, late).await;
  assert_eq!(outcome.status, CallbackStatus::AlreadyFailed);
  assert_eq!(outcome.ack, vnpay_ack("02"));
  assert!(!outcome.is_credited());
  assert_eq!(fx.balance(), 0);
}

#[tokio::test]
async fn momo_ipn_credits_and_acknowledges_with_204() {
  let fx = Fixture::new();
  fx.ledger
    .record_pending_top_up(fx.user_id(), 100_000, GatewayKind::MoMo, "MOMO17280000000001234", "Nap tien")
    .await
    .unwrap();

  let outcome = fx
    .topups
    .handle_callback(GatewayKind::MoMo, CallbackChannel::Ipn, momo_callback("MOMO17280000000001234", 100_000, "0"))
    .await;
  assert_eq!(outcome.status, CallbackStatus::Credited);
  assert_eq!(outcome.ack, GatewayAck::MoMo { http_status: 204 });
  assert_eq!(fx.balance(), 100_000);

  let outcome = fx
    .topups
    .handle_callback(GatewayKind::MoMo, CallbackChannel::Return, momo_callback("MOMO17280000000001234", 100_000, "0"))
    .await;
  assert_eq!(outcome.status, CallbackStatus::AlreadyCredited);
  assert_eq!(outcome.ack, GatewayAck::MoMo { http_status: 204 });
  assert!(outcome.is_credited());
  assert_eq!(fx.balance(), 100_000);
}

#[tokio::test]
async fn momo_success_replayed_after_failure_is_not_reported_as_credit() {
  let fx = Fixture::new();
  fx.ledger
    .record_pending_top_up(fx.user_id(), 80_000, GatewayKind::MoMo, "MOMO17280000000005678", "Nap tien")
    .await
    .unwrap();

  let declined = fx
    .topups
    .handle_callback(GatewayKind::MoMo, CallbackChannel::Return, momo_callback("MOMO17280000000005678", 80_000, "1006"))
    .await;
  assert_eq!(declined.status, CallbackStatus::PaymentFailed);
  assert!(!declined.is_credited());

  let replay = fx
    .topups
    .handle_callback(GatewayKind::MoMo, CallbackChannel::Ipn, momo_callback("MOMO17280000000005678", 80_000, "0"))
    .await;
  assert_eq!(replay.status, CallbackStatus::AlreadyFailed);
  assert_eq!(replay.ack, GatewayAck::MoMo { http_status: 204 });
  assert!(replay.result.as_ref().is_some_and(|r| r.is_success));
  assert!(!replay.is_credited());

  assert_eq!(fx.balance(), 0);
  let row = fx.ledger.top_up_by_gateway_id("MOMO17280000000005678").await.unwrap().unwrap();
  assert_eq!(row.status, TransactionStatus::Failed);
  assert!(fx.ledger.verify_balance(fx.user_id()).await.unwrap().is_consistent());
}

#[tokio::test]
async fn momo_callback_missing_fields_is_rejected_with_400() {
  let fx = Fixture::new();
  let mut params = momo_callback("MOMO1", 100_000, "0");
  params.remove("requestId");

  let outcome = fx.topups.handle_callback(GatewayKind::MoMo, CallbackChannel::Ipn, params).await;
  assert_eq!(outcome.status, CallbackStatus::InvalidSignature);
  assert_eq!(outcome.ack, GatewayAck::MoMo { http_status: 400 });
}

#[tokio::test]
async fn gateway_failure_leaves_no_pending_row() {
  let fx = Fixture::new();
  let err = fx
    .topups
    .begin_top_up(fx.user_id(), GatewayKind::MoMo, 100_000, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::Gateway(_)));
  assert!(fx.store.wallet_transactions(fx.user_id()).await.unwrap().is_empty());
}

#[tokio::test]
async fn top_up_amount_limits_and_unknown_user() {
  let fx = Fixture::new();
  let limits = TopUpLimits::default();

  let err = fx
    .topups
    .begin_top_up(fx.user_id(), GatewayKind::VnPay, limits.min_amount - 1, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::Validation(_)));
  let err = fx
    .topups
    .begin_top_up(fx.user_id(), GatewayKind::VnPay, limits.max_amount + 1, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::Validation(_)));
  let err = fx
    .topups
    .begin_top_up(Uuid::new_v4(), GatewayKind::VnPay, 100_000, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::UserNotFound(_)));
}

#[tokio::test]
async fn unregistered_gateway_is_reported_not_raised() {
  let fx = Fixture::new();
  let registry = GatewayRegistry::new().with(PaymentGateway::VnPay(VnPayGateway::new(vnpay_config()).unwrap()));
  let service = TopUpService::new(fx.store.clone(), fx.ledger.clone(), Arc::new(registry), TopUpLimits::default());

  let err = service
    .begin_top_up(fx.user_id(), GatewayKind::MoMo, 100_000, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CommerceError::UnsupportedGateway(_)));

  let outcome = service
    .handle_callback(GatewayKind::MoMo, CallbackChannel::Ipn, momo_callback("X", 1, "0"))
    .await;
  assert!(matches!(outcome.status, CallbackStatus::Rejected(_)));
  assert_eq!(outcome.ack, GatewayAck::MoMo { http_status: 400 });
}

/// Delegates to a [`MemoryStore`] but reports the next `collisions` top-up
/// inserts as already-taken gateway ids.
struct CollidingStore {
  inner: Arc<MemoryStore>,
  collisions: AtomicUsize,
}

#[async_trait]
impl LedgerStore for CollidingStore {
  async fn customer(&self, user_id: Uuid) -> StoreResult<Option<Customer>> {
    self.inner.customer(user_id).await
  }
  async fn cart(&self, user_id: Uuid) -> StoreResult<Cart> {
    self.inner.cart(user_id).await
  }
  async fn product(&self, product_id: Uuid) -> StoreResult<Option<Product>> {
    self.inner.product(product_id).await
  }
  async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
    self.inner.order(order_id).await
  }
  async fn order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
    self.inner.order_by_number(order_number).await
  }
  async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
    self.inner.orders_for_user(user_id).await
  }
  async fn orders_awaiting_cancellation(&self) -> StoreResult<Vec<Order>> {
    self.inner.orders_awaiting_cancellation().await
  }
  async fn wallet_transactions(&self, user_id: Uuid) -> StoreResult<Vec<WalletTransaction>> {
    self.inner.wallet_transactions(user_id).await
  }
  async fn wallet_transactions_for_order(&self, order_id: Uuid) -> StoreResult<Vec<WalletTransaction>> {
    self.inner.wallet_transactions_for_order(order_id).await
  }
  async fn wallet_transaction_by_gateway_id(&self, gateway_transaction_id: &str) -> StoreResult<Option<WalletTransaction>> {
    self.inner.wallet_transaction_by_gateway_id(gateway_transaction_id).await
  }
  async fn apply(&self, changes: ChangeSet) -> StoreResult<()> {
    let inserts_top_up = changes.summary().contains("insert_wallet_transaction");
    if inserts_top_up
      && self
        .collisions
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
    {
      return Err(StoreError::DuplicateGatewayTransaction("taken".to_string()));
    }
    self.inner.apply(changes).await
  }
}

fn colliding_service(fx: &Fixture, collisions: usize) -> TopUpService {
  let store = Arc::new(CollidingStore {
    inner: fx.store.clone(),
    collisions: AtomicUsize::new(collisions),
  });
  let ledger = Arc::new(WalletLedger::new(store.clone()));
  TopUpService::new(store, ledger, Arc::new(registry()), TopUpLimits::default())
}

#[tokio::test]
async fn colliding_transaction_reference_is_regenerated() {
  let fx = Fixture::new();
  let service = colliding_service(&fx, 2);

  let init = service
    .begin_top_up(fx.user_id(), GatewayKind::VnPay, 150_000, None)
    .await
    .unwrap();

  let row = fx.ledger.top_up_by_gateway_id(&init.gateway_transaction_id).await.unwrap().unwrap();
  assert_eq!(row.status, TransactionStatus::Pending);
  assert_eq!(row.amount, 150_000);
  assert_eq!(fx.ledger.history(fx.user_id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn persistent_reference_collisions_give_up_after_bounded_attempts() {
  let fx = Fixture::new();
  let service = colliding_service(&fx, MAX_COMMIT_ATTEMPTS);

  let err = service
    .begin_top_up(fx.user_id(), GatewayKind::VnPay, 150_000, None)
    .await
    .unwrap_err();

  assert!(matches!(err, CommerceError::Store(StoreError::DuplicateGatewayTransaction(_))));
  assert!(fx.ledger.history(fx.user_id()).await.unwrap().is_empty());
}
