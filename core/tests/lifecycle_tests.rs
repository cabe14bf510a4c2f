// tests/lifecycle_tests.rs
mod common;

use common::*;
use uuid::Uuid;
use verdant_core::models::{OrderStatus, PaymentStatus, TransactionStatus, TransactionType};
use verdant_core::store::LedgerStore;
use verdant_core::{CommerceError, ErrorKind};

#[tokio::test]
async fn happy_path_walks_every_state() {
  let fx = Fixture::new();
  fx.fill_cart(&[(&fx.fern, 1)], 0);
  let order = fx.engine.create_order(fx.checkout(0, 0)).await.unwrap();

  for status in [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
    let updated = fx.engine.update_status(order.id, status, None).await.unwrap();
    assert_eq!(updated.status, status);
  }

  let delivered = fx.engine.order(order.id).await.unwrap();
  assert!(delivered.shipped_at.is_some());
  assert!(delivered.delivered_at.is_some());
  assert_eq!(delivered.payment_status, PaymentStatus::Success);
  assert_eq!(delivered.version, 4);
  assert_eq!(fx.sink.events().len(), 5);
}

#[tokio::test]
async fn scenario_delivery_debits_held_wallet_amount() {
  let fx = Fixture::new();
  fx.fund(500_000).await;
  fx.fill_cart(&[(&fx.fern, 3)], 0);

  let order = fx.engine.create_order(fx.checkout(0, 300_000)).await.unwrap();
  assert_eq!(order.payment_status, PaymentStatus::Pending);
  assert_eq!(fx.balance(), 500_000);

  fx.engine.update_status(order.id, OrderStatus::Delivered, None).await.unwrap();
  assert_eq!(fx.balance(), 200_000);

  let hold = fx
    .store
    .wallet_transactions_for_order(order.id)
    .await
    .unwrap()
    .into_iter()
    .find(|t| t.transaction_type == TransactionType::Hold)
    .unwrap();
  assert_eq!(hold.status, TransactionStatus::Success);
  assert_eq!((hold.balance_before, hold.balance_after), (500_000, 200_000));
  assert!(fx.ledger.verify_balance(fx.user_id()).await.unwrap().is_consistent());
}

#[tokio::test]
async fn reapplying_delivered_is_a_no_op() {
  let fx = Fixture::new();
  fx.fund(500_000).await;
  fx.fill_cart(&[(&fx.fern, 3)], 0);
  let order = fx.engine.create_order(fx.checkout(0, 300_000)).await.unwrap();

  let first = fx.engine.update_status(order.id, OrderStatus::Delivered, None).await.unwrap();
  let points_after_first = fx.store.customer(fx.user_id()).await.unwrap().unwrap().points;
  let second = fx.engine.update_status(order.id, OrderStatus::Delivered, None).await.unwrap();

  assert_eq!(first.delivered_at, second.delivered_at);
  assert_eq!(first.points_awarded_at, second.points_awarded_at);
  assert_eq!(second.version, first.version);
  assert_eq!(fx.balance(), 200_000);
  assert_eq!(points_after_first, 6);
  assert_eq!(fx.store.customer(fx.user_id()).await.unwrap().unwrap().points, 6);
  assert_eq!(fx.store.wallet_transactions_for_order(order.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn shipped_at_is_set_once() {
  let fx = Fixture::new();
  fx.fill_cart(&[(&fx.fern, 1)], 0);
  let order = fx.engine.create_order(fx.checkout(0, 0)).await.unwrap();

  let shipped = fx.engine.update_status(order.id, OrderStatus::Shipped, None).await.unwrap();
  let again = fx.engine.update_status(order.id, OrderStatus::Shipped, None).await.unwrap();
  assert_eq!(shipped.shipped_at, again.shipped_at);

  let delivered = fx.engine.update_status(order.id, OrderStatus::Delivered, None).await.unwrap();
  assert_eq!(delivered.shipped_at, shipped.shipped_at);
}

#[tokio::test]
async fn backwards_moves_and_leaving_cancelled_are_rejected() {
  let fx = Fixture::new();
  fx.fill_cart(&[(&fx.fern, 1)], 0);
  let order = fx.engine.create_order(fx.checkout(0, 0)).await.unwrap();

  fx.engine.update_status(order.id, OrderStatus::Processing, None).await.unwrap();
  let err = fx.engine.update_status(order.id, OrderStatus::Confirmed, None).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);

  fx.engine.update_status(order.id, OrderStatus::Cancelled, Some("out of season")).await.unwrap();
  for status in [OrderStatus::Pending, OrderStatus::Shipped, OrderStatus::Delivered] {
    let err = fx.engine.update_status(order.id, status, None).await.unwrap_err();
    assert!(matches!(err, CommerceError::InvalidState(_)));
  }
}

#[tokio::test]
async fn missing_order_is_not_found() {
  let fx = Fixture::new();
  let err = fx.engine.update_status(Uuid::new_v4(), OrderStatus::Confirmed, None).await.unwrap_err();
  assert!(matches!(err, CommerceError::OrderNotFound(_)));
}

#[tokio::test]
async fn scenario_cancel_before_delivery_releases_hold_and_restores_stock() {
  let fx = Fixture::new();
  fx.fund(500_000).await;
  fx.fill_cart(&[(&fx.fern, 2), (&fx.monstera, 2)], 0);

  let order = fx.engine.create_order(fx.checkout(0, 300_000)).await.unwrap();
  assert_eq!((fx.stock(&fx.fern), fx.stock(&fx.monstera)), (8, 3));

  let cancelled = fx.engine.update_status(order.id, OrderStatus::Cancelled, None).await.unwrap();

  assert_eq!(cancelled.cancelled_reason.as_deref(), Some(""));
  assert!(cancelled.cancelled_at.is_some());
  assert_eq!(cancelled.payment_status, PaymentStatus::Failed);
  assert_eq!(fx.balance(), 500_000);
  assert_eq!((fx.stock(&fx.fern), fx.stock(&fx.monstera)), (10, 5));

  let rows = fx.store.wallet_transactions_for_order(order.id).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].status, TransactionStatus::Failed);

  // Re-delivery of the same event restores nothing twice.
  let again = fx.engine.update_status(order.id, OrderStatus::Cancelled, Some("again")).await.unwrap();
  assert_eq!(again.cancelled_at, cancelled.cancelled_at);
  assert_eq!(again.cancelled_reason.as_deref(), Some(""));
  assert_eq!((fx.stock(&fx.fern), fx.stock(&fx.monstera)), (10, 5));
}

#[tokio::test]
async fn cancelling_delivered_order_refunds_without_shipping() {
  let fx = Fixture::new();
  fx.fund(500_000).await;
  fx.fill_cart(&[(&fx.fern, 2)], 0);

  // subtotal 200,000 + shipping 30,000; the whole total comes from the wallet.
  let order = fx.engine.create_order(fx.checkout(30_000, 230_000)).await.unwrap();
  fx.engine.update_status(order.id, OrderStatus::Delivered, None).await.unwrap();
  assert_eq!(fx.balance(), 270_000);

  let cancelled = fx
    .engine
    .update_status(order.id, OrderStatus::Cancelled, Some("damaged on arrival"))
    .await
    .unwrap();
  assert_eq!(cancelled.payment_status, PaymentStatus::Success);
  assert_eq!(cancelled.cancelled_reason.as_deref(), Some("damaged on arrival"));
  assert_eq!(fx.balance(), 470_000);

  let refund = fx
    .store
    .wallet_transactions_for_order(order.id)
    .await
    .unwrap()
    .into_iter()
    .find(|t| t.transaction_type == TransactionType::Refund)
    .unwrap();
  assert_eq!(refund.amount, 200_000);
  assert_eq!(refund.status, TransactionStatus::Success);
  assert_eq!((refund.balance_before, refund.balance_after), (270_000, 470_000));
  assert!(fx.ledger.verify_balance(fx.user_id()).await.unwrap().is_consistent());
}

#[tokio::test]
async fn delivery_fails_when_balance_was_spent_elsewhere() {
  let fx = Fixture::new();
  fx.fund(300_000).await;
  fx.fill_cart(&[(&fx.fern, 3)], 0);
  let first = fx.engine.create_order(fx.checkout(0, 300_000)).await.unwrap();
  fx.fill_cart(&[(&fx.fern, 3)], 0);
  let second = fx.engine.create_order(fx.checkout(0, 300_000)).await.unwrap();

  fx.engine.update_status(first.id, OrderStatus::Delivered, None).await.unwrap();
  let err = fx.engine.update_status(second.id, OrderStatus::Delivered, None).await.unwrap_err();

  assert!(matches!(err, CommerceError::InsufficientBalance { available: 0, requested: 300_000 }));
  let second = fx.engine.order(second.id).await.unwrap();
  assert_eq!(second.status, OrderStatus::Pending);
  assert!(second.delivered_at.is_none());
  assert_eq!(fx.balance(), 0);
}

#[tokio::test]
async fn status_events_are_published_once_per_change() {
  let fx = Fixture::new();
  fx.fill_cart(&[(&fx.fern, 1)], 0);
  let order = fx.engine.create_order(fx.checkout(0, 0)).await.unwrap();

  fx.engine.update_status(order.id, OrderStatus::Confirmed, None).await.unwrap();
  fx.engine.update_status(order.id, OrderStatus::Confirmed, None).await.unwrap();

  let statuses: Vec<_> = fx.sink.events().into_iter().map(|e| e.status).collect();
  assert_eq!(statuses, vec![OrderStatus::Pending, OrderStatus::Confirmed]);
}
