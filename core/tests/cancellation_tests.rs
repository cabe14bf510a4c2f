// tests/cancellation_tests.rs
mod common;

use common::*;
use uuid::Uuid;
use verdant_core::models::{OrderStatus, TransactionStatus};
use verdant_core::store::LedgerStore;
use verdant_core::{CommerceError, ErrorKind};

async fn placed_order(fx: &Fixture, wallet_amount: i64) -> verdant_core::models::Order {
  fx.fill_cart(&[(&fx.fern, 2)], 0);
  fx.engine.create_order(fx.checkout(0, wallet_amount)).await.unwrap()
}

#[tokio::test]
async fn request_records_reason_without_changing_status() {
  let fx = Fixture::new();
  let order = placed_order(&fx, 0).await;

  let requested = fx
    .engine
    .request_cancellation(fx.user_id(), order.id, "  Đặt nhầm sản phẩm ")
    .await
    .unwrap();

  assert_eq!(requested.status, OrderStatus::Pending);
  let request = requested.cancellation_request.as_ref().unwrap();
  assert_eq!(request.reason, "Đặt nhầm sản phẩm");
  assert!(requested.cancelled_reason.is_none());

  let pending = fx.engine.pending_cancellations().await.unwrap();
  assert_eq!(pending.iter().map(|o| o.id).collect::<Vec<_>>(), vec![order.id]);
}

#[tokio::test]
async fn second_request_is_rejected_while_one_is_pending() {
  let fx = Fixture::new();
  let order = placed_order(&fx, 0).await;
  fx.engine.request_cancellation(fx.user_id(), order.id, "first").await.unwrap();

  let err = fx.engine.request_cancellation(fx.user_id(), order.id, "second").await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn request_is_only_allowed_before_fulfilment() {
  let fx = Fixture::new();
  let order = placed_order(&fx, 0).await;
  fx.engine.update_status(order.id, OrderStatus::Confirmed, None).await.unwrap();
  fx.engine.request_cancellation(fx.user_id(), order.id, "ok while confirmed").await.unwrap();
  fx.engine.reject_cancellation(order.id).await.unwrap();

  fx.engine.update_status(order.id, OrderStatus::Shipped, None).await.unwrap();
  let err = fx.engine.request_cancellation(fx.user_id(), order.id, "too late").await.unwrap_err();
  assert!(matches!(err, CommerceError::InvalidState(_)));
}

#[tokio::test]
async fn request_on_someone_elses_order_is_unauthorized() {
  let fx = Fixture::new();
  let order = placed_order(&fx, 0).await;
  let stranger = Uuid::new_v4();

  let err = fx.engine.request_cancellation(stranger, order.id, "mine now").await.unwrap_err();
  assert!(matches!(err, CommerceError::Unauthorized { user_id, .. } if user_id == stranger));

  let err = fx.engine.order_for_customer(stranger, order.id).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn blank_reason_is_a_validation_error() {
  let fx = Fixture::new();
  let order = placed_order(&fx, 0).await;
  let err = fx.engine.request_cancellation(fx.user_id(), order.id, "   ").await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn approval_cancels_with_customer_reason_and_admin_note() {
  let fx = Fixture::new();
  fx.fund(500_000).await;
  let order = placed_order(&fx, 150_000).await;
  fx.engine.request_cancellation(fx.user_id(), order.id, "Đổi ý").await.unwrap();

  let cancelled = fx.engine.approve_cancellation(order.id, Some("đã liên hệ khách")).await.unwrap();

  assert_eq!(cancelled.status, OrderStatus::Cancelled);
  assert_eq!(cancelled.cancelled_reason.as_deref(), Some("Đổi ý (Admin: đã liên hệ khách)"));
  assert!(cancelled.cancellation_request.is_none());
  assert_eq!(fx.stock(&fx.fern), 10);
  assert_eq!(fx.balance(), 500_000);
  let hold = &fx.store.wallet_transactions_for_order(order.id).await.unwrap()[0];
  assert_eq!(hold.status, TransactionStatus::Failed);
  assert!(fx.engine.pending_cancellations().await.unwrap().is_empty());
}

#[tokio::test]
async fn approval_without_note_keeps_customer_reason() {
  let fx = Fixture::new();
  let order = placed_order(&fx, 0).await;
  fx.engine.request_cancellation(fx.user_id(), order.id, "Giao chậm").await.unwrap();

  let cancelled = fx.engine.approve_cancellation(order.id, None).await.unwrap();
  assert_eq!(cancelled.cancelled_reason.as_deref(), Some("Giao chậm"));
}

#[tokio::test]
async fn rejection_clears_request_and_keeps_status() {
  let fx = Fixture::new();
  let order = placed_order(&fx, 0).await;
  fx.engine.request_cancellation(fx.user_id(), order.id, "Đổi ý").await.unwrap();

  let kept = fx.engine.reject_cancellation(order.id).await.unwrap();
  assert_eq!(kept.status, OrderStatus::Pending);
  assert!(kept.cancellation_request.is_none());
  assert!(kept.cancelled_reason.is_none());
  assert_eq!(fx.stock(&fx.fern), 8);

  // A new request may be filed after a rejection.
  fx.engine.request_cancellation(fx.user_id(), order.id, "Vẫn muốn hủy").await.unwrap();
}

#[tokio::test]
async fn approve_and_reject_require_a_pending_request() {
  let fx = Fixture::new();
  let order = placed_order(&fx, 0).await;

  let err = fx.engine.approve_cancellation(order.id, None).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
  let err = fx.engine.reject_cancellation(order.id).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn approval_and_rejection_are_mutually_exclusive() {
  let fx = Fixture::new();
  let order = placed_order(&fx, 0).await;
  fx.engine.request_cancellation(fx.user_id(), order.id, "Đổi ý").await.unwrap();

  fx.engine.reject_cancellation(order.id).await.unwrap();
  let err = fx.engine.approve_cancellation(order.id, None).await.unwrap_err();
  assert!(matches!(err, CommerceError::InvalidState(_)));
  assert_eq!(fx.engine.order(order.id).await.unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn customer_queries_are_scoped_to_owner() {
  let fx = Fixture::new();
  let first = placed_order(&fx, 0).await;
  let second = placed_order(&fx, 0).await;

  let mine = fx.engine.orders_for_customer(fx.user_id()).await.unwrap();
  let ids: Vec<_> = mine.iter().map(|o| o.id).collect();
  assert_eq!(ids.len(), 2);
  assert!(ids.contains(&first.id) && ids.contains(&second.id));

  let fetched = fx.engine.order_for_customer(fx.user_id(), first.id).await.unwrap();
  assert_eq!(fetched.order_number, first.order_number);
}
