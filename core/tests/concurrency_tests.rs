// tests/concurrency_tests.rs
mod common;

use common::*;
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;
use verdant_core::models::{Cart, CartLine, Customer, OrderStatus, PaymentStatus};
use verdant_core::wallet::TopUpConfirmation;
use verdant_core::{CheckoutRequest, CommerceError, GatewayKind};

fn add_customer_with_cart(fx: &Fixture, product_id: Uuid, quantity: i64) -> Uuid {
  let id = Uuid::new_v4();
  fx.store.insert_customer(Customer {
    id,
    email: format!("{}@example.vn", id.simple()),
    full_name: "Khách hàng".to_string(),
    wallet_balance: 0,
    points: 0,
  });
  fx.store.put_cart(Cart {
    user_id: id,
    lines: vec![CartLine { product_id, quantity }],
    discount_amount: 0,
  });
  id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_never_oversell() {
  let fx = Arc::new(Fixture::new());
  let product_id = fx.monstera.id;
  let buyers: Vec<Uuid> = (0..8).map(|_| add_customer_with_cart(&fx, product_id, 1)).collect();

  let handles = buyers.into_iter().map(|user_id| {
    let fx = fx.clone();
    tokio::spawn(async move {
      fx.engine
        .create_order(CheckoutRequest {
          user_id,
          shipping: shipping(),
          shipping_fee: 0,
          wallet_amount: 0,
          note: None,
        })
        .await
    })
  });
  let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

  let placed = results.iter().filter(|r| r.is_ok()).count();
  assert_eq!(placed, 5);
  for err in results.iter().filter_map(|r| r.as_ref().err()) {
    assert!(matches!(err, CommerceError::InsufficientStock { .. }), "unexpected error: {err}");
  }
  assert_eq!(fx.stock(&fx.monstera), 0);
  assert_eq!(fx.store.order_count(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_debit_the_wallet_once() {
  let fx = Arc::new(Fixture::new());
  fx.fund(300_000).await;
  fx.fill_cart(&[(&fx.fern, 2)], 0);
  let order = fx.engine.create_order(fx.checkout(0, 200_000)).await.unwrap();

  let handles = (0..4).map(|_| {
    let fx = fx.clone();
    tokio::spawn(async move { fx.engine.update_status(order.id, OrderStatus::Delivered, None).await })
  });
  for result in join_all(handles).await {
    result.unwrap().unwrap();
  }

  let delivered = fx.engine.order(order.id).await.unwrap();
  assert_eq!(delivered.status, OrderStatus::Delivered);
  assert_eq!(delivered.payment_status, PaymentStatus::Success);
  assert_eq!(delivered.version, 1);
  assert_eq!(fx.balance(), 100_000);
  assert!(fx.ledger.verify_balance(fx.user_id()).await.unwrap().is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delivery_racing_cancellation_ends_cancelled_with_wallet_restored() {
  let fx = Arc::new(Fixture::new());
  fx.fund(300_000).await;
  fx.fill_cart(&[(&fx.fern, 2)], 0);
  let order = fx.engine.create_order(fx.checkout(0, 200_000)).await.unwrap();

  let deliver = {
    let fx = fx.clone();
    tokio::spawn(async move { fx.engine.update_status(order.id, OrderStatus::Delivered, None).await })
  };
  let cancel = {
    let fx = fx.clone();
    tokio::spawn(async move {
      fx.engine
        .update_status(order.id, OrderStatus::Cancelled, Some("Khách đổi ý"))
        .await
    })
  };
  let (delivered, cancelled) = (deliver.await.unwrap(), cancel.await.unwrap());

  // Cancellation is always legal; delivery loses only if the cancel landed first.
  cancelled.unwrap();
  if let Err(e) = delivered {
    assert!(matches!(e, CommerceError::InvalidState(_)), "unexpected error: {e}");
  }

  let order = fx.engine.order(order.id).await.unwrap();
  assert_eq!(order.status, OrderStatus::Cancelled);
  assert_eq!(fx.balance(), 300_000);
  assert_eq!(fx.stock(&fx.fern), 10);
  assert!(fx.ledger.verify_balance(fx.user_id()).await.unwrap().is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_top_up_confirmations_credit_once() {
  let fx = Arc::new(Fixture::new());
  fx.ledger
    .record_pending_top_up(fx.user_id(), 150_000, GatewayKind::VnPay, "RACE0001", "Nap tien")
    .await
    .unwrap();

  let handles = (0..6).map(|_| {
    let fx = fx.clone();
    tokio::spawn(async move { fx.ledger.confirm_top_up_by_gateway_id("RACE0001", 150_000).await })
  });
  let outcomes: Vec<TopUpConfirmation> = join_all(handles)
    .await
    .into_iter()
    .map(|r| r.unwrap().unwrap())
    .collect();

  let confirmed = outcomes
    .iter()
    .filter(|o| matches!(o, TopUpConfirmation::Confirmed(_)))
    .count();
  assert_eq!(confirmed, 1);
  assert_eq!(fx.balance(), 150_000);
  assert!(fx.ledger.verify_balance(fx.user_id()).await.unwrap().is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approve_and_reject_are_mutually_exclusive() {
  let fx = Arc::new(Fixture::new());
  fx.fill_cart(&[(&fx.monstera, 1)], 0);
  let order = fx.engine.create_order(fx.checkout(0, 0)).await.unwrap();
  fx.engine
    .request_cancellation(fx.user_id(), order.id, "Đặt nhầm")
    .await
    .unwrap();

  let approve = {
    let fx = fx.clone();
    tokio::spawn(async move { fx.engine.approve_cancellation(order.id, Some("ok")).await })
  };
  let reject = {
    let fx = fx.clone();
    tokio::spawn(async move { fx.engine.reject_cancellation(order.id).await })
  };
  let (approved, rejected) = (approve.await.unwrap(), reject.await.unwrap());
  assert!(approved.is_ok() ^ rejected.is_ok());

  let order = fx.engine.order(order.id).await.unwrap();
  assert!(order.cancellation_request.is_none());
  if approved.is_ok() {
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(fx.stock(&fx.monstera), 5);
  } else {
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(fx.stock(&fx.monstera), 4);
  }
}
