// verdant/src/orders/engine.rs

//! The order lifecycle engine.
//!
//! Every state change is planned against a fresh read of the order and
//! committed as one change set guarded by the order's version, so concurrent
//! transitions on the same order serialize and re-plan instead of stacking
//! side effects. Re-entering the current status is a no-op.

use super::checkout::{build_checkout_pipeline, CheckoutCtx, CheckoutRequest};
use crate::error::{CommerceError, CommerceResult};
use crate::models::{CancellationRequest, Customer, Order, OrderStatus, PaymentStatus, TransactionStatus};
use crate::notify::{publish_quietly, NotificationSink, OrderEvent};
use crate::pipeline::{ContextData, Pipeline, PipelineResult};
use crate::store::{retry_on_conflict, ChangeSet, LedgerStore, Mutation};
use crate::wallet::ledger::{hold_debited, pending_hold, plan_confirm_hold, plan_refund};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of planning and committing one status change.
struct Transition {
  order: Order,
  changed: bool,
}

pub struct OrderEngine {
  store: Arc<dyn LedgerStore>,
  sink: Arc<dyn NotificationSink>,
  checkout: Pipeline<CheckoutCtx, CommerceError>,
}

impl OrderEngine {
  pub fn new(store: Arc<dyn LedgerStore>, sink: Arc<dyn NotificationSink>) -> Self {
    Self {
      store,
      sink,
      checkout: build_checkout_pipeline(),
    }
  }

  /// Turns the customer's cart into a PENDING order.
  #[instrument(name = "orders::create_order", skip(self, request), fields(user_id = %request.user_id, wallet_amount = request.wallet_amount), err(Display))]
  pub async fn create_order(&self, request: CheckoutRequest) -> CommerceResult<Order> {
    let request = &request;
    retry_on_conflict("create_order", move || async move {
      let ctx_data = ContextData::new(CheckoutCtx::new(self.store.clone(), self.sink.clone(), request.clone()));
      match self.checkout.run(ctx_data.clone()).await? {
        PipelineResult::Completed => ctx_data
          .into_inner()
          .order
          .ok_or_else(|| CommerceError::InvalidState("checkout completed without an order".to_string())),
        PipelineResult::Stopped => Err(CommerceError::InvalidState("checkout was stopped".to_string())),
      }
    })
    .await
  }

  /// Admin-driven status change with its stock, wallet and timestamp side effects.
  #[instrument(name = "orders::update_status", skip_all, fields(%order_id, status = %new_status), err(Display))]
  pub async fn update_status(&self, order_id: Uuid, new_status: OrderStatus, reason: Option<&str>) -> CommerceResult<Order> {
    let transition = retry_on_conflict("update_status", move || async move {
      let order = self.load(order_id).await?;
      self.transition(order, new_status, reason).await
    })
    .await?;
    self.announce(&transition).await;
    Ok(transition.order)
  }

  /// Customer asks for cancellation. The status is left alone until an admin decides.
  #[instrument(name = "orders::request_cancellation", skip_all, fields(%user_id, %order_id), err(Display))]
  pub async fn request_cancellation(&self, user_id: Uuid, order_id: Uuid, reason: &str) -> CommerceResult<Order> {
    let reason = reason.trim();
    if reason.is_empty() {
      return Err(CommerceError::Validation("a cancellation reason is required".to_string()));
    }
    let order = retry_on_conflict("request_cancellation", move || async move {
      let order = self.load_owned(user_id, order_id).await?;
      if !order.status.accepts_cancellation_request() {
        return Err(CommerceError::InvalidState(format!(
          "order {} is {} and can no longer be cancelled by the customer",
          order.order_number, order.status
        )));
      }
      if order.has_pending_cancellation() {
        return Err(CommerceError::InvalidState(format!(
          "order {} already has a pending cancellation request",
          order.order_number
        )));
      }
      let now = Utc::now();
      let mut updated = order.clone();
      updated.cancellation_request = Some(CancellationRequest {
        reason: reason.to_string(),
        requested_at: now,
      });
      updated.updated_at = now;
      self.commit_header(&order, updated).await
    })
    .await?;

    let message = format!("Khách hàng yêu cầu hủy đơn hàng {}", order.order_number);
    publish_quietly(self.sink.as_ref(), OrderEvent::for_order(&order, message)).await;
    Ok(order)
  }

  /// Cancels an order whose customer asked for it. The recorded reason is the
  /// customer's, with the admin note appended when one is given.
  #[instrument(name = "orders::approve_cancellation", skip_all, fields(%order_id), err(Display))]
  pub async fn approve_cancellation(&self, order_id: Uuid, admin_note: Option<&str>) -> CommerceResult<Order> {
    let transition = retry_on_conflict("approve_cancellation", move || async move {
      let order = self.load(order_id).await?;
      let request = order.cancellation_request.clone().ok_or_else(|| no_pending_request(&order))?;
      let reason = match admin_note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(note) => format!("{} (Admin: {})", request.reason, note),
        None => request.reason,
      };
      self.transition(order, OrderStatus::Cancelled, Some(&reason)).await
    })
    .await?;
    self.announce(&transition).await;
    Ok(transition.order)
  }

  #[instrument(name = "orders::reject_cancellation", skip(self), err(Display))]
  pub async fn reject_cancellation(&self, order_id: Uuid) -> CommerceResult<Order> {
    let order = retry_on_conflict("reject_cancellation", move || async move {
      let order = self.load(order_id).await?;
      if !order.has_pending_cancellation() {
        return Err(no_pending_request(&order));
      }
      let mut updated = order.clone();
      updated.cancellation_request = None;
      updated.updated_at = Utc::now();
      self.commit_header(&order, updated).await
    })
    .await?;

    let message = format!("Yêu cầu hủy đơn hàng {} đã bị từ chối", order.order_number);
    publish_quietly(self.sink.as_ref(), OrderEvent::for_order(&order, message)).await;
    Ok(order)
  }

  pub async fn order_for_customer(&self, user_id: Uuid, order_id: Uuid) -> CommerceResult<Order> {
    self.load_owned(user_id, order_id).await
  }

  pub async fn orders_for_customer(&self, user_id: Uuid) -> CommerceResult<Vec<Order>> {
    self.customer(user_id).await?;
    Ok(self.store.orders_for_user(user_id).await?)
  }

  pub async fn order(&self, order_id: Uuid) -> CommerceResult<Order> {
    self.load(order_id).await
  }

  pub async fn order_by_number(&self, order_number: &str) -> CommerceResult<Order> {
    self
      .store
      .order_by_number(order_number)
      .await?
      .ok_or_else(|| CommerceError::OrderNotFound(order_number.to_string()))
  }

  pub async fn pending_cancellations(&self) -> CommerceResult<Vec<Order>> {
    Ok(self.store.orders_awaiting_cancellation().await?)
  }

  async fn load(&self, order_id: Uuid) -> CommerceResult<Order> {
    self
      .store
      .order(order_id)
      .await?
      .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))
  }

  async fn load_owned(&self, user_id: Uuid, order_id: Uuid) -> CommerceResult<Order> {
    let order = self.load(order_id).await?;
    if order.user_id != user_id {
      warn!(%user_id, %order_id, "order ownership check failed");
      return Err(CommerceError::Unauthorized { user_id, order_id });
    }
    Ok(order)
  }

  async fn customer(&self, user_id: Uuid) -> CommerceResult<Customer> {
    self
      .store
      .customer(user_id)
      .await?
      .ok_or(CommerceError::UserNotFound(user_id))
  }

  /// Writes a header-only change (no stock or wallet effects).
  async fn commit_header(&self, current: &Order, mut updated: Order) -> CommerceResult<Order> {
    let mut changes = ChangeSet::new();
    changes.push(Mutation::UpdateOrder {
      order: updated.clone(),
      expected_version: current.version,
    });
    self.store.apply(changes).await?;
    updated.version = current.version + 1;
    Ok(updated)
  }

  async fn transition(&self, order: Order, target: OrderStatus, reason: Option<&str>) -> CommerceResult<Transition> {
    if order.status == target {
      return Ok(Transition { order, changed: false });
    }
    if !order.status.can_transition_to(target) {
      return Err(CommerceError::InvalidState(format!(
        "order {} cannot move from {} to {}",
        order.order_number, order.status, target
      )));
    }

    let now = Utc::now();
    let mut updated = order.clone();
    updated.status = target;
    updated.updated_at = now;

    let side_effects = match target {
      OrderStatus::Shipped => {
        updated.shipped_at.get_or_insert(now);
        Vec::new()
      }
      OrderStatus::Delivered => self.plan_delivery(&order, &mut updated, now).await?,
      OrderStatus::Cancelled => self.plan_cancellation(&order, &mut updated, reason, now).await?,
      OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing => Vec::new(),
    };

    let mut changes = ChangeSet::new();
    changes.push(Mutation::UpdateOrder {
      order: updated.clone(),
      expected_version: order.version,
    });
    changes.extend(side_effects);
    let summary = changes.summary();
    self.store.apply(changes).await?;
    updated.version = order.version + 1;

    info!(order_number = %updated.order_number, from = %order.status, to = %target, mutations = %summary, "order status changed");
    Ok(Transition {
      order: updated,
      changed: true,
    })
  }

  /// Points are awarded once, and the wallet hold is debited here rather than at checkout.
  async fn plan_delivery(&self, order: &Order, updated: &mut Order, now: DateTime<Utc>) -> CommerceResult<Vec<Mutation>> {
    let mut mutations = Vec::new();
    updated.delivered_at.get_or_insert(now);
    updated.payment_status = PaymentStatus::Success;

    if order.points_earned > 0 && order.points_awarded_at.is_none() {
      updated.points_awarded_at = Some(now);
      mutations.push(Mutation::AwardPoints {
        user_id: order.user_id,
        points: order.points_earned,
      });
    }

    if order.wallet_amount_used > 0 {
      if let Some(hold) = pending_hold(self.store.as_ref(), order.id).await? {
        let customer = self.customer(order.user_id).await?;
        let (_, settle) = plan_confirm_hold(&hold, TransactionStatus::Success, customer.wallet_balance, now)?;
        mutations.extend(settle);
      }
    }
    Ok(mutations)
  }

  /// Restores stock and reverses the wallet: a pending hold is released, a
  /// debited one is refunded without the shipping fee.
  async fn plan_cancellation(
    &self,
    order: &Order,
    updated: &mut Order,
    reason: Option<&str>,
    now: DateTime<Utc>,
  ) -> CommerceResult<Vec<Mutation>> {
    let reason = reason
      .map(str::to_string)
      .or_else(|| order.cancellation_request.as_ref().map(|r| r.reason.clone()))
      .unwrap_or_default();
    updated.cancelled_reason = Some(reason);
    updated.cancelled_at.get_or_insert(now);
    updated.cancellation_request = None;
    if order.payment_status != PaymentStatus::Success {
      updated.payment_status = PaymentStatus::Failed;
    }

    let mut mutations: Vec<Mutation> = order
      .items
      .iter()
      .map(|item| Mutation::AdjustStock {
        product_id: item.product_id,
        delta: item.quantity,
      })
      .collect();

    if order.wallet_amount_used > 0 {
      let store = self.store.as_ref();
      if let Some(hold) = pending_hold(store, order.id).await? {
        let customer = self.customer(order.user_id).await?;
        let (_, release) = plan_confirm_hold(&hold, TransactionStatus::Failed, customer.wallet_balance, now)?;
        mutations.extend(release);
      } else if hold_debited(store, order.id).await? {
        let amount = order.refundable_wallet_amount();
        if amount > 0 {
          let customer = self.customer(order.user_id).await?;
          let description = format!("Hoàn tiền đơn hàng {}", order.order_number);
          let (_, refund) = plan_refund(&customer, order.id, amount, &description, now);
          mutations.extend(refund);
        }
      } else {
        warn!(order_id = %order.id, "order used wallet money but has no hold to reverse");
      }
    }
    Ok(mutations)
  }

  async fn announce(&self, transition: &Transition) {
    if !transition.changed {
      return;
    }
    let order = &transition.order;
    let message = status_message(order);
    publish_quietly(self.sink.as_ref(), OrderEvent::for_order(order, message)).await;
  }
}

fn no_pending_request(order: &Order) -> CommerceError {
  CommerceError::InvalidState(format!("order {} has no pending cancellation request", order.order_number))
}

fn status_message(order: &Order) -> String {
  let n = &order.order_number;
  match order.status {
    OrderStatus::Pending => format!("Đơn hàng {} đang chờ xác nhận", n),
    OrderStatus::Confirmed => format!("Đơn hàng {} đã được xác nhận", n),
    OrderStatus::Processing => format!("Đơn hàng {} đang được chuẩn bị", n),
    OrderStatus::Shipped => format!("Đơn hàng {} đang được giao", n),
    OrderStatus::Delivered => format!("Đơn hàng {} đã giao thành công", n),
    OrderStatus::Cancelled => format!("Đơn hàng {} đã bị hủy", n),
  }
}
