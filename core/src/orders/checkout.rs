// verdant/src/orders/checkout.rs

//! Checkout as a named-step pipeline.
//!
//! Preconditions run in a fixed order and fail fast: customer, cart, stock,
//! wallet. `commit_order` then writes the order, its item snapshots, the stock
//! reservation, the optional wallet hold and the cart clear as one change set.

use super::number;
use crate::error::{CommerceError, CommerceResult, StoreError};
use crate::models::{Cart, CartLine, Customer, Money, Order, OrderItem, OrderStatus, PaymentStatus, Product, ShippingInfo};
use crate::notify::{publish_quietly, NotificationSink, OrderEvent};
use crate::pipeline::{ContextData, Pipeline, PipelineControl, SkipCondition};
use crate::store::{ChangeSet, LedgerStore, Mutation, MAX_COMMIT_ATTEMPTS};
use crate::wallet::ledger::plan_hold;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CHECKOUT_PIPELINE: &str = "checkout";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
  pub user_id: Uuid,
  pub shipping: ShippingInfo,
  pub shipping_fee: Money,
  /// Wallet money the customer wants to put towards this order. Zero for none.
  pub wallet_amount: Money,
  pub note: Option<String>,
}

/// A cart line joined with the product it was verified against.
#[derive(Debug, Clone)]
pub struct VerifiedLine {
  pub line: CartLine,
  pub product: Product,
}

#[derive(Clone)]
pub struct CheckoutCtx {
  pub store: Arc<dyn LedgerStore>,
  pub sink: Arc<dyn NotificationSink>,
  pub request: CheckoutRequest,

  pub customer: Option<Customer>,
  pub cart: Option<Cart>,
  pub lines: Vec<VerifiedLine>,

  pub subtotal: Money,
  pub discount_amount: Money,
  pub total: Money,
  pub points_earned: i64,

  pub order: Option<Order>,
}

impl CheckoutCtx {
  pub fn new(store: Arc<dyn LedgerStore>, sink: Arc<dyn NotificationSink>, request: CheckoutRequest) -> Self {
    Self {
      store,
      sink,
      request,
      customer: None,
      cart: None,
      lines: Vec::new(),
      subtotal: 0,
      discount_amount: 0,
      total: 0,
      points_earned: 0,
      order: None,
    }
  }
}

fn loaded<T: Clone>(value: &Option<T>, what: &str) -> CommerceResult<T> {
  value
    .clone()
    .ok_or_else(|| CommerceError::InvalidState(format!("checkout reached a step before {} was loaded", what)))
}

pub(crate) fn build_checkout_pipeline() -> Pipeline<CheckoutCtx, CommerceError> {
  let no_wallet: SkipCondition<CheckoutCtx> = Arc::new(|ctx: &ContextData<CheckoutCtx>| ctx.read().request.wallet_amount == 0);

  let mut p = Pipeline::<CheckoutCtx, CommerceError>::new(
    CHECKOUT_PIPELINE,
    &[
      ("load_customer", false, None),
      ("load_cart", false, None),
      ("verify_stock", false, None),
      ("price_order", false, None),
      ("verify_wallet", false, Some(no_wallet)),
      ("commit_order", false, None),
      ("publish_order_created", true, None),
    ],
  );

  p.before("load_customer", |ctx_data: ContextData<CheckoutCtx>| {
    Box::pin(async move {
      let req = ctx_data.read().request.clone();
      if req.shipping_fee < 0 {
        return Err(CommerceError::Validation("shipping fee cannot be negative".to_string()));
      }
      if req.wallet_amount < 0 {
        return Err(CommerceError::Validation("wallet amount cannot be negative".to_string()));
      }
      if req.shipping.recipient_name.trim().is_empty() || req.shipping.phone.trim().is_empty() || req.shipping.address.trim().is_empty() {
        return Err(CommerceError::Validation("recipient name, phone and address are required".to_string()));
      }
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.on("load_customer", |ctx_data: ContextData<CheckoutCtx>| {
    Box::pin(async move {
      let (store, user_id) = {
        let guard = ctx_data.read();
        (guard.store.clone(), guard.request.user_id)
      };
      let customer = store.customer(user_id).await?.ok_or(CommerceError::UserNotFound(user_id))?;
      debug!(%user_id, balance = customer.wallet_balance, "checkout customer loaded");
      ctx_data.write().customer = Some(customer);
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.on("load_cart", |ctx_data: ContextData<CheckoutCtx>| {
    Box::pin(async move {
      let (store, user_id) = {
        let guard = ctx_data.read();
        (guard.store.clone(), guard.request.user_id)
      };
      let mut cart = store.cart(user_id).await?;
      cart.lines = merge_lines(&cart.lines);
      if cart.is_empty() {
        return Err(CommerceError::CartEmpty);
      }
      ctx_data.write().cart = Some(cart);
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.on("verify_stock", |ctx_data: ContextData<CheckoutCtx>| {
    Box::pin(async move {
      let (store, cart) = {
        let guard = ctx_data.read();
        (guard.store.clone(), loaded(&guard.cart, "the cart")?)
      };
      let mut lines = Vec::with_capacity(cart.lines.len());
      for line in cart.lines {
        let product = store
          .product(line.product_id)
          .await?
          .ok_or(CommerceError::ProductNotFound(line.product_id))?;
        if !product.is_active {
          return Err(CommerceError::ProductUnavailable {
            product_id: product.id,
            name: product.name,
          });
        }
        if product.quantity < line.quantity {
          warn!(product_id = %product.id, available = product.quantity, requested = line.quantity, "insufficient stock at checkout");
          return Err(CommerceError::InsufficientStock {
            product_id: product.id,
            name: product.name,
            available: product.quantity,
            requested: line.quantity,
          });
        }
        lines.push(VerifiedLine { line, product });
      }
      ctx_data.write().lines = lines;
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.on("price_order", |ctx_data: ContextData<CheckoutCtx>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let ctx = &mut *guard;
      let subtotal: Money = ctx.lines.iter().map(|l| l.product.price * l.line.quantity).sum();
      let discount = ctx.cart.as_ref().map_or(0, |c| c.discount_amount).max(0).min(subtotal);
      ctx.subtotal = subtotal;
      ctx.discount_amount = discount;
      ctx.total = subtotal - discount + ctx.request.shipping_fee;
      ctx.points_earned = ctx.lines.iter().map(|l| l.product.points_per_item * l.line.quantity).sum();
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.on("verify_wallet", |ctx_data: ContextData<CheckoutCtx>| {
    Box::pin(async move {
      let guard = ctx_data.read();
      let requested = guard.request.wallet_amount;
      let balance = guard.customer.as_ref().map_or(0, |c| c.wallet_balance);
      if requested > balance {
        return Err(CommerceError::InsufficientBalance {
          available: balance,
          requested,
        });
      }
      if requested > guard.total {
        return Err(CommerceError::WalletAmountExceedsTotal {
          requested,
          total: guard.total,
        });
      }
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.on("commit_order", |ctx_data: ContextData<CheckoutCtx>| {
    Box::pin(async move {
      let ctx = ctx_data.read().clone();
      let order = commit_order(&ctx).await?;
      info!(order_id = %order.id, order_number = %order.order_number, total = order.total, "order created");
      ctx_data.write().order = Some(order);
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p.on("publish_order_created", |ctx_data: ContextData<CheckoutCtx>| {
    Box::pin(async move {
      let (sink, order) = {
        let guard = ctx_data.read();
        (guard.sink.clone(), loaded(&guard.order, "the order")?)
      };
      let message = format!("Đơn hàng {} đã được tạo", order.order_number);
      publish_quietly(sink.as_ref(), OrderEvent::for_order(&order, message)).await;
      Ok::<_, CommerceError>(PipelineControl::Continue)
    })
  });

  p
}

/// Collapses repeated products into one line and drops non-positive quantities.
fn merge_lines(lines: &[CartLine]) -> Vec<CartLine> {
  let mut merged: Vec<CartLine> = Vec::new();
  for line in lines.iter().filter(|l| l.quantity > 0) {
    match merged.iter_mut().find(|m| m.product_id == line.product_id) {
      Some(existing) => existing.quantity += line.quantity,
      None => merged.push(line.clone()),
    }
  }
  merged
}

async fn commit_order(ctx: &CheckoutCtx) -> CommerceResult<Order> {
  let customer = loaded(&ctx.customer, "the customer")?;
  let mut attempt = 1;
  loop {
    let now = Utc::now();
    let (order, changes) = plan_order(ctx, &customer, number::generate(now), now);
    match ctx.store.apply(changes).await {
      Ok(()) => return Ok(order),
      Err(StoreError::DuplicateOrderNumber(taken)) if attempt < MAX_COMMIT_ATTEMPTS => {
        warn!(order_number = %taken, attempt, "order number collision, regenerating");
        attempt += 1;
      }
      Err(StoreError::InsufficientStock {
        product_id,
        available,
        requested,
      }) => {
        let name = ctx
          .lines
          .iter()
          .find(|l| l.product.id == product_id)
          .map(|l| l.product.name.clone())
          .unwrap_or_default();
        return Err(CommerceError::InsufficientStock {
          product_id,
          name,
          available,
          requested,
        });
      }
      Err(e) => return Err(e.into()),
    }
  }
}

fn plan_order(ctx: &CheckoutCtx, customer: &Customer, order_number: String, now: DateTime<Utc>) -> (Order, ChangeSet) {
  let order_id = Uuid::new_v4();
  let items: Vec<OrderItem> = ctx
    .lines
    .iter()
    .map(|VerifiedLine { line, product }| OrderItem {
      id: Uuid::new_v4(),
      order_id,
      product_id: product.id,
      sku: product.sku.clone(),
      name: product.name.clone(),
      quantity: line.quantity,
      unit_cost_price: product.cost_price,
      unit_price: product.price,
      line_total: product.price * line.quantity,
      points_per_item: product.points_per_item,
    })
    .collect();

  let order = Order {
    id: order_id,
    order_number,
    user_id: customer.id,
    status: OrderStatus::Pending,
    payment_status: PaymentStatus::Pending,
    shipping: ctx.request.shipping.clone(),
    note: ctx.request.note.clone().filter(|n| !n.trim().is_empty()),
    subtotal: ctx.subtotal,
    discount_amount: ctx.discount_amount,
    shipping_fee: ctx.request.shipping_fee,
    total: ctx.total,
    wallet_amount_used: ctx.request.wallet_amount,
    points_earned: ctx.points_earned,
    points_awarded_at: None,
    cancellation_request: None,
    cancelled_reason: None,
    created_at: now,
    updated_at: now,
    shipped_at: None,
    delivered_at: None,
    cancelled_at: None,
    version: 0,
    items,
  };

  let mut changes = ChangeSet::new();
  changes.push(Mutation::InsertOrder(order.clone()));
  for item in &order.items {
    changes.push(Mutation::AdjustStock {
      product_id: item.product_id,
      delta: -item.quantity,
    });
  }
  if order.wallet_amount_used > 0 {
    let description = format!("Tạm giữ cho đơn hàng {}", order.order_number);
    let (_, mutations) = plan_hold(customer, order.id, order.wallet_amount_used, &description, now);
    changes.extend(mutations);
  }
  changes.push(Mutation::ClearCart { user_id: customer.id });
  (order, changes)
}
