// verdant/src/models/order.rs
use super::{Money, UnknownLabel, ShippingInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
  Pending,
  Confirmed,
  Processing,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 6] = [
    Self::Pending,
    Self::Confirmed,
    Self::Processing,
    Self::Shipped,
    Self::Delivered,
    Self::Cancelled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Confirmed => "CONFIRMED",
      Self::Processing => "PROCESSING",
      Self::Shipped => "SHIPPED",
      Self::Delivered => "DELIVERED",
      Self::Cancelled => "CANCELLED",
    }
  }

  /// Position on the fulfilment path. CANCELLED sits off the path.
  fn rank(self) -> Option<u8> {
    match self {
      Self::Pending => Some(0),
      Self::Confirmed => Some(1),
      Self::Processing => Some(2),
      Self::Shipped => Some(3),
      Self::Delivered => Some(4),
      Self::Cancelled => None,
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Delivered | Self::Cancelled)
  }

  /// Whether an admin may move an order from `self` to `next`.
  ///
  /// Forward moves along the fulfilment path are allowed, skipping included.
  /// CANCELLED is reachable from every state except itself; leaving DELIVERED
  /// that way is the refund path. Re-entering the current state is handled by
  /// the engine as a no-op before this check.
  pub fn can_transition_to(self, next: OrderStatus) -> bool {
    match (self, next) {
      (Self::Cancelled, _) => false,
      (_, Self::Cancelled) => true,
      (from, to) => match (from.rank(), to.rank()) {
        (Some(a), Some(b)) => b > a,
        _ => false,
      },
    }
  }

  /// Customers may ask for cancellation only before fulfilment starts.
  pub fn accepts_cancellation_request(self) -> bool {
    matches!(self, Self::Pending | Self::Confirmed)
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = UnknownLabel;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| UnknownLabel {
        kind: "order status",
        label: s.to_string(),
      })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
  Pending,
  Success,
  Failed,
}

impl PaymentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Success => "SUCCESS",
      Self::Failed => "FAILED",
    }
  }
}

impl FromStr for PaymentStatus {
  type Err = UnknownLabel;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "PENDING" => Ok(Self::Pending),
      "SUCCESS" => Ok(Self::Success),
      "FAILED" => Ok(Self::Failed),
      _ => Err(UnknownLabel {
        kind: "payment status",
        label: s.to_string(),
      }),
    }
  }
}

/// A customer's open request to cancel, awaiting an admin decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationRequest {
  pub reason: String,
  pub requested_at: DateTime<Utc>,
}

/// Snapshot of a cart line at checkout. Never recomputed from live product data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub sku: String,
  pub name: String,
  pub quantity: i64,
  pub unit_cost_price: Money,
  pub unit_price: Money,
  pub line_total: Money,
  pub points_per_item: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub order_number: String,
  pub user_id: Uuid,
  pub status: OrderStatus,
  pub payment_status: PaymentStatus,
  pub shipping: ShippingInfo,
  pub note: Option<String>,

  pub subtotal: Money,
  pub discount_amount: Money,
  pub shipping_fee: Money,
  pub total: Money,
  pub wallet_amount_used: Money,

  pub points_earned: i64,
  pub points_awarded_at: Option<DateTime<Utc>>,

  pub cancellation_request: Option<CancellationRequest>,
  /// Set (possibly to "") only once the order is CANCELLED.
  pub cancelled_reason: Option<String>,

  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub shipped_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub cancelled_at: Option<DateTime<Utc>>,

  /// Optimistic concurrency token, bumped by the store on every update.
  pub version: u64,
  pub items: Vec<OrderItem>,
}

impl Order {
  pub fn has_pending_cancellation(&self) -> bool {
    self.cancellation_request.is_some()
  }

  pub fn items_total(&self) -> Money {
    self.items.iter().map(|i| i.line_total).sum()
  }

  /// Wallet money returned when a settled order is cancelled. Shipping is not refunded.
  pub fn refundable_wallet_amount(&self) -> Money {
    self.wallet_amount_used.min(self.subtotal).max(0)
  }
}
