// verdant/storefront/src/db/rows.rs

//! Row shapes as stored in PostgreSQL and their conversion into ledger models.
//! Enum columns are TEXT holding the models' canonical labels.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;
use verdant_core::models::{
  CancellationRequest, Customer, Order, OrderItem, Product, ShippingInfo, UnknownLabel, WalletTransaction,
};
use verdant_core::StoreError;

fn label<T: FromStr<Err = UnknownLabel>>(raw: &str) -> Result<T, StoreError> {
  raw.parse::<T>().map_err(|e| StoreError::Backend(e.into()))
}

#[derive(Debug, FromRow)]
pub struct CustomerRow {
  pub id: Uuid,
  pub email: String,
  pub full_name: String,
  pub wallet_balance: i64,
  pub points: i64,
}

impl From<CustomerRow> for Customer {
  fn from(row: CustomerRow) -> Self {
    Customer {
      id: row.id,
      email: row.email,
      full_name: row.full_name,
      wallet_balance: row.wallet_balance,
      points: row.points,
    }
  }
}

#[derive(Debug, FromRow)]
pub struct ProductRow {
  pub id: Uuid,
  pub sku: String,
  pub name: String,
  pub cost_price: i64,
  pub price: i64,
  pub quantity: i64,
  pub is_active: bool,
  pub points_per_item: i64,
}

impl From<ProductRow> for Product {
  fn from(row: ProductRow) -> Self {
    Product {
      id: row.id,
      sku: row.sku,
      name: row.name,
      cost_price: row.cost_price,
      price: row.price,
      quantity: row.quantity,
      is_active: row.is_active,
      points_per_item: row.points_per_item,
    }
  }
}

#[derive(Debug, FromRow)]
pub struct OrderRow {
  pub id: Uuid,
  pub order_number: String,
  pub user_id: Uuid,
  pub status: String,
  pub payment_status: String,
  pub recipient_name: String,
  pub phone: String,
  pub address: String,
  pub email: Option<String>,
  pub note: Option<String>,
  pub subtotal: i64,
  pub discount_amount: i64,
  pub shipping_fee: i64,
  pub total: i64,
  pub wallet_amount_used: i64,
  pub points_earned: i64,
  pub points_awarded_at: Option<DateTime<Utc>>,
  pub cancellation_reason: Option<String>,
  pub cancellation_requested_at: Option<DateTime<Utc>>,
  pub cancelled_reason: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub shipped_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub cancelled_at: Option<DateTime<Utc>>,
  pub version: i64,
}

impl OrderRow {
  pub fn into_order(self, items: Vec<OrderItem>) -> Result<Order, StoreError> {
    let cancellation_request = match (self.cancellation_reason, self.cancellation_requested_at) {
      (Some(reason), Some(requested_at)) => Some(CancellationRequest { reason, requested_at }),
      _ => None,
    };
    let version = u64::try_from(self.version)
      .map_err(|_| StoreError::Backend(anyhow::anyhow!("order {} has negative version {}", self.id, self.version)))?;

    Ok(Order {
      id: self.id,
      order_number: self.order_number,
      user_id: self.user_id,
      status: label(&self.status)?,
      payment_status: label(&self.payment_status)?,
      shipping: ShippingInfo {
        recipient_name: self.recipient_name,
        phone: self.phone,
        address: self.address,
        email: self.email,
      },
      note: self.note,
      subtotal: self.subtotal,
      discount_amount: self.discount_amount,
      shipping_fee: self.shipping_fee,
      total: self.total,
      wallet_amount_used: self.wallet_amount_used,
      points_earned: self.points_earned,
      points_awarded_at: self.points_awarded_at,
      cancellation_request,
      cancelled_reason: self.cancelled_reason,
      created_at: self.created_at,
      updated_at: self.updated_at,
      shipped_at: self.shipped_at,
      delivered_at: self.delivered_at,
      cancelled_at: self.cancelled_at,
      version,
      items,
    })
  }
}

#[derive(Debug, FromRow)]
pub struct OrderItemRow {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub sku: String,
  pub name: String,
  pub quantity: i64,
  pub unit_cost_price: i64,
  pub unit_price: i64,
  pub line_total: i64,
  pub points_per_item: i64,
}

impl From<OrderItemRow> for OrderItem {
  fn from(row: OrderItemRow) -> Self {
    OrderItem {
      id: row.id,
      order_id: row.order_id,
      product_id: row.product_id,
      sku: row.sku,
      name: row.name,
      quantity: row.quantity,
      unit_cost_price: row.unit_cost_price,
      unit_price: row.unit_price,
      line_total: row.line_total,
      points_per_item: row.points_per_item,
    }
  }
}

#[derive(Debug, FromRow)]
pub struct WalletTransactionRow {
  pub id: Uuid,
  pub user_id: Uuid,
  pub order_id: Option<Uuid>,
  pub transaction_type: String,
  pub status: String,
  pub amount: i64,
  pub balance_before: i64,
  pub balance_after: i64,
  pub description: String,
  pub gateway: Option<String>,
  pub gateway_transaction_id: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl TryFrom<WalletTransactionRow> for WalletTransaction {
  type Error = StoreError;

  fn try_from(row: WalletTransactionRow) -> Result<Self, Self::Error> {
    Ok(WalletTransaction {
      id: row.id,
      user_id: row.user_id,
      order_id: row.order_id,
      transaction_type: label(&row.transaction_type)?,
      status: label(&row.status)?,
      amount: row.amount,
      balance_before: row.balance_before,
      balance_after: row.balance_after,
      description: row.description,
      gateway: row.gateway.as_deref().map(label).transpose()?,
      gateway_transaction_id: row.gateway_transaction_id,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}
