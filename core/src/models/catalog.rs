// verdant/src/models/catalog.rs

//! Read-side views of the catalog and customer records the ledger depends on.
//! Their CRUD lives outside this crate.

use super::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
  pub id: Uuid,
  pub email: String,
  pub full_name: String,
  /// Redundant copy of the ledger balance; kept in step by every wallet posting.
  pub wallet_balance: Money,
  pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: Uuid,
  pub sku: String,
  pub name: String,
  pub cost_price: Money,
  pub price: Money,
  /// Units on hand. Never negative.
  pub quantity: i64,
  pub is_active: bool,
  pub points_per_item: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
  pub product_id: Uuid,
  pub quantity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
  pub user_id: Uuid,
  pub lines: Vec<CartLine>,
  /// Coupon contribution already resolved by the coupon subsystem.
  pub discount_amount: Money,
}

impl Cart {
  pub fn is_empty(&self) -> bool {
    self.lines.iter().all(|l| l.quantity <= 0)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
  pub recipient_name: String,
  pub phone: String,
  pub address: String,
  pub email: Option<String>,
}
