// verdant/src/models/mod.rs

//! Entities persisted by the ledger store.

pub mod catalog;
pub mod order;
pub mod wallet;

pub use catalog::{Cart, CartLine, Customer, Product, ShippingInfo};
pub use order::{CancellationRequest, Order, OrderItem, OrderStatus, PaymentStatus};
pub use wallet::{TransactionStatus, TransactionType, WalletTransaction};

/// Amounts are whole Vietnamese đồng.
pub type Money = i64;

/// Error returned when parsing a persisted enum label fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} label: {label}")]
pub struct UnknownLabel {
  pub kind: &'static str,
  pub label: String,
}
