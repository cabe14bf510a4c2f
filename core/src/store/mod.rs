// verdant/src/store/mod.rs

//! The persistence contract the ledger and order engine rely on.
//!
//! Reads are plain queries. Writes are expressed as a [`ChangeSet`] that the
//! store applies atomically: either every mutation lands or none does. Each
//! mutation carries the guard it needs (expected order version, expected
//! wallet balance, expected transaction status, non-negative stock) so that
//! check-then-act sequences cannot lose updates under concurrency. A failed
//! guard surfaces as [`StoreError::Conflict`] and callers re-read and retry.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::{CommerceError, CommerceResult, StoreError, StoreResult};
use crate::models::{Cart, Customer, Money, Order, Product, TransactionStatus, WalletTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::debug;
use uuid::Uuid;

/// How many times a read-plan-apply cycle is attempted before a conflict is surfaced.
pub const MAX_COMMIT_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub enum Mutation {
  /// Fails with `DuplicateOrderNumber` when the number is taken.
  InsertOrder(Order),
  /// Replaces the order header. Items are immutable and ignored.
  /// Fails with `Conflict` unless the stored version equals `expected_version`;
  /// the stored version becomes `expected_version + 1`.
  UpdateOrder { order: Order, expected_version: u64 },
  /// Fails with `InsufficientStock` if the result would be negative.
  AdjustStock { product_id: Uuid, delta: i64 },
  ClearCart { user_id: Uuid },
  /// Fails with `DuplicateGatewayTransaction` when the gateway id is already recorded.
  InsertWalletTransaction(WalletTransaction),
  /// Moves a row out of `expected` status. Fails with `Conflict` otherwise.
  SettleWalletTransaction {
    id: Uuid,
    expected: TransactionStatus,
    status: TransactionStatus,
    balance_before: Money,
    balance_after: Money,
    at: DateTime<Utc>,
  },
  /// Compare-and-set on the customer's wallet balance.
  SetWalletBalance { user_id: Uuid, expected: Money, balance: Money },
  AwardPoints { user_id: Uuid, points: i64 },
}

impl Mutation {
  pub fn label(&self) -> &'static str {
    match self {
      Self::InsertOrder(_) => "insert_order",
      Self::UpdateOrder { .. } => "update_order",
      Self::AdjustStock { .. } => "adjust_stock",
      Self::ClearCart { .. } => "clear_cart",
      Self::InsertWalletTransaction(_) => "insert_wallet_transaction",
      Self::SettleWalletTransaction { .. } => "settle_wallet_transaction",
      Self::SetWalletBalance { .. } => "set_wallet_balance",
      Self::AwardPoints { .. } => "award_points",
    }
  }
}

/// An ordered batch of mutations applied as one unit.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
  mutations: Vec<Mutation>,
}

impl ChangeSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, mutation: Mutation) -> &mut Self {
    self.mutations.push(mutation);
    self
  }

  pub fn extend(&mut self, mutations: impl IntoIterator<Item = Mutation>) -> &mut Self {
    self.mutations.extend(mutations);
    self
  }

  pub fn into_mutations(self) -> Vec<Mutation> {
    self.mutations
  }

  /// Comma separated mutation labels, for logs.
  pub fn summary(&self) -> String {
    self.mutations.iter().map(Mutation::label).collect::<Vec<_>>().join(",")
  }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
  async fn customer(&self, user_id: Uuid) -> StoreResult<Option<Customer>>;

  /// The user's cart; an empty cart when none exists.
  async fn cart(&self, user_id: Uuid) -> StoreResult<Cart>;

  async fn product(&self, product_id: Uuid) -> StoreResult<Option<Product>>;

  /// Loads the order together with its items.
  async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>>;

  async fn order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>>;

  /// Newest first.
  async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;

  /// Orders that carry an open cancellation request, oldest request first.
  async fn orders_awaiting_cancellation(&self) -> StoreResult<Vec<Order>>;

  /// Oldest first.
  async fn wallet_transactions(&self, user_id: Uuid) -> StoreResult<Vec<WalletTransaction>>;

  async fn wallet_transactions_for_order(&self, order_id: Uuid) -> StoreResult<Vec<WalletTransaction>>;

  async fn wallet_transaction_by_gateway_id(&self, gateway_transaction_id: &str)
    -> StoreResult<Option<WalletTransaction>>;

  /// Applies every mutation or none.
  async fn apply(&self, changes: ChangeSet) -> StoreResult<()>;
}

/// Re-runs `attempt_fn` while it fails with [`StoreError::Conflict`], up to
/// [`MAX_COMMIT_ATTEMPTS`] times. Each attempt must re-read what it plans on.
pub(crate) async fn retry_on_conflict<T, F, Fut>(operation: &'static str, mut attempt_fn: F) -> CommerceResult<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = CommerceResult<T>>,
{
  let mut attempt = 1;
  loop {
    match attempt_fn().await {
      Err(CommerceError::Store(StoreError::Conflict(reason))) if attempt < MAX_COMMIT_ATTEMPTS => {
        debug!(operation, attempt, %reason, "optimistic guard failed, retrying");
        attempt += 1;
      }
      result => return result,
    }
  }
}
