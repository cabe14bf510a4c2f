// verdant/src/wallet/ledger.rs

//! Append-only wallet postings.
//!
//! Every posting that moves money writes its ledger row and the customer's
//! redundant `wallet_balance` in one change set, the latter as a
//! compare-and-set against the balance the posting was planned on. The
//! `plan_*` functions only build mutations so the order engine can fold them
//! into a larger atomic unit (for example an order update plus stock restore).

use crate::error::{CommerceError, CommerceResult, StoreError};
use crate::gateway::GatewayKind;
use crate::models::{Customer, Money, TransactionStatus, TransactionType, WalletTransaction};
use crate::store::{retry_on_conflict, ChangeSet, LedgerStore, Mutation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of confirming a gateway top-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopUpConfirmation {
  Confirmed(WalletTransaction),
  /// The row was already SUCCESS; nothing was credited.
  AlreadyConfirmed(WalletTransaction),
}

impl TopUpConfirmation {
  pub fn transaction(&self) -> &WalletTransaction {
    match self {
      Self::Confirmed(tx) | Self::AlreadyConfirmed(tx) => tx,
    }
  }
}

/// Recorded balance compared with the sum of settled ledger rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReport {
  pub user_id: Uuid,
  pub recorded_balance: Money,
  pub ledger_balance: Money,
}

impl BalanceReport {
  pub fn is_consistent(&self) -> bool {
    self.recorded_balance == self.ledger_balance
  }

  pub fn drift(&self) -> Money {
    self.recorded_balance - self.ledger_balance
  }
}

pub struct WalletLedger {
  store: Arc<dyn LedgerStore>,
}

impl WalletLedger {
  pub fn new(store: Arc<dyn LedgerStore>) -> Self {
    Self { store }
  }

  async fn customer(&self, user_id: Uuid) -> CommerceResult<Customer> {
    self
      .store
      .customer(user_id)
      .await?
      .ok_or(CommerceError::UserNotFound(user_id))
  }

  pub async fn balance(&self, user_id: Uuid) -> CommerceResult<Money> {
    Ok(self.customer(user_id).await?.wallet_balance)
  }

  /// Newest first.
  pub async fn history(&self, user_id: Uuid) -> CommerceResult<Vec<WalletTransaction>> {
    self.customer(user_id).await?;
    let mut rows = self.store.wallet_transactions(user_id).await?;
    rows.reverse();
    Ok(rows)
  }

  #[instrument(skip(self))]
  pub async fn verify_balance(&self, user_id: Uuid) -> CommerceResult<BalanceReport> {
    let customer = self.customer(user_id).await?;
    let ledger_balance = self
      .store
      .wallet_transactions(user_id)
      .await?
      .iter()
      .map(WalletTransaction::settled_effect)
      .sum();
    let report = BalanceReport {
      user_id,
      recorded_balance: customer.wallet_balance,
      ledger_balance,
    };
    if !report.is_consistent() {
      warn!(drift = report.drift(), "wallet balance disagrees with ledger");
    }
    Ok(report)
  }

  /// Reserves `amount` for an order without moving the balance.
  #[instrument(skip(self, description), err(Display))]
  pub async fn create_hold(
    &self,
    user_id: Uuid,
    order_id: Uuid,
    amount: Money,
    description: &str,
  ) -> CommerceResult<WalletTransaction> {
    ensure_positive(amount)?;
    retry_on_conflict("create_hold", move || async move {
      let customer = self.customer(user_id).await?;
      if customer.wallet_balance < amount {
        return Err(CommerceError::InsufficientBalance {
          available: customer.wallet_balance,
          requested: amount,
        });
      }
      let (hold, mutations) = plan_hold(&customer, order_id, amount, description, Utc::now());
      let mut changes = ChangeSet::new();
      changes.extend(mutations);
      self.store.apply(changes).await?;
      Ok(hold)
    })
    .await
  }

  /// Settles the order's PENDING hold. `Ok(None)` when no pending hold exists.
  #[instrument(skip(self), err(Display))]
  pub async fn confirm_hold(
    &self,
    order_id: Uuid,
    final_status: TransactionStatus,
  ) -> CommerceResult<Option<WalletTransaction>> {
    retry_on_conflict("confirm_hold", move || async move {
      let Some(hold) = pending_hold(self.store.as_ref(), order_id).await? else {
        return Ok(None);
      };
      let customer = self.customer(hold.user_id).await?;
      let (settled, mutations) = plan_confirm_hold(&hold, final_status, customer.wallet_balance, Utc::now())?;
      let mut changes = ChangeSet::new();
      changes.extend(mutations);
      self.store.apply(changes).await?;
      info!(hold_id = %settled.id, status = settled.status.as_str(), "hold settled");
      Ok(Some(settled))
    })
    .await
  }

  #[instrument(skip(self, description), err(Display))]
  pub async fn create_refund(
    &self,
    user_id: Uuid,
    order_id: Uuid,
    amount: Money,
    description: &str,
  ) -> CommerceResult<WalletTransaction> {
    ensure_positive(amount)?;
    retry_on_conflict("create_refund", move || async move {
      let customer = self.customer(user_id).await?;
      let (refund, mutations) = plan_refund(&customer, order_id, amount, description, Utc::now());
      let mut changes = ChangeSet::new();
      changes.extend(mutations);
      self.store.apply(changes).await?;
      Ok(refund)
    })
    .await
  }

  /// Records a PENDING TOPUP keyed by the gateway's transaction id.
  #[instrument(skip(self, description), err(Display))]
  pub async fn record_pending_top_up(
    &self,
    user_id: Uuid,
    amount: Money,
    gateway: GatewayKind,
    gateway_transaction_id: &str,
    description: &str,
  ) -> CommerceResult<WalletTransaction> {
    ensure_positive(amount)?;
    let customer = self.customer(user_id).await?;
    let now = Utc::now();
    let row = WalletTransaction {
      id: Uuid::new_v4(),
      user_id,
      order_id: None,
      transaction_type: TransactionType::TopUp,
      status: TransactionStatus::Pending,
      amount,
      balance_before: customer.wallet_balance,
      balance_after: customer.wallet_balance,
      description: description.to_string(),
      gateway: Some(gateway),
      gateway_transaction_id: Some(gateway_transaction_id.to_string()),
      created_at: now,
      updated_at: now,
    };
    let mut changes = ChangeSet::new();
    changes.push(Mutation::InsertWalletTransaction(row.clone()));
    self.store.apply(changes).await?;
    Ok(row)
  }

  /// Credits a PENDING gateway top-up. A second call for the same id is a no-op.
  #[instrument(skip(self), err(Display))]
  pub async fn confirm_top_up_by_gateway_id(
    &self,
    gateway_transaction_id: &str,
    amount: Money,
  ) -> CommerceResult<TopUpConfirmation> {
    retry_on_conflict("confirm_top_up", move || async move {
      let row = self.top_up_row(gateway_transaction_id).await?;
      match row.status {
        TransactionStatus::Success => {
          info!(transaction_id = %row.id, "top-up already confirmed");
          return Ok(TopUpConfirmation::AlreadyConfirmed(row));
        }
        TransactionStatus::Failed => {
          return Err(CommerceError::InvalidState(format!(
            "top-up {} has already failed",
            gateway_transaction_id
          )));
        }
        TransactionStatus::Pending => {}
      }
      if row.amount != amount {
        return Err(CommerceError::Validation(format!(
          "top-up {} amount mismatch: recorded {}, reported {}",
          gateway_transaction_id, row.amount, amount
        )));
      }

      let customer = self.customer(row.user_id).await?;
      let now = Utc::now();
      let balance_after = customer.wallet_balance + row.amount;
      let mut changes = ChangeSet::new();
      changes
        .push(Mutation::SettleWalletTransaction {
          id: row.id,
          expected: TransactionStatus::Pending,
          status: TransactionStatus::Success,
          balance_before: customer.wallet_balance,
          balance_after,
          at: now,
        })
        .push(Mutation::SetWalletBalance {
          user_id: row.user_id,
          expected: customer.wallet_balance,
          balance: balance_after,
        });
      self.store.apply(changes).await?;
      info!(transaction_id = %row.id, user_id = %row.user_id, amount = row.amount, "top-up credited");

      Ok(TopUpConfirmation::Confirmed(WalletTransaction {
        status: TransactionStatus::Success,
        balance_before: customer.wallet_balance,
        balance_after,
        updated_at: now,
        ..row
      }))
    })
    .await
  }

  /// Marks a PENDING top-up FAILED. Settled rows are returned untouched.
  #[instrument(skip(self), err(Display))]
  pub async fn fail_top_up(&self, gateway_transaction_id: &str) -> CommerceResult<WalletTransaction> {
    retry_on_conflict("fail_top_up", move || async move {
      let row = self.top_up_row(gateway_transaction_id).await?;
      if row.status != TransactionStatus::Pending {
        return Ok(row);
      }
      let now = Utc::now();
      let mut changes = ChangeSet::new();
      changes.push(Mutation::SettleWalletTransaction {
        id: row.id,
        expected: TransactionStatus::Pending,
        status: TransactionStatus::Failed,
        balance_before: row.balance_before,
        balance_after: row.balance_before,
        at: now,
      });
      self.store.apply(changes).await?;
      Ok(WalletTransaction {
        status: TransactionStatus::Failed,
        balance_after: row.balance_before,
        updated_at: now,
        ..row
      })
    })
    .await
  }

  pub async fn top_up_by_gateway_id(&self, gateway_transaction_id: &str) -> CommerceResult<Option<WalletTransaction>> {
    Ok(
      self
        .store
        .wallet_transaction_by_gateway_id(gateway_transaction_id)
        .await?
        .filter(|row| row.transaction_type == TransactionType::TopUp),
    )
  }

  async fn top_up_row(&self, gateway_transaction_id: &str) -> CommerceResult<WalletTransaction> {
    self
      .top_up_by_gateway_id(gateway_transaction_id)
      .await?
      .ok_or_else(|| CommerceError::TransactionNotFound(gateway_transaction_id.to_string()))
  }
}

fn ensure_positive(amount: Money) -> CommerceResult<()> {
  if amount <= 0 {
    return Err(CommerceError::Validation(format!("wallet amount must be positive, got {}", amount)));
  }
  Ok(())
}

/// The order's HOLD row while it is still PENDING.
pub(crate) async fn pending_hold(store: &dyn LedgerStore, order_id: Uuid) -> Result<Option<WalletTransaction>, StoreError> {
  Ok(
    store
      .wallet_transactions_for_order(order_id)
      .await?
      .into_iter()
      .find(|t| t.transaction_type == TransactionType::Hold && t.status == TransactionStatus::Pending),
  )
}

/// Whether the order's hold has already been settled as a debit.
pub(crate) async fn hold_debited(store: &dyn LedgerStore, order_id: Uuid) -> Result<bool, StoreError> {
  Ok(
    store
      .wallet_transactions_for_order(order_id)
      .await?
      .iter()
      .any(|t| t.transaction_type == TransactionType::Hold && t.status == TransactionStatus::Success),
  )
}

/// A PENDING hold with `balance_before == balance_after == balance`, plus a
/// no-op compare-and-set that pins the balance the hold was checked against.
pub(crate) fn plan_hold(
  customer: &Customer,
  order_id: Uuid,
  amount: Money,
  description: &str,
  now: DateTime<Utc>,
) -> (WalletTransaction, Vec<Mutation>) {
  let hold = WalletTransaction {
    id: Uuid::new_v4(),
    user_id: customer.id,
    order_id: Some(order_id),
    transaction_type: TransactionType::Hold,
    status: TransactionStatus::Pending,
    amount,
    balance_before: customer.wallet_balance,
    balance_after: customer.wallet_balance,
    description: description.to_string(),
    gateway: None,
    gateway_transaction_id: None,
    created_at: now,
    updated_at: now,
  };
  let mutations = vec![
    Mutation::SetWalletBalance {
      user_id: customer.id,
      expected: customer.wallet_balance,
      balance: customer.wallet_balance,
    },
    Mutation::InsertWalletTransaction(hold.clone()),
  ];
  (hold, mutations)
}

/// SUCCESS debits the balance now; FAILED releases the reservation with no balance change.
pub(crate) fn plan_confirm_hold(
  hold: &WalletTransaction,
  final_status: TransactionStatus,
  current_balance: Money,
  now: DateTime<Utc>,
) -> CommerceResult<(WalletTransaction, Vec<Mutation>)> {
  let balance_after = match final_status {
    TransactionStatus::Success => {
      if current_balance < hold.amount {
        return Err(CommerceError::InsufficientBalance {
          available: current_balance,
          requested: hold.amount,
        });
      }
      current_balance - hold.amount
    }
    TransactionStatus::Failed => current_balance,
    TransactionStatus::Pending => {
      return Err(CommerceError::InvalidState("a hold can only settle to SUCCESS or FAILED".to_string()));
    }
  };

  let mut mutations = vec![Mutation::SettleWalletTransaction {
    id: hold.id,
    expected: TransactionStatus::Pending,
    status: final_status,
    balance_before: current_balance,
    balance_after,
    at: now,
  }];
  if balance_after != current_balance {
    mutations.push(Mutation::SetWalletBalance {
      user_id: hold.user_id,
      expected: current_balance,
      balance: balance_after,
    });
  }

  let settled = WalletTransaction {
    status: final_status,
    balance_before: current_balance,
    balance_after,
    updated_at: now,
    ..hold.clone()
  };
  Ok((settled, mutations))
}

pub(crate) fn plan_refund(
  customer: &Customer,
  order_id: Uuid,
  amount: Money,
  description: &str,
  now: DateTime<Utc>,
) -> (WalletTransaction, Vec<Mutation>) {
  let balance_after = customer.wallet_balance + amount;
  let refund = WalletTransaction {
    id: Uuid::new_v4(),
    user_id: customer.id,
    order_id: Some(order_id),
    transaction_type: TransactionType::Refund,
    status: TransactionStatus::Success,
    amount,
    balance_before: customer.wallet_balance,
    balance_after,
    description: description.to_string(),
    gateway: None,
    gateway_transaction_id: None,
    created_at: now,
    updated_at: now,
  };
  let mutations = vec![
    Mutation::InsertWalletTransaction(refund.clone()),
    Mutation::SetWalletBalance {
      user_id: customer.id,
      expected: customer.wallet_balance,
      balance: balance_after,
    },
  ];
  (refund, mutations)
}
