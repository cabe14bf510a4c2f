// verdant/src/models/wallet.rs
use super::{Money, UnknownLabel};
use crate::gateway::GatewayKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
  TopUp,
  Hold,
  Payment,
  Refund,
}

impl TransactionType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::TopUp => "TOPUP",
      Self::Hold => "HOLD",
      Self::Payment => "PAYMENT",
      Self::Refund => "REFUND",
    }
  }

  /// +1 for rows that credit the wallet once SUCCESS, -1 for rows that debit it.
  pub fn direction(self) -> i64 {
    match self {
      Self::TopUp | Self::Refund => 1,
      Self::Hold | Self::Payment => -1,
    }
  }
}

impl FromStr for TransactionType {
  type Err = UnknownLabel;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "TOPUP" => Ok(Self::TopUp),
      "HOLD" => Ok(Self::Hold),
      "PAYMENT" => Ok(Self::Payment),
      "REFUND" => Ok(Self::Refund),
      _ => Err(UnknownLabel {
        kind: "transaction type",
        label: s.to_string(),
      }),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
  Pending,
  Success,
  Failed,
}

impl TransactionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Success => "SUCCESS",
      Self::Failed => "FAILED",
    }
  }
}

impl FromStr for TransactionStatus {
  type Err = UnknownLabel;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "PENDING" => Ok(Self::Pending),
      "SUCCESS" => Ok(Self::Success),
      "FAILED" => Ok(Self::Failed),
      _ => Err(UnknownLabel {
        kind: "transaction status",
        label: s.to_string(),
      }),
    }
  }
}

/// One ledger row. Rows are never edited except for the PENDING → SUCCESS/FAILED
/// settlement of a HOLD or gateway TOPUP, which also records the balance snapshot
/// taken at settlement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
  pub id: Uuid,
  pub user_id: Uuid,
  pub order_id: Option<Uuid>,
  pub transaction_type: TransactionType,
  pub status: TransactionStatus,
  pub amount: Money,
  pub balance_before: Money,
  pub balance_after: Money,
  pub description: String,
  pub gateway: Option<GatewayKind>,
  pub gateway_transaction_id: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl WalletTransaction {
  /// Signed effect on the balance once this row is SUCCESS; zero otherwise.
  pub fn settled_effect(&self) -> Money {
    match self.status {
      TransactionStatus::Success => self.transaction_type.direction() * self.amount,
      _ => 0,
    }
  }
}
