// verdant/src/wallet/mod.rs

//! The per-user wallet ledger.

pub mod ledger;

pub use ledger::{BalanceReport, TopUpConfirmation, WalletLedger};
