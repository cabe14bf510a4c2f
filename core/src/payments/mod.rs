// verdant/src/payments/mod.rs

//! Wallet top-ups through the external gateways.

pub mod callback;
pub mod topup;

pub use callback::{CallbackChannel, CallbackOutcome, CallbackStatus, GatewayAck};
pub use topup::{TopUpLimits, TopUpService};
