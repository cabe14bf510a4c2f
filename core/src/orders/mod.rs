// verdant/src/orders/mod.rs

//! Order lifecycle: checkout, the status state machine and the
//! customer-request / admin-decision cancellation workflow.

pub mod checkout;
pub mod engine;
pub mod number;

pub use checkout::{CheckoutCtx, CheckoutRequest};
pub use engine::OrderEngine;
