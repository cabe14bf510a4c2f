// verdant/src/lib.rs

//! Verdant: order lifecycle, wallet ledger and payment gateway adapters for
//! the storefront.
//!
//!  - [`orders::OrderEngine`] turns carts into orders and drives the order
//!    state machine, with stock and wallet side effects per transition.
//!  - [`wallet::WalletLedger`] keeps the append-only wallet postings (hold,
//!    settle, refund, top-up) in step with the customer's balance.
//!  - [`gateway`] holds the VNPay and MoMo adapters and their registry.
//!  - [`payments::TopUpService`] starts gateway top-ups and settles their
//!    return and IPN callbacks idempotently.
//!  - [`store::LedgerStore`] is the persistence contract; every write is an
//!    atomic, guarded [`store::ChangeSet`].

pub mod error;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod orders;
pub mod payments;
pub mod pipeline;
pub mod store;
pub mod wallet;

pub use crate::error::{CommerceError, CommerceResult, ErrorKind, PipelineError, StoreError, StoreResult};
pub use crate::gateway::{CallbackResult, GatewayKind, GatewayRegistry, PaymentGateway, PaymentInitResult};
pub use crate::notify::{BroadcastSink, NotificationSink, OrderEvent, TracingSink};
pub use crate::orders::{CheckoutRequest, OrderEngine};
pub use crate::payments::{CallbackChannel, CallbackOutcome, CallbackStatus, GatewayAck, TopUpLimits, TopUpService};
pub use crate::pipeline::{ContextData, Pipeline, PipelineControl, PipelineResult};
pub use crate::store::{ChangeSet, LedgerStore, MemoryStore, Mutation};
pub use crate::wallet::{BalanceReport, TopUpConfirmation, WalletLedger};
