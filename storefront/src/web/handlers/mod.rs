// verdant/storefront/src/web/handlers/mod.rs
pub mod admin_handlers;
pub mod order_handlers;
pub mod payment_handlers;
pub mod wallet_handlers;
