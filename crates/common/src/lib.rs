//! Shared types for the checkout saga workspace.

pub mod toggles;
pub mod types;

pub use toggles::FaultToggles;
pub use types::{OrderId, PaymentId, TransactionId};
