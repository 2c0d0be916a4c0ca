//! Domain layer for the checkout saga.
//!
//! Three independently owned domains, each behind an async service trait
//! with an in-memory implementation:
//! - [`ledger`]: accounts and debit/reversal transactions
//! - [`payment`]: charges and the simulated external gateway
//! - [`order`]: the checkout record and its terminal status
//!
//! None of them know about each other; the saga crate stitches them together.

pub mod error;
pub mod ledger;
pub mod order;
pub mod payment;

pub use error::{DomainError, Result};
pub use ledger::{
    Account, DEFAULT_ACCOUNT, DEFAULT_BALANCE, InMemoryLedger, LedgerError, LedgerReceipt,
    LedgerService, Transaction,
};
pub use order::{InMemoryOrders, Order, OrderError, OrderService, OrderStatus};
pub use payment::{InMemoryPayments, Payment, PaymentError, PaymentService, PaymentStatus};
