//! Message-driven checkout saga.
//!
//! A checkout spans three domains that never call each other directly:
//! the ledger debits the customer's account, the payment service charges the
//! debit, and the order service commits the result. The [`Orchestrator`]
//! consumes every saga event from one topic and issues the next command on
//! the command's own topic; step invokers perform the side effect and report
//! back with an event.
//!
//! The happy path is:
//! 1. `NewOrder` → debit the account
//! 2. `NewOrderTransaction` → charge the payment
//! 3. `OrderSuccessPayment` → commit the order (retried, the pivot step)
//!
//! Failures before the pivot are compensated by undoing what was done, in
//! reverse order. See [`compensation`].

pub mod activity;
pub mod checkout;
pub mod commands;
pub mod compensation;
pub mod envelope;
pub mod error;
pub mod orchestrator;
pub mod postgres;
pub mod progress;
pub mod publish;
pub mod retry;
pub mod runtime;
pub mod scope;
pub mod state;
pub mod steps;
pub mod topics;

pub use activity::{ActivityEntry, ActivitySink, InMemoryActivityLog};
pub use checkout::submit_order;
pub use commands::{CommandEnvelope, CommandKind, SagaCommand};
pub use compensation::FailureOrigin;
pub use envelope::{SagaEnvelope, SagaEvent};
pub use error::{Result, SagaError};
pub use orchestrator::{Orchestrator, OrchestratorHandler};
pub use postgres::PostgresProgressStore;
pub use progress::{InMemoryProgressStore, SagaProgressStore, SagaProgressStoreExt};
pub use retry::{RetryOutcome, RetryPolicy};
pub use runtime::{SagaRuntime, SagaSettings};
pub use scope::{SagaScope, SagaScopeFactory, SagaServices};
pub use state::{SagaProgress, SagaStep, StepRecord};
