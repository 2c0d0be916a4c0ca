//! Saga progress state machine.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::compensation::FailureOrigin;

/// Where a checkout saga currently stands.
///
/// State transitions:
/// ```text
/// Started ─► AwaitingDebit ─► AwaitingCharge ─► AwaitingCompletion ─► Completed
///                 │                │                  │
///                 └────────────────┴──────────────────┴─► Compensating ─► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "step")]
pub enum SagaStep {
    /// Order created, NewOrder published.
    #[default]
    Started,

    /// Debit requested from the ledger.
    AwaitingDebit,

    /// Charge requested from payment.
    AwaitingCharge,

    /// Completion commit requested from the order domain.
    AwaitingCompletion,

    /// A compensation chain was issued.
    Compensating { origin: FailureOrigin },

    /// The order committed (terminal state).
    Completed,

    /// The order was resolved as failed (terminal state).
    Failed,
}

impl SagaStep {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStep::Completed | SagaStep::Failed)
    }

    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::Started => "Started",
            SagaStep::AwaitingDebit => "AwaitingDebit",
            SagaStep::AwaitingCharge => "AwaitingCharge",
            SagaStep::AwaitingCompletion => "AwaitingCompletion",
            SagaStep::Compensating { .. } => "Compensating",
            SagaStep::Completed => "Completed",
            SagaStep::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaStep::Compensating { origin } => write!(f, "Compensating({origin})"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// One entry in a saga's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Event kind or command kind that caused the transition.
    pub trigger: String,
    pub step: SagaStep,
    pub recorded_at: DateTime<Utc>,
}

/// Durable progress of one checkout saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaProgress {
    pub order_id: OrderId,
    pub current_step: SagaStep,
    /// Completion commit attempts made so far.
    pub attempts: u32,
    pub history: Vec<StepRecord>,
    pub updated_at: DateTime<Utc>,
}

impl SagaProgress {
    /// Creates progress for a saga that just started.
    pub fn new(order_id: OrderId) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            current_step: SagaStep::Started,
            attempts: 0,
            history: vec![StepRecord {
                trigger: "Submitted".to_string(),
                step: SagaStep::Started,
                recorded_at: now,
            }],
            updated_at: now,
        }
    }

    /// Records a transition caused by `trigger`.
    ///
    /// The transition is always appended to the history, but a terminal
    /// step is never replaced: steps of one saga run on independent
    /// consumers and may be recorded out of order.
    pub fn advance(&mut self, trigger: &str, step: SagaStep) {
        let now = Utc::now();
        self.history.push(StepRecord {
            trigger: trigger.to_string(),
            step,
            recorded_at: now,
        });
        if !self.current_step.is_terminal() {
            self.current_step = step;
        }
        self.updated_at = now;
    }

    /// Records the number of completion attempts made.
    pub fn record_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
        self.updated_at = Utc::now();
    }

    /// Returns true if a transition for `trigger` was already recorded.
    pub fn has_processed(&self, trigger: &str) -> bool {
        self.history.iter().any(|record| record.trigger == trigger)
    }

    /// Returns true if the saga reached a terminal step.
    pub fn is_finished(&self) -> bool {
        self.current_step.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_step_is_started() {
        assert_eq!(SagaStep::default(), SagaStep::Started);
    }

    #[test]
    fn test_terminal_steps() {
        assert!(!SagaStep::Started.is_terminal());
        assert!(!SagaStep::AwaitingCompletion.is_terminal());
        assert!(
            !SagaStep::Compensating {
                origin: FailureOrigin::PaymentCharge
            }
            .is_terminal()
        );
        assert!(SagaStep::Completed.is_terminal());
        assert!(SagaStep::Failed.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaStep::AwaitingDebit.to_string(), "AwaitingDebit");
        assert_eq!(
            SagaStep::Compensating {
                origin: FailureOrigin::LedgerDebit
            }
            .to_string(),
            "Compensating(LedgerDebit)"
        );
    }

    #[test]
    fn test_tagged_serialization() {
        let step = SagaStep::Compensating {
            origin: FailureOrigin::CompletionCommit,
        };
        let json = serde_json::to_value(step).unwrap();
        assert_eq!(json["step"], "Compensating");
        assert_eq!(json["origin"], "CompletionCommit");

        let back: SagaStep = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn test_advance_tracks_history() {
        let mut progress = SagaProgress::new(OrderId::new());
        progress.advance("NewOrder", SagaStep::AwaitingDebit);
        progress.advance("NewOrderTransaction", SagaStep::AwaitingCharge);

        assert_eq!(progress.current_step, SagaStep::AwaitingCharge);
        assert_eq!(progress.history.len(), 3);
        assert!(progress.has_processed("NewOrder"));
        assert!(!progress.has_processed("OrderSuccessPayment"));
    }

    #[test]
    fn test_terminal_step_sticks() {
        let mut progress = SagaProgress::new(OrderId::new());
        progress.advance("MarkOrderAsFailed", SagaStep::Failed);
        progress.advance(
            "OrderPaymentFailure",
            SagaStep::Compensating {
                origin: FailureOrigin::PaymentCharge,
            },
        );

        assert_eq!(progress.current_step, SagaStep::Failed);
        assert!(progress.is_finished());
        assert!(progress.has_processed("OrderPaymentFailure"));
    }
}
