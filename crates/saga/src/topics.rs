//! Topic names used by the checkout saga.
//!
//! Events travel wrapped in a [`SagaEnvelope`](crate::SagaEnvelope) on one
//! shared topic; every command has a topic of its own named after its type.

/// Topic carrying every saga event envelope.
pub const CHECKOUT_ORDER_TRANSACTION: &str = "CheckoutOrderTransaction";

pub const CREATE_DECREASE_TRANSACTION: &str = "CreateDecreaseTransactionCommand";
pub const MAKE_PAYMENT: &str = "MakePaymentCommand";
pub const MARK_ORDER_AS_SUCCESS: &str = "MarkOrderAsSuccessCommand";
pub const MARK_ORDER_AS_FAILED: &str = "MarkOrderAsFailedCommand";
pub const REVERSE_TRANSACTION: &str = "ReverseTransactionCommand";
pub const FAIL_PAYMENT: &str = "FailPaymentCommand";

/// Every topic the saga reads or writes.
pub const ALL: [&str; 7] = [
    CHECKOUT_ORDER_TRANSACTION,
    CREATE_DECREASE_TRANSACTION,
    MAKE_PAYMENT,
    MARK_ORDER_AS_SUCCESS,
    MARK_ORDER_AS_FAILED,
    REVERSE_TRANSACTION,
    FAIL_PAYMENT,
];

/// Returns every saga topic as owned names.
pub fn all() -> Vec<String> {
    ALL.iter().map(|t| t.to_string()).collect()
}
