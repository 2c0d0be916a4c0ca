//! Fault-injection toggles.

use serde::{Deserialize, Serialize};

/// Fault-injection switches for a single saga run.
///
/// The live copy is mutable through the HTTP `/config` surface; every saga
/// captures a snapshot of it when the order is submitted and carries that
/// snapshot on every envelope and command, so concurrent sagas never observe
/// a toggle flipping mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaultToggles {
    /// Fail the ledger debit step before touching the account.
    pub should_ledger_debit_fail: bool,
    /// Fail the payment step before a payment row is created.
    pub should_internal_payment_fail: bool,
    /// Make the external payment gateway decline the charge.
    pub should_external_payment_fail: bool,
    /// Attempt number (1-indexed) at which the completion commit succeeds.
    ///
    /// `0` or `1` succeed on the first attempt; anything above the retry
    /// bound exhausts the retries and triggers compensation.
    pub completion_retry_threshold: u32,
}

impl FaultToggles {
    /// Returns true if the completion commit should go through on `attempt`.
    pub fn completion_succeeds_on(&self, attempt: u32) -> bool {
        self.completion_retry_threshold <= attempt
    }
}
