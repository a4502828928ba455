//! # Admission outcome and its multi-producer completion signal.
//!
//! Three parties can finish a queued admission attempt: the dequeue worker
//! (admits), the submitting task (queue timeout), and any holder of the
//! outcome handle (cancellation). [`OutcomeCell`] arbitrates between them:
//! the first write wins, later writes are no-ops that return the winning
//! value so the loser can adjust.
//!
//! ## Rules
//! - `set()` never blocks and never overwrites; it returns the value that
//!   actually stuck.
//! - `wait()` is the only suspension point for submitters; it observes the
//!   final value exactly once set, regardless of ordering against `set()`.
//! - A winner that admitted must be matched by a release; a loser that
//!   tried to admit must not charge resources.

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

/// Terminal state of one admission attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// The request was admitted (immediately or from the queue).
    Admitted,
    /// The request was rejected or its queue timeout elapsed.
    RejectedOrTimedOut,
    /// The attempt was cancelled while queued.
    Cancelled,
}

const UNSET: u8 = 0;
const ADMITTED: u8 = 1;
const REJECTED_OR_TIMED_OUT: u8 = 2;
const CANCELLED: u8 = 3;

fn encode(outcome: AdmissionOutcome) -> u8 {
    match outcome {
        AdmissionOutcome::Admitted => ADMITTED,
        AdmissionOutcome::RejectedOrTimedOut => REJECTED_OR_TIMED_OUT,
        AdmissionOutcome::Cancelled => CANCELLED,
    }
}

fn decode(raw: u8) -> Option<AdmissionOutcome> {
    match raw {
        ADMITTED => Some(AdmissionOutcome::Admitted),
        REJECTED_OR_TIMED_OUT => Some(AdmissionOutcome::RejectedOrTimedOut),
        CANCELLED => Some(AdmissionOutcome::Cancelled),
        _ => None,
    }
}

/// Write-once admission outcome shared between the submitter, the dequeue
/// worker, and cancellers.
///
/// Construct one per submission and keep a clone of the `Arc` to be able to
/// cancel a queued request from outside.
#[derive(Debug, Default)]
pub struct OutcomeCell {
    state: AtomicU8,
    notify: Notify,
}

impl OutcomeCell {
    /// Creates an unresolved cell.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(UNSET),
            notify: Notify::new(),
        }
    }

    /// Attempts to resolve the attempt with `outcome`.
    ///
    /// Returns the outcome that won: `outcome` itself if this call resolved
    /// the cell, or the earlier winner if someone else got there first.
    pub fn set(&self, outcome: AdmissionOutcome) -> AdmissionOutcome {
        match self.state.compare_exchange(
            UNSET,
            encode(outcome),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.notify.notify_waiters();
                outcome
            }
            // Lost the race; report what actually happened.
            Err(prev) => decode(prev).unwrap_or(outcome),
        }
    }

    /// Requests cancellation of a queued attempt.
    ///
    /// Shorthand for `set(Cancelled)`. If the returned value is
    /// [`AdmissionOutcome::Admitted`] the dequeue worker won the race: the
    /// query is running and must be released through the normal path.
    pub fn cancel(&self) -> AdmissionOutcome {
        self.set(AdmissionOutcome::Cancelled)
    }

    /// Returns the resolved outcome, or `None` while still pending.
    pub fn get(&self) -> Option<AdmissionOutcome> {
        decode(self.state.load(Ordering::Acquire))
    }

    /// Waits until the cell resolves and returns the winning outcome.
    pub async fn wait(&self) -> AdmissionOutcome {
        loop {
            // Register interest before checking, so a concurrent set()
            // between the check and the await cannot be missed.
            let notified = self.notify.notified();
            if let Some(outcome) = self.get() {
                return outcome;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn first_write_wins() {
        let cell = OutcomeCell::new();
        assert_eq!(cell.get(), None);
        assert_eq!(cell.set(AdmissionOutcome::Admitted), AdmissionOutcome::Admitted);
        assert_eq!(
            cell.set(AdmissionOutcome::Cancelled),
            AdmissionOutcome::Admitted
        );
        assert_eq!(cell.get(), Some(AdmissionOutcome::Admitted));
    }

    #[test]
    fn cancel_reports_winner() {
        let cell = OutcomeCell::new();
        assert_eq!(cell.cancel(), AdmissionOutcome::Cancelled);
        assert_eq!(cell.cancel(), AdmissionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn wait_observes_value_set_before_waiting() {
        let cell = OutcomeCell::new();
        cell.set(AdmissionOutcome::RejectedOrTimedOut);
        assert_eq!(cell.wait().await, AdmissionOutcome::RejectedOrTimedOut);
    }

    #[tokio::test]
    async fn wait_wakes_on_set() {
        let cell = Arc::new(OutcomeCell::new());
        let waiter = {
            let cell = Arc::clone(&cell);
            tokio::spawn(async move { cell.wait().await })
        };
        tokio::task::yield_now().await;
        cell.set(AdmissionOutcome::Admitted);
        assert_eq!(waiter.await.unwrap(), AdmissionOutcome::Admitted);
    }
}
