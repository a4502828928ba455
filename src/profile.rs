//! # Per-query admission annotations.
//!
//! Every request carries an [`QueryProfile`] that the controller fills in
//! as the attempt progresses: the final admission result, why the request
//! was first queued, the most recent reason it still could not run, the
//! memory that was admitted, the time spent waiting, and a staleness
//! warning when the decision was taken against old gossip data.
//!
//! The profile outlives the admission call (the execution frontend renders
//! it into the query's runtime profile), so it has interior mutability and
//! can be read concurrently with updates.

use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

/// How one admission attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AdmissionResult {
    /// Admitted on the submitting call, without queueing.
    AdmitImmediately,
    /// Admitted by the dequeue worker after waiting in the queue.
    AdmitQueued,
    /// Rejected before queueing.
    Rejected,
    /// Queue timeout elapsed.
    TimedOut,
    /// Cancelled while waiting in the queue.
    CancelledInQueue,
}

impl fmt::Display for AdmissionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AdmissionResult::AdmitImmediately => "Admitted immediately",
            AdmissionResult::AdmitQueued => "Admitted (queued)",
            AdmissionResult::Rejected => "Rejected",
            AdmissionResult::TimedOut => "Timed out (queued)",
            AdmissionResult::CancelledInQueue => "Cancelled (queued)",
        };
        f.write_str(text)
    }
}

/// Point-in-time copy of the annotations, used by introspection.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProfileSnapshot {
    pub admission_result: Option<AdmissionResult>,
    pub initial_queue_reason: Option<String>,
    pub last_queue_reason: Option<String>,
    pub admitted_mem: Option<i64>,
    pub wait_time_ms: Option<u64>,
    pub staleness_warning: Option<String>,
}

/// Admission annotations for one query.
#[derive(Debug, Default)]
pub struct QueryProfile {
    inner: Mutex<ProfileSnapshot>,
}

impl QueryProfile {
    fn lock(&self) -> MutexGuard<'_, ProfileSnapshot> {
        // A poisoned profile still holds valid annotations.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_admission_result(&self, result: AdmissionResult) {
        self.lock().admission_result = Some(result);
    }

    /// Records why the request was queued in the first place. Kept once;
    /// later failures go to [`set_last_queue_reason`](Self::set_last_queue_reason).
    pub fn set_initial_queue_reason(&self, reason: impl Into<String>) {
        let mut inner = self.lock();
        let reason = reason.into();
        if inner.initial_queue_reason.is_none() {
            inner.initial_queue_reason = Some(reason.clone());
        }
        inner.last_queue_reason = Some(reason);
    }

    /// Records the most recent reason the head-of-queue request still
    /// could not be admitted.
    pub fn set_last_queue_reason(&self, reason: impl Into<String>) {
        self.lock().last_queue_reason = Some(reason.into());
    }

    pub fn set_admitted_mem(&self, bytes: i64) {
        self.lock().admitted_mem = Some(bytes);
    }

    pub fn set_wait_time(&self, wait: Duration) {
        self.lock().wait_time_ms = Some(wait.as_millis() as u64);
    }

    pub fn set_staleness_warning(&self, warning: impl Into<String>) {
        self.lock().staleness_warning = Some(warning.into());
    }

    pub fn admission_result(&self) -> Option<AdmissionResult> {
        self.lock().admission_result
    }

    pub fn last_queue_reason(&self) -> Option<String> {
        self.lock().last_queue_reason.clone()
    }

    /// Copies all annotations out.
    pub fn snapshot(&self) -> ProfileSnapshot {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_queue_reason_is_sticky() {
        let profile = QueryProfile::default();
        profile.set_initial_queue_reason("queue is not empty");
        profile.set_last_queue_reason("not enough memory");
        let snap = profile.snapshot();
        assert_eq!(snap.initial_queue_reason.as_deref(), Some("queue is not empty"));
        assert_eq!(snap.last_queue_reason.as_deref(), Some("not enough memory"));
    }

    #[test]
    fn result_rendering() {
        assert_eq!(AdmissionResult::AdmitQueued.to_string(), "Admitted (queued)");
        assert_eq!(AdmissionResult::TimedOut.to_string(), "Timed out (queued)");
    }
}
