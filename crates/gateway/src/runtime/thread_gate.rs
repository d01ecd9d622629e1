//! Per-thread submission control.
//!
//! Refinement semantics require strict turn ordering within a thread, so
//! the Front API rejects a second submission for a thread whose previous
//! turn has not reached a terminal response yet (429 to the client).
//!
//! The gate is process-local and self-healing: entries expire once the
//! turn-timeout window has passed, and the submission handler clears an
//! entry early when the durable response for it is already observable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use cf_domain::ids::{CorrelationId, ThreadId};

/// Error returned when a thread already has an in-flight turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadBusy {
    /// The turn currently holding the thread.
    pub inflight: CorrelationId,
}

impl std::fmt::Display for ThreadBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "thread is busy — turn {} is still in progress",
            self.inflight
        )
    }
}

impl std::error::Error for ThreadBusy {}

struct GateEntry {
    correlation_id: CorrelationId,
    started_at: Instant,
}

/// Tracks the in-flight turn per thread.
pub struct ThreadGate {
    inflight: Mutex<HashMap<ThreadId, GateEntry>>,
    /// Entries older than this are considered abandoned (the worker
    /// died or the request was lost) and may be replaced.
    expiry: Duration,
}

impl ThreadGate {
    pub fn new(turn_timeout: Duration) -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            // One timeout for the turn itself plus slack for publish.
            expiry: turn_timeout + Duration::from_secs(30),
        }
    }

    /// Claim the thread for a new turn.
    pub fn begin(
        &self,
        thread_id: ThreadId,
        correlation_id: CorrelationId,
    ) -> Result<(), ThreadBusy> {
        let mut inflight = self.inflight.lock();
        if let Some(entry) = inflight.get(&thread_id) {
            if entry.started_at.elapsed() < self.expiry {
                return Err(ThreadBusy {
                    inflight: entry.correlation_id,
                });
            }
        }
        inflight.insert(
            thread_id,
            GateEntry {
                correlation_id,
                started_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// The turn currently holding the thread, if any.
    pub fn inflight(&self, thread_id: ThreadId) -> Option<CorrelationId> {
        let inflight = self.inflight.lock();
        inflight
            .get(&thread_id)
            .filter(|entry| entry.started_at.elapsed() < self.expiry)
            .map(|entry| entry.correlation_id)
    }

    /// Release the thread after its terminal response is durable.
    pub fn finish(&self, thread_id: ThreadId) {
        self.inflight.lock().remove(&thread_id);
    }

    /// Number of threads with an in-flight turn (for monitoring).
    pub fn busy_count(&self) -> usize {
        self.inflight.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_submission_is_rejected_until_finish() {
        let gate = ThreadGate::new(Duration::from_secs(120));
        let tid = ThreadId::mint();
        let first = CorrelationId::mint();

        gate.begin(tid, first).unwrap();
        let err = gate.begin(tid, CorrelationId::mint()).unwrap_err();
        assert_eq!(err.inflight, first);

        gate.finish(tid);
        gate.begin(tid, CorrelationId::mint()).unwrap();
    }

    #[test]
    fn distinct_threads_are_independent() {
        let gate = ThreadGate::new(Duration::from_secs(120));
        gate.begin(ThreadId::mint(), CorrelationId::mint()).unwrap();
        gate.begin(ThreadId::mint(), CorrelationId::mint()).unwrap();
        assert_eq!(gate.busy_count(), 2);
    }

    #[test]
    fn stale_entries_expire() {
        let gate = ThreadGate {
            inflight: Mutex::new(HashMap::new()),
            expiry: Duration::from_millis(1),
        };
        let tid = ThreadId::mint();
        gate.begin(tid, CorrelationId::mint()).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(gate.inflight(tid).is_none());
        gate.begin(tid, CorrelationId::mint()).unwrap();
    }
}
