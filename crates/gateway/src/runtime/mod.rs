//! The orchestrator runtime — queue consumption and the turn pipeline.
//!
//! Entry points: [`spawn_workers`] starts the queue consumers;
//! [`turn::run_turn`] drives one request to its terminal state.

pub mod agents;
pub mod classify;
pub mod emitter;
pub mod integrate;
pub mod plan;
pub mod prompts;
pub mod retry;
pub mod thread_gate;
pub mod turn;

pub use turn::run_turn;

use std::time::Duration;

use cf_domain::Error;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Spawn the configured number of queue consumers.
///
/// Each worker pops one request at a time and runs the turn inline, so
/// the worker count bounds turn concurrency. A closed queue ends the
/// worker; transient queue errors back off and continue.
pub fn spawn_workers(state: AppState) -> Vec<tokio::task::JoinHandle<()>> {
    let workers = state.config.pipeline.workers.max(1);
    (0..workers)
        .map(|worker_id| {
            let state = state.clone();
            tokio::spawn(async move {
                tracing::info!(worker_id, "worker started");
                loop {
                    match state.queue.consume().await {
                        Ok(request) => {
                            run_turn(state.clone(), request).await;
                        }
                        Err(Error::Queue(msg)) if msg.contains("closed") => {
                            tracing::info!(worker_id, "queue closed; worker stopping");
                            break;
                        }
                        Err(e) => {
                            tracing::error!(worker_id, error = %e, "queue consume failed");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            })
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Byte-bounded truncation that never splits a UTF-8 character.
pub(crate) fn truncate_str(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_strings_pass_through() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate_str(s, 2);
        assert!(t.ends_with("..."));
        assert!(t.len() <= 5);
        // Still valid UTF-8 by construction; check it round-trips.
        assert_eq!(t, String::from_utf8(t.as_bytes().to_vec()).unwrap());
    }
}
