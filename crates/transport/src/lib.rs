//! The transport & store substrate.
//!
//! Five ports with identical semantics across two interchangeable
//! implementations:
//!
//! - [`MemoryTransport`] — single-process queues and maps, no
//!   persistence across restarts. Development and tests.
//! - [`RelationalTransport`] — SQLite via sqlx: claim-and-delete queue
//!   pops, TTL'd response rows, an append-only progress table keyed on
//!   `(correlation_id, seq)`, with live reads by polling.
//!
//! Backend failures always surface as `Err`; there is no silent
//! in-memory fallback.

pub mod memory;
pub mod ports;
pub mod relational;

pub use memory::MemoryTransport;
pub use ports::{
    DocumentAggregate, FeedbackEntry, HistoryStore, ProgressLog, RequestQueue, ResponseStore,
    SearchAggregate, ThreadStore, TurnSummary,
};
pub use relational::RelationalTransport;
