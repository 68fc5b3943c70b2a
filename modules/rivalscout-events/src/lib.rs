//! Diagnostic events for orchestration runs.
//!
//! Events are observational. Emitting one never changes the outcome of a run,
//! and sinks that fail are logged and skipped.

pub mod sink;
pub mod store;
pub mod types;

pub use sink::{emit_best_effort, EventSink, FanoutSink, TracingSink};
pub use store::PgEventStore;
pub use types::{DiagnosticEvent, EventCode, EventLevel, StoredDiagnostic};

#[cfg(any(test, feature = "test-support"))]
pub use sink::MemoryEventSink;
