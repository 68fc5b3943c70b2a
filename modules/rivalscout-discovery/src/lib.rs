pub mod aggregator;
pub mod evidence;
pub mod job_state;
pub mod lifecycle;
pub mod orchestrator;
pub mod scoring;
pub mod selection;
pub mod semantic;
pub mod sources;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod validation;

pub use orchestrator::{DeadlineOutcome, OrchestrationResult, Orchestrator, RunTask};
