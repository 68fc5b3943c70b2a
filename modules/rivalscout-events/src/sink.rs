use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::types::{DiagnosticEvent, EventLevel};

/// Destination for diagnostic events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: DiagnosticEvent) -> Result<()>;
}

/// Emit an event and swallow any sink failure with a warning.
pub async fn emit_best_effort(sink: &dyn EventSink, event: DiagnosticEvent) {
    let code = event.code;
    if let Err(e) = sink.emit(event).await {
        warn!(code = %code, error = %e, "Failed to emit diagnostic event (non-fatal)");
    }
}

// ---------------------------------------------------------------------------
// TracingSink
// ---------------------------------------------------------------------------

/// Mirrors every event into the tracing log at the matching level.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn emit(&self, event: DiagnosticEvent) -> Result<()> {
        let run_id = event.run_id.map(|id| id.to_string()).unwrap_or_default();
        let metrics = event
            .metrics
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_default();
        match event.level {
            EventLevel::Info => info!(
                job_id = %event.research_job_id,
                run_id = %run_id,
                source = %event.source,
                code = %event.code,
                metrics = %metrics,
                "{}",
                event.message
            ),
            EventLevel::Warn => warn!(
                job_id = %event.research_job_id,
                run_id = %run_id,
                source = %event.source,
                code = %event.code,
                metrics = %metrics,
                "{}",
                event.message
            ),
            EventLevel::Error => error!(
                job_id = %event.research_job_id,
                run_id = %run_id,
                source = %event.source,
                code = %event.code,
                metrics = %metrics,
                "{}",
                event.message
            ),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FanoutSink
// ---------------------------------------------------------------------------

/// Delivers each event to every inner sink. One failing sink does not stop
/// delivery to the rest; the first error is returned after all were tried.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    async fn emit(&self, event: DiagnosticEvent) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event.clone()).await {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryEventSink (tests)
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryEventSink;

#[cfg(any(test, feature = "test-support"))]
mod memory {
    use std::sync::Mutex;

    use super::*;
    use crate::types::EventCode;

    /// Records events in memory. Can be told to fail every emit.
    #[derive(Default)]
    pub struct MemoryEventSink {
        events: Mutex<Vec<DiagnosticEvent>>,
        failing: bool,
    }

    impl MemoryEventSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                failing: true,
            }
        }

        pub fn events(&self) -> Vec<DiagnosticEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn codes(&self) -> Vec<EventCode> {
            self.events().into_iter().map(|e| e.code).collect()
        }

        pub fn count(&self, code: EventCode) -> usize {
            self.events().iter().filter(|e| e.code == code).count()
        }
    }

    #[async_trait]
    impl EventSink for MemoryEventSink {
        async fn emit(&self, event: DiagnosticEvent) -> Result<()> {
            if self.failing {
                anyhow::bail!("event sink unavailable");
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventCode;
    use uuid::Uuid;

    #[tokio::test]
    async fn fanout_delivers_past_a_failing_sink() {
        let failing = Arc::new(MemoryEventSink::failing());
        let healthy = Arc::new(MemoryEventSink::new());
        let fanout = FanoutSink::new()
            .with(failing.clone())
            .with(healthy.clone());

        let event = DiagnosticEvent::new(Uuid::new_v4(), EventCode::RunStarted, "started");
        assert!(fanout.emit(event).await.is_err());
        assert_eq!(healthy.codes(), vec![EventCode::RunStarted]);
    }

    #[tokio::test]
    async fn best_effort_swallows_errors() {
        let failing = MemoryEventSink::failing();
        let event = DiagnosticEvent::new(Uuid::new_v4(), EventCode::RunFailed, "boom");
        emit_best_effort(&failing, event).await;
        assert!(failing.events().is_empty());
    }
}
