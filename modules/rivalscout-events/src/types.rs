use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase-boundary codes emitted by an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCode {
    RunStarted,
    StaleRunReplaced,
    SourceStarted,
    SourceCompleted,
    SourceFailed,
    PlanGenerated,
    ValidationCompleted,
    SemanticUnavailable,
    CandidatesFiltered,
    ShortlistGenerated,
    RunCompleted,
    RunFailed,
}

impl EventCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCode::RunStarted => "RUN_STARTED",
            EventCode::StaleRunReplaced => "STALE_RUN_REPLACED",
            EventCode::SourceStarted => "SOURCE_STARTED",
            EventCode::SourceCompleted => "SOURCE_COMPLETED",
            EventCode::SourceFailed => "SOURCE_FAILED",
            EventCode::PlanGenerated => "PLAN_GENERATED",
            EventCode::ValidationCompleted => "VALIDATION_COMPLETED",
            EventCode::SemanticUnavailable => "SEMANTIC_UNAVAILABLE",
            EventCode::CandidatesFiltered => "CANDIDATES_FILTERED",
            EventCode::ShortlistGenerated => "SHORTLIST_GENERATED",
            EventCode::RunCompleted => "RUN_COMPLETED",
            EventCode::RunFailed => "RUN_FAILED",
        }
    }

    /// Level used when the caller does not pick one.
    pub fn default_level(&self) -> EventLevel {
        match self {
            EventCode::SourceFailed
            | EventCode::SemanticUnavailable
            | EventCode::StaleRunReplaced => EventLevel::Warn,
            EventCode::RunFailed => EventLevel::Error,
            _ => EventLevel::Info,
        }
    }
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event to be emitted. The caller builds this; sinks decide where it goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEvent {
    pub research_job_id: Uuid,
    pub run_id: Option<Uuid>,
    /// Component or discovery source that produced the event (`orchestrator`, `ai`, ...).
    pub source: String,
    pub code: EventCode,
    pub level: EventLevel,
    pub message: String,
    pub metrics: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

impl DiagnosticEvent {
    pub fn new(research_job_id: Uuid, code: EventCode, message: impl Into<String>) -> Self {
        Self {
            research_job_id,
            run_id: None,
            source: "orchestrator".to_string(),
            code,
            level: code.default_level(),
            message: message.into(),
            metrics: None,
            metadata: None,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_metrics(mut self, metrics: serde_json::Value) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// An event as stored in Postgres.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDiagnostic {
    pub seq: i64,
    pub ts: DateTime<Utc>,
    pub event: DiagnosticEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_defaults_from_code() {
        let job = Uuid::new_v4();
        let event = DiagnosticEvent::new(job, EventCode::SourceFailed, "serper timed out")
            .with_source("algorithmic");
        assert_eq!(event.level, EventLevel::Warn);
        assert_eq!(event.source, "algorithmic");
        assert!(event.run_id.is_none());

        let failed = DiagnosticEvent::new(job, EventCode::RunFailed, "boom");
        assert_eq!(failed.level, EventLevel::Error);
    }

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_value(EventCode::StaleRunReplaced).unwrap();
        assert_eq!(json, "STALE_RUN_REPLACED");
        assert_eq!(EventCode::ShortlistGenerated.to_string(), "SHORTLIST_GENERATED");
    }
}
