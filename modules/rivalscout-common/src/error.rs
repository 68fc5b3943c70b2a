use thiserror::Error;

#[derive(Error, Debug)]
pub enum RivalScoutError {
    #[error("Orchestration already running for research job {research_job_id} (run {run_id})")]
    AlreadyRunning {
        research_job_id: uuid::Uuid,
        run_id: uuid::Uuid,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Orchestration run not found: {0}")]
    RunNotFound(uuid::Uuid),

    #[error("Research job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Orchestration failed: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl RivalScoutError {
    /// Stable machine-readable code surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            RivalScoutError::AlreadyRunning { .. } => "ORCHESTRATION_ALREADY_RUNNING",
            RivalScoutError::InvalidRequest(_) => "INVALID_REQUEST",
            RivalScoutError::RunNotFound(_) => "RUN_NOT_FOUND",
            RivalScoutError::JobNotFound(_) => "JOB_NOT_FOUND",
            RivalScoutError::Database(_) => "DATABASE_ERROR",
            RivalScoutError::Config(_) => "CONFIG_ERROR",
            RivalScoutError::Pipeline(_) => "ORCHESTRATION_FAILED",
            RivalScoutError::Anyhow(_) => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            RivalScoutError::AlreadyRunning { .. } => 409,
            RivalScoutError::InvalidRequest(_) => 400,
            RivalScoutError::RunNotFound(_) | RivalScoutError::JobNotFound(_) => 404,
            _ => 500,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RivalScoutError::AlreadyRunning { .. })
    }
}

impl From<sqlx::Error> for RivalScoutError {
    fn from(err: sqlx::Error) -> Self {
        RivalScoutError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RivalScoutError>;
