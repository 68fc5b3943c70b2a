use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("Claude request timed out")]
    Timeout,

    #[error("Claude API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Invalid API key header: {0}")]
    InvalidKey(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Failed to parse structured output: {0}")]
    Parse(String),

    #[error("No structured output in Claude response")]
    MissingOutput,
}

impl AiError {
    /// Rate limits and server errors are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Timeout => true,
            AiError::Api { status, .. } => *status == 429 || *status >= 500,
            AiError::Http(e) => e.is_connect(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AiError::Timeout
        } else {
            AiError::Http(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, AiError>;
