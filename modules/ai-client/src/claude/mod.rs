mod client;
pub(crate) mod types;

use std::time::Duration;

use tracing::warn;

use crate::error::{AiError, Result};
use crate::schema::StructuredOutput;
use client::ClaudeClient;
use types::*;

const STRUCTURED_TOOL: &str = "structured_response";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Claude
// =============================================================================

#[derive(Debug, Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    base_url: Option<String>,
    timeout: Duration,
    max_tokens: u32,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: 4096,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.timeout);
        match &self.base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        }
    }

    /// Ask Claude for a `T`, forcing a single tool call whose schema is `T`'s.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Result<T> {
        let request = ChatRequest::new(&self.model)
            .system(system_prompt)
            .message(WireMessage::user(user_prompt))
            .max_tokens(self.max_tokens)
            .temperature(0.0)
            .forced_tool(ToolDefinition {
                name: STRUCTURED_TOOL.to_string(),
                description: format!("Return the result as a {}.", T::type_name()),
                input_schema: T::tool_schema(),
            });

        let response = self.client().chat(&request).await?;

        let Some(input) = response.tool_input(STRUCTURED_TOOL) else {
            if let Some(text) = response.text() {
                warn!(chars = text.len(), "Claude answered in text instead of the forced tool");
            }
            return Err(AiError::MissingOutput);
        };

        serde_json::from_value(input.clone()).map_err(|e| AiError::Parse(e.to_string()))
    }
}
