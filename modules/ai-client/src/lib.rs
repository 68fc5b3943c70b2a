//! Minimal Claude client for structured extraction.
//!
//! Requests force a single tool call whose input schema is derived from the
//! caller's output type, so responses always deserialize into `T`.

pub mod claude;
pub mod error;
pub mod schema;

pub use claude::Claude;
pub use error::AiError;
pub use schema::StructuredOutput;
