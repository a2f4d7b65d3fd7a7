//! Language model backend trait and implementations.

pub mod mock;
pub mod openai;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// A single prompt sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Fixed instruction describing the task and output schema.
    pub system: String,
    /// Per-call input.
    pub user: String,
    pub temperature: f32,
    /// Ask the service to constrain its reply to a JSON object.
    pub json_output: bool,
}

/// Failure to obtain a reply from the model service.
///
/// Every variant means "we couldn't reach the model", as opposed to the model
/// answering with something unusable.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("request timed out")]
    Timeout,
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("model service returned no choices")]
    EmptyResponse,
}

impl LlmError {
    /// Short label safe to show to end users (never includes response bodies).
    pub fn label(&self) -> String {
        match self {
            LlmError::MissingApiKey => "missing API key".to_string(),
            LlmError::Timeout => "timed out".to_string(),
            LlmError::Http(e) if e.is_timeout() => "timed out".to_string(),
            LlmError::Http(e) if e.is_connect() => "connection failed".to_string(),
            LlmError::Http(_) => "network error".to_string(),
            LlmError::Status { status, .. } => format!("HTTP {}", status),
            LlmError::EmptyResponse => "no choices returned".to_string(),
        }
    }
}

/// A chat-style model that answers one prompt with one text reply.
pub trait LlmBackend: Send + Sync {
    /// Name used in logs (e.g. the model identifier).
    fn name(&self) -> &str;

    /// Send `request` and return the raw reply text.
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;
}
