use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod backend;
pub mod checker;
pub mod config_file;
pub mod evaluator;
pub mod extract;
pub mod llm;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend};
pub use checker::{Checker, CheckerSettings};
pub use config_file::ConfigFile;
pub use evaluator::{EvaluationFailure, EvaluatorSettings, RuleEvaluator};
pub use llm::openai::OpenAiBackend;
pub use llm::{CompletionRequest, LlmBackend, LlmError};

/// Port the web server listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 5004;

/// The only media type accepted for uploads.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// A natural-language rule, trimmed and guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule(String);

impl Rule {
    /// Trim `raw` and wrap it. Returns `None` for empty or whitespace-only input.
    pub fn parse(raw: &str) -> Option<Rule> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Rule(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pass/fail outcome of a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Pass,
    Fail,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Pass => "pass",
            VerdictStatus::Fail => "fail",
        }
    }
}

/// The judgment produced for one rule against one document.
///
/// Always fully populated: the evaluator substitutes defaults for anything
/// the model leaves out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub rule: String,
    pub status: VerdictStatus,
    pub evidence: String,
    pub reasoning: String,
    /// Self-reported certainty, 0–100.
    pub confidence: u8,
}

/// Body of a successful check: one verdict per submitted rule, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub results: Vec<RuleVerdict>,
}

/// A received file with its declared metadata.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    /// Media type declared by the client, if any.
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// An unvalidated check request as it arrived.
#[derive(Debug, Clone, Default)]
pub struct CheckInput {
    /// The rules field verbatim; expected to be a JSON array of strings.
    pub rules: Option<String>,
    pub file: Option<Upload>,
}

/// Request-level failures. Any of these aborts the whole check before or
/// instead of producing verdicts.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Invalid rules format: {0}")]
    MalformedRules(String),
    #[error("No PDF file uploaded")]
    MissingFile,
    #[error("Only PDF files are supported (got {0})")]
    UnsupportedFileType(String),
    #[error("At least one non-empty rule is required")]
    NoRules,
    #[error("Failed to extract text from PDF: {0}")]
    ExtractionFailed(String),
    #[error("PDF contains too little text to check ({found} characters, need at least {required})")]
    InsufficientContent { found: usize, required: usize },
    #[error("internal error: {0}")]
    Internal(String),
}

impl CheckError {
    /// Whether the caller's input is at fault (as opposed to server-side processing).
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            CheckError::ExtractionFailed(_) | CheckError::Internal(_)
        )
    }
}

/// Runtime configuration shared by the server and the CLI.
#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_document_chars: usize,
    pub min_text_chars: usize,
    pub max_concurrent_evaluations: usize,
    pub max_upload_mb: usize,
    pub port: u16,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_document_chars", &self.max_document_chars)
            .field("min_text_chars", &self.min_text_chars)
            .field(
                "max_concurrent_evaluations",
                &self.max_concurrent_evaluations,
            )
            .field("max_upload_mb", &self.max_upload_mb)
            .field("port", &self.port)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            timeout_secs: 60,
            max_document_chars: 30_000,
            min_text_chars: 50,
            max_concurrent_evaluations: 4,
            max_upload_mb: 20,
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Defaults, overlaid by the config file cascade, overlaid by the process environment.
    pub fn load() -> Self {
        let mut config = Config::default();
        config.apply_file(&config_file::load_config());
        config.apply_env_from(|key| std::env::var(key).ok());
        config
    }

    /// Apply every value present in `file`.
    pub fn apply_file(&mut self, file: &ConfigFile) {
        if let Some(llm) = &file.llm {
            if let Some(v) = &llm.api_key {
                self.api_key = Some(v.clone());
            }
            if let Some(v) = &llm.base_url {
                self.base_url = v.clone();
            }
            if let Some(v) = &llm.model {
                self.model = v.clone();
            }
            if let Some(v) = llm.temperature {
                self.temperature = v;
            }
            if let Some(v) = llm.timeout_secs {
                self.timeout_secs = v;
            }
        }
        if let Some(limits) = &file.limits {
            if let Some(v) = limits.max_document_chars {
                self.max_document_chars = v;
            }
            if let Some(v) = limits.min_text_chars {
                self.min_text_chars = v;
            }
            if let Some(v) = limits.max_concurrent_evaluations {
                self.max_concurrent_evaluations = v;
            }
            if let Some(v) = limits.max_upload_mb {
                self.max_upload_mb = v;
            }
        }
        if let Some(port) = file.server.as_ref().and_then(|s| s.port) {
            self.port = port;
        }
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(model) = lookup("RULECHECK_MODEL").filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }
        if let Some(port) = parse_env(&lookup, "PORT") {
            self.port = port;
        }
        if let Some(secs) = parse_env(&lookup, "RULECHECK_TIMEOUT_SECS") {
            self.timeout_secs = secs;
        }
        if let Some(n) = parse_env(&lookup, "RULECHECK_MAX_CONCURRENCY") {
            self.max_concurrent_evaluations = n;
        }
        if let Some(n) = parse_env(&lookup, "RULECHECK_MAX_DOCUMENT_CHARS") {
            self.max_document_chars = n;
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn evaluator_settings(&self) -> EvaluatorSettings {
        EvaluatorSettings {
            max_document_chars: self.max_document_chars,
            temperature: self.temperature,
            timeout: self.timeout(),
        }
    }

    pub fn checker_settings(&self) -> CheckerSettings {
        CheckerSettings {
            min_text_chars: self.min_text_chars,
            max_concurrent_evaluations: self.max_concurrent_evaluations.max(1),
        }
    }

    /// Build the OpenAI-compatible backend described by this config.
    pub fn build_llm_backend(&self) -> Result<OpenAiBackend, LlmError> {
        OpenAiBackend::new(
            self.base_url.clone(),
            self.model.clone(),
            self.api_key.clone(),
            self.timeout(),
        )
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}
