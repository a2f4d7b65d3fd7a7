//! Judging a single rule against extracted document text.
//!
//! [`RuleEvaluator::evaluate`] never fails: a model that cannot be reached,
//! or that answers with something other than a JSON object, yields a failing
//! verdict with confidence 0 and text naming which of the two went wrong.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::llm::{CompletionRequest, LlmBackend, LlmError};
use crate::{Rule, RuleVerdict, VerdictStatus};

/// Instruction sent with every rule.
pub const SYSTEM_PROMPT: &str = "\
You are a meticulous document compliance reviewer. You will receive a JSON object \
with two fields: \"rule\", a natural-language requirement, and \"document\", text \
extracted from a PDF. Decide whether the document satisfies the rule.

Respond with a single JSON object and nothing else, using exactly these fields:
- \"rule\": the rule text, copied verbatim
- \"status\": \"pass\" if the document satisfies the rule, otherwise \"fail\"
- \"evidence\": a short quote or close paraphrase from the document supporting the decision
- \"reasoning\": one or two sentences explaining the decision
- \"confidence\": an integer from 0 to 100

Do not add any other fields, commentary, or Markdown. If the rule does not apply \
to this kind of document, or cannot be judged from its text, answer \"fail\" with \
a low confidence.";

/// Placeholder when the model omits `evidence`.
pub const NO_EVIDENCE: &str = "No evidence found";
/// Placeholder when the model omits `reasoning`.
pub const NO_REASONING: &str = "Failed to process";

pub const MALFORMED_OUTPUT_EVIDENCE: &str = "Model returned malformed output";
pub const MALFORMED_OUTPUT_REASONING: &str =
    "The model's reply was not a valid JSON object, so this rule could not be judged.";

pub const API_FAILURE_EVIDENCE: &str = "Model request failed";

pub const INTERNAL_FAILURE_EVIDENCE: &str = "Evaluation error";
pub const INTERNAL_FAILURE_REASONING: &str =
    "An internal error interrupted the evaluation of this rule.";

/// Why a rule could not be judged normally.
#[derive(Debug)]
pub enum EvaluationFailure {
    /// The model answered, but not with a JSON object.
    MalformedOutput,
    /// The model could not be reached.
    Communication(LlmError),
    /// The evaluation itself broke (e.g. its task panicked).
    Internal(String),
}

impl EvaluationFailure {
    /// Stable identifier for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EvaluationFailure::MalformedOutput => "malformed_output",
            EvaluationFailure::Communication(_) => "communication",
            EvaluationFailure::Internal(_) => "internal",
        }
    }

    /// The degraded verdict reported for `rule`.
    pub fn into_verdict(self, rule: &Rule) -> RuleVerdict {
        let (evidence, reasoning) = match self {
            EvaluationFailure::MalformedOutput => (
                MALFORMED_OUTPUT_EVIDENCE.to_string(),
                MALFORMED_OUTPUT_REASONING.to_string(),
            ),
            EvaluationFailure::Communication(err) => (
                API_FAILURE_EVIDENCE.to_string(),
                api_failure_reasoning(&err),
            ),
            EvaluationFailure::Internal(_) => (
                INTERNAL_FAILURE_EVIDENCE.to_string(),
                INTERNAL_FAILURE_REASONING.to_string(),
            ),
        };
        RuleVerdict {
            rule: rule.as_str().to_string(),
            status: VerdictStatus::Fail,
            evidence,
            reasoning,
            confidence: 0,
        }
    }
}

/// Reasoning text for a verdict whose model call failed.
pub fn api_failure_reasoning(err: &LlmError) -> String {
    format!(
        "The model service could not be reached ({}), so this rule could not be judged.",
        err.label()
    )
}

#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    /// Document text beyond this many characters is cut off before sending.
    pub max_document_chars: usize,
    pub temperature: f32,
    /// Upper bound on a single model call.
    pub timeout: Duration,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            max_document_chars: 30_000,
            temperature: 0.1,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Builds prompts, calls the model, and normalizes its replies into verdicts.
pub struct RuleEvaluator {
    backend: Arc<dyn LlmBackend>,
    settings: EvaluatorSettings,
}

impl RuleEvaluator {
    pub fn new(backend: Arc<dyn LlmBackend>, settings: EvaluatorSettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// The request sent for `rule`; the document is truncated to the character budget.
    pub fn build_request(&self, rule: &Rule, document_text: &str) -> CompletionRequest {
        let document = truncate_chars(document_text, self.settings.max_document_chars);
        let user = serde_json::json!({
            "rule": rule.as_str(),
            "document": document,
        });
        CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: user.to_string(),
            temperature: self.settings.temperature,
            json_output: true,
        }
    }

    /// Judge `rule` against `document_text`. Never fails; see the module docs.
    pub async fn evaluate(&self, rule: &Rule, document_text: &str) -> RuleVerdict {
        match self.try_evaluate(rule, document_text).await {
            Ok(verdict) => verdict,
            Err(failure) => {
                match &failure {
                    EvaluationFailure::Communication(err) => {
                        tracing::warn!(rule = %rule, backend = self.backend.name(), kind = failure.kind(), error = %err, "rule evaluation degraded");
                    }
                    _ => {
                        tracing::warn!(rule = %rule, backend = self.backend.name(), kind = failure.kind(), "rule evaluation degraded");
                    }
                }
                failure.into_verdict(rule)
            }
        }
    }

    async fn try_evaluate(
        &self,
        rule: &Rule,
        document_text: &str,
    ) -> Result<RuleVerdict, EvaluationFailure> {
        let request = self.build_request(rule, document_text);

        let reply = tokio::time::timeout(self.settings.timeout, self.backend.complete(&request))
            .await
            .map_err(|_| EvaluationFailure::Communication(LlmError::Timeout))?
            .map_err(EvaluationFailure::Communication)?;

        parse_verdict(rule, &reply).ok_or(EvaluationFailure::MalformedOutput)
    }
}

/// Prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parse a model reply into a verdict for `rule`.
///
/// Returns `None` when the reply is not a JSON object. Missing or unusable
/// fields are replaced with defaults; the `rule` field is always `rule`.
pub fn parse_verdict(rule: &Rule, reply: &str) -> Option<RuleVerdict> {
    let value: Value = serde_json::from_str(strip_code_fence(reply)).ok()?;
    let fields = value.as_object()?;
    Some(normalize(rule, fields))
}

/// Remove a surrounding Markdown code fence, if any.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    match rest.trim_end().strip_suffix("```") {
        Some(inner) => inner.trim(),
        None => trimmed,
    }
}

fn normalize(rule: &Rule, fields: &Map<String, Value>) -> RuleVerdict {
    let status = match fields
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("pass") => VerdictStatus::Pass,
        _ => VerdictStatus::Fail,
    };

    RuleVerdict {
        rule: rule.as_str().to_string(),
        status,
        evidence: text_field(fields, "evidence").unwrap_or_else(|| NO_EVIDENCE.to_string()),
        reasoning: text_field(fields, "reasoning").unwrap_or_else(|| NO_REASONING.to_string()),
        confidence: confidence(fields.get("confidence")),
    }
}

fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numbers and numeric strings are rounded and clamped to 0–100; anything else is 0.
fn confidence(value: Option<&Value>) -> u8 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => n.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}
