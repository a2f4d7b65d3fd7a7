use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::backend::PdfBackend;
use crate::evaluator::{EvaluationFailure, RuleEvaluator};
use crate::{CheckError, CheckInput, CheckResponse, Rule, RuleVerdict, VerdictStatus, extract};

#[derive(Debug, Clone)]
pub struct CheckerSettings {
    /// Extracted text shorter than this (trimmed, in characters) is rejected.
    pub min_text_chars: usize,
    /// Upper bound on model calls in flight for a single check.
    pub max_concurrent_evaluations: usize,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            min_text_chars: 50,
            max_concurrent_evaluations: 4,
        }
    }
}

/// Validates a check request, extracts the document once, and evaluates
/// every rule against it.
pub struct Checker {
    pdf: Arc<dyn PdfBackend>,
    evaluator: Arc<RuleEvaluator>,
    settings: CheckerSettings,
}

impl Checker {
    pub fn new(
        pdf: Arc<dyn PdfBackend>,
        evaluator: Arc<RuleEvaluator>,
        settings: CheckerSettings,
    ) -> Self {
        Self {
            pdf,
            evaluator,
            settings,
        }
    }

    /// Run a check on a raw request.
    ///
    /// Validation stops at the first problem, in this order: rules field
    /// syntax, file presence, file media type, non-empty rules, extraction.
    /// No model call is made unless all of them pass.
    pub async fn check(&self, input: CheckInput) -> Result<CheckResponse, CheckError> {
        let raw_rules = parse_rules(input.rules.as_deref())?;
        let file = input.file.ok_or(CheckError::MissingFile)?;
        extract::ensure_pdf(&file)?;

        let rules = collect_rules(&raw_rules);
        if rules.is_empty() {
            return Err(CheckError::NoRules);
        }

        tracing::info!(
            filename = %file.filename,
            bytes = file.data.len(),
            rules = rules.len(),
            model = self.evaluator.backend_name(),
            "starting check"
        );
        self.run(file.data, rules).await
    }

    /// Run a check for callers that already hold the PDF bytes and rule list.
    pub async fn check_rules(
        &self,
        data: Vec<u8>,
        rules: &[String],
    ) -> Result<CheckResponse, CheckError> {
        let rules = collect_rules(rules);
        if rules.is_empty() {
            return Err(CheckError::NoRules);
        }
        self.run(data, rules).await
    }

    async fn run(&self, data: Vec<u8>, rules: Vec<Rule>) -> Result<CheckResponse, CheckError> {
        let start = Instant::now();
        let text = extract::extract_document_text(
            Arc::clone(&self.pdf),
            data,
            self.settings.min_text_chars,
        )
        .await?;

        let results = self.evaluate_all(&rules, Arc::from(text)).await;

        let passed = results
            .iter()
            .filter(|v| v.status == VerdictStatus::Pass)
            .count();
        tracing::info!(
            rules = results.len(),
            passed,
            failed = results.len() - passed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "check complete"
        );

        Ok(CheckResponse { results })
    }

    /// Evaluate each rule against `text` concurrently, bounded by
    /// `max_concurrent_evaluations`. The result at index `i` is always the
    /// verdict for `rules[i]`, whatever order the evaluations finish in.
    pub async fn evaluate_all(&self, rules: &[Rule], text: Arc<str>) -> Vec<RuleVerdict> {
        let total = rules.len();
        let permits = Arc::new(Semaphore::new(
            self.settings.max_concurrent_evaluations.max(1),
        ));
        let mut join_set = JoinSet::new();

        for (index, rule) in rules.iter().cloned().enumerate() {
            let evaluator = Arc::clone(&self.evaluator);
            let text = Arc::clone(&text);
            let permits = Arc::clone(&permits);

            // Events raised while judging this rule carry its index.
            let span = tracing::info_span!("rule", rule_index = index);
            join_set.spawn(
                async move {
                    // The semaphore is never closed, so this only waits.
                    let _permit = permits.acquire_owned().await.ok();
                    let verdict = evaluator.evaluate(&rule, &text).await;
                    (index, verdict)
                }
                .instrument(span),
            );
        }

        let mut results: Vec<Option<RuleVerdict>> = vec![None; total];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, verdict)) => {
                    tracing::debug!(
                        rule_index = index,
                        status = verdict.status.as_str(),
                        confidence = verdict.confidence,
                        "rule evaluated"
                    );
                    results[index] = Some(verdict);
                }
                Err(e) => {
                    tracing::error!(error = %e, "rule evaluation task failed");
                }
            }
        }

        results
            .into_iter()
            .zip(rules)
            .map(|(slot, rule)| {
                slot.unwrap_or_else(|| {
                    EvaluationFailure::Internal("evaluation task failed".into()).into_verdict(rule)
                })
            })
            .collect()
    }
}

/// Parse the rules field: it must be a JSON array of strings.
pub fn parse_rules(raw: Option<&str>) -> Result<Vec<String>, CheckError> {
    let raw = raw.ok_or_else(|| CheckError::MalformedRules("rules field is missing".into()))?;
    serde_json::from_str::<Vec<String>>(raw).map_err(|e| CheckError::MalformedRules(e.to_string()))
}

/// Trim every rule and drop the empty ones, keeping submission order.
pub fn collect_rules(raw: &[String]) -> Vec<Rule> {
    raw.iter().filter_map(|r| Rule::parse(r)).collect()
}
