//! End-to-end tests for [`Checker`] with a stub PDF backend and [`MockLlm`].
//!
//! No test here touches the network or a real PDF library.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rulecheck_core::evaluator::{
    API_FAILURE_EVIDENCE, INTERNAL_FAILURE_EVIDENCE, INTERNAL_FAILURE_REASONING,
    MALFORMED_OUTPUT_EVIDENCE, MALFORMED_OUTPUT_REASONING,
};
use rulecheck_core::llm::mock::{MockLlm, MockResponse};
use rulecheck_core::{
    BackendError, CheckError, CheckInput, Checker, CheckerSettings, EvaluatorSettings, PdfBackend,
    RuleEvaluator, Upload, VerdictStatus,
};
use serde_json::json;

const DOCUMENT: &str = "Statement of work between Acme Corp and Globex. \
Submitted on March 3rd, 2024. Signed by both parties on the final page.";

/// Returns fixed text (or a fixed error) regardless of input, counting calls.
struct StubPdf {
    text: Option<&'static str>,
    calls: AtomicUsize,
}

impl StubPdf {
    fn with_text(text: &'static str) -> Self {
        Self {
            text: Some(text),
            calls: AtomicUsize::new(0),
        }
    }

    fn broken() -> Self {
        Self {
            text: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PdfBackend for StubPdf {
    fn name(&self) -> &str {
        "stub"
    }

    fn extract_text(&self, _data: &[u8]) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.text {
            Some(t) => Ok(t.to_string()),
            None => Err(BackendError::ExtractionError("corrupt xref table".into())),
        }
    }
}

fn checker(pdf: Arc<StubPdf>, llm: Arc<MockLlm>, max_concurrent: usize) -> Checker {
    let evaluator = Arc::new(RuleEvaluator::new(llm, EvaluatorSettings::default()));
    Checker::new(
        pdf,
        evaluator,
        CheckerSettings {
            min_text_chars: 50,
            max_concurrent_evaluations: max_concurrent,
        },
    )
}

fn pdf_upload() -> Upload {
    Upload {
        filename: "sow.pdf".into(),
        content_type: Some("application/pdf".into()),
        data: b"%PDF-1.7 stub".to_vec(),
    }
}

fn input(rules: &str, file: Option<Upload>) -> CheckInput {
    CheckInput {
        rules: Some(rules.to_string()),
        file,
    }
}

fn pass_reply() -> MockResponse {
    MockResponse::json(json!({
        "status": "pass",
        "evidence": "March 3rd, 2024",
        "reasoning": "Date present.",
        "confidence": 95
    }))
}

#[tokio::test]
async fn one_verdict_per_non_empty_rule_in_order() {
    let pdf = Arc::new(StubPdf::with_text(DOCUMENT));
    let llm = Arc::new(MockLlm::new(pass_reply()));
    let checker = checker(pdf.clone(), llm.clone(), 4);

    let response = checker
        .check(input(
            r#"["  Must mention a date. ", "", "   ", "Must be signed", "Must name Acme"]"#,
            Some(pdf_upload()),
        ))
        .await
        .unwrap();

    let rules: Vec<&str> = response.results.iter().map(|v| v.rule.as_str()).collect();
    assert_eq!(rules, vec!["Must mention a date.", "Must be signed", "Must name Acme"]);
    assert_eq!(llm.call_count(), 3);
    // Extraction happens once per request, not once per rule
    assert_eq!(pdf.calls(), 1);
}

#[tokio::test]
async fn date_rule_verdict_matches_model_output() {
    let pdf = Arc::new(StubPdf::with_text(DOCUMENT));
    let llm = Arc::new(MockLlm::new(pass_reply()));
    let checker = checker(pdf, llm, 4);

    let response = checker
        .check(input(r#"["Document must mention a date."]"#, Some(pdf_upload())))
        .await
        .unwrap();

    let v = &response.results[0];
    assert_eq!(v.rule, "Document must mention a date.");
    assert_eq!(v.status, VerdictStatus::Pass);
    assert_eq!(v.evidence, "March 3rd, 2024");
    assert_eq!(v.reasoning, "Date present.");
    assert_eq!(v.confidence, 95);
}

#[tokio::test]
async fn malformed_rules_win_over_every_other_problem() {
    let pdf = Arc::new(StubPdf::with_text(DOCUMENT));
    let llm = Arc::new(MockLlm::new(pass_reply()));
    let checker = checker(pdf.clone(), llm.clone(), 4);

    // No file and bad JSON: the rules problem is reported
    let err = checker.check(input("[not json", None)).await.unwrap_err();
    assert!(matches!(err, CheckError::MalformedRules(_)));

    let err = checker
        .check(CheckInput {
            rules: None,
            file: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CheckError::MalformedRules(_)));

    assert_eq!(pdf.calls(), 0);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn missing_file_then_wrong_type_then_no_rules() {
    let pdf = Arc::new(StubPdf::with_text(DOCUMENT));
    let llm = Arc::new(MockLlm::new(pass_reply()));
    let checker = checker(pdf.clone(), llm.clone(), 4);

    let err = checker.check(input(r#"[]"#, None)).await.unwrap_err();
    assert!(matches!(err, CheckError::MissingFile));

    let text_file = Upload {
        filename: "notes.txt".into(),
        content_type: Some("text/plain".into()),
        data: b"hello".to_vec(),
    };
    let err = checker
        .check(input(r#"[]"#, Some(text_file)))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckError::UnsupportedFileType(_)));

    let err = checker
        .check(input(r#"["", "  \t "]"#, Some(pdf_upload())))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckError::NoRules));

    assert_eq!(pdf.calls(), 0);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn non_pdf_rejected_regardless_of_rules() {
    let checker = checker(
        Arc::new(StubPdf::with_text(DOCUMENT)),
        Arc::new(MockLlm::new(pass_reply())),
        4,
    );
    for rules in [r#"["a"]"#, r#"["a", "b", "c"]"#, r#"[""]"#] {
        let file = Upload {
            filename: "scan.png".into(),
            content_type: Some("image/png".into()),
            data: vec![0x89, b'P', b'N', b'G'],
        };
        let err = checker.check(input(rules, Some(file))).await.unwrap_err();
        assert!(matches!(err, CheckError::UnsupportedFileType(_)));
    }
}

#[tokio::test]
async fn short_document_is_insufficient_content() {
    let pdf = Arc::new(StubPdf::with_text("Invoice #42"));
    let llm = Arc::new(MockLlm::new(pass_reply()));
    let checker = checker(pdf, llm.clone(), 4);

    let err = checker
        .check(input(r#"["Must have a total"]"#, Some(pdf_upload())))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckError::InsufficientContent { .. }));
    assert!(err.is_client_error());
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn unreadable_pdf_is_extraction_failure() {
    let llm = Arc::new(MockLlm::new(pass_reply()));
    let checker = checker(Arc::new(StubPdf::broken()), llm.clone(), 4);

    let err = checker
        .check(input(r#"["Must have a total"]"#, Some(pdf_upload())))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckError::ExtractionFailed(_)));
    assert!(!err.is_client_error());
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn one_failing_rule_does_not_affect_siblings() {
    let llm = Arc::new(
        MockLlm::new(pass_reply())
            .route("Must be signed", MockResponse::Status(503))
            .route("Must be notarized", MockResponse::Reply("{not json".into())),
    );
    let checker = checker(Arc::new(StubPdf::with_text(DOCUMENT)), llm, 4);

    let response = checker
        .check(input(
            r#"["Must mention a date.", "Must be signed", "Must be notarized"]"#,
            Some(pdf_upload()),
        ))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 3);

    let ok = &response.results[0];
    assert_eq!(ok.status, VerdictStatus::Pass);
    assert_eq!(ok.confidence, 95);

    let api = &response.results[1];
    assert_eq!(api.rule, "Must be signed");
    assert_eq!(api.status, VerdictStatus::Fail);
    assert_eq!(api.confidence, 0);
    assert_eq!(api.evidence, API_FAILURE_EVIDENCE);

    let malformed = &response.results[2];
    assert_eq!(malformed.rule, "Must be notarized");
    assert_eq!(malformed.status, VerdictStatus::Fail);
    assert_eq!(malformed.confidence, 0);
    assert_eq!(malformed.evidence, MALFORMED_OUTPUT_EVIDENCE);
    assert_eq!(malformed.reasoning, MALFORMED_OUTPUT_REASONING);

    assert_ne!(api.evidence, malformed.evidence);
    assert_ne!(api.reasoning, malformed.reasoning);
}

#[tokio::test]
async fn identical_requests_give_identical_results() {
    let llm = Arc::new(
        MockLlm::new(pass_reply()).route(
            "Must be signed",
            MockResponse::json(json!({"status": "fail", "confidence": 40})),
        ),
    );
    let checker = checker(Arc::new(StubPdf::with_text(DOCUMENT)), llm, 4);
    let rules = r#"["Must mention a date.", "Must be signed"]"#;

    let first = checker
        .check(input(rules, Some(pdf_upload())))
        .await
        .unwrap();
    let second = checker
        .check(input(rules, Some(pdf_upload())))
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn order_is_preserved_when_later_rules_finish_first() {
    // The first rule is by far the slowest, so completion order is the
    // reverse of submission order for it.
    let llm = Arc::new(
        MockLlm::new(pass_reply())
            .with_delay(Duration::from_millis(10))
            .route_with_delay(
                "Rule number 0",
                MockResponse::json(json!({"status": "fail", "confidence": 30})),
                Duration::from_millis(500),
            )
            .route_with_delay(
                "Rule number 1",
                MockResponse::json(json!({"status": "pass", "confidence": 61})),
                Duration::from_millis(200),
            ),
    );
    let checker = checker(Arc::new(StubPdf::with_text(DOCUMENT)), llm, 8);

    let rules: Vec<String> = (0..5).map(|i| format!("Rule number {i}")).collect();
    let response = checker
        .check_rules(b"%PDF".to_vec(), &rules)
        .await
        .unwrap();

    let got: Vec<&str> = response.results.iter().map(|v| v.rule.as_str()).collect();
    let want: Vec<&str> = rules.iter().map(String::as_str).collect();
    assert_eq!(got, want);

    // Each verdict sits next to its own rule, not where it finished.
    assert_eq!(response.results[0].status, VerdictStatus::Fail);
    assert_eq!(response.results[0].confidence, 30);
    assert_eq!(response.results[1].confidence, 61);
    for v in &response.results[2..] {
        assert_eq!(v.status, VerdictStatus::Pass);
        assert_eq!(v.confidence, 95);
    }
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_bounded() {
    let llm = Arc::new(MockLlm::new(pass_reply()).with_delay(Duration::from_millis(100)));
    let checker = checker(Arc::new(StubPdf::with_text(DOCUMENT)), llm.clone(), 2);

    let rules: Vec<String> = (0..6).map(|i| format!("Rule {i}")).collect();
    let response = checker
        .check_rules(b"%PDF".to_vec(), &rules)
        .await
        .unwrap();

    assert_eq!(response.results.len(), 6);
    assert_eq!(llm.call_count(), 6);
    assert!(llm.max_in_flight() <= 2);
    assert!(llm.max_in_flight() >= 1);
}

#[tokio::test]
async fn check_rules_rejects_all_blank() {
    let checker = checker(
        Arc::new(StubPdf::with_text(DOCUMENT)),
        Arc::new(MockLlm::new(pass_reply())),
        4,
    );
    let err = checker
        .check_rules(b"%PDF".to_vec(), &[" ".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, CheckError::NoRules));
}

#[tokio::test]
async fn panicking_evaluation_degrades_only_its_rule() {
    let llm = Arc::new(MockLlm::new(pass_reply()).route("Must be signed", MockResponse::Panic));
    let checker = checker(Arc::new(StubPdf::with_text(DOCUMENT)), llm, 4);

    let response = checker
        .check(input(
            r#"["Must mention a date.", "Must be signed", "Must name Acme"]"#,
            Some(pdf_upload()),
        ))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 3);
    let broken = &response.results[1];
    assert_eq!(broken.rule, "Must be signed");
    assert_eq!(broken.status, VerdictStatus::Fail);
    assert_eq!(broken.confidence, 0);
    assert_eq!(broken.evidence, INTERNAL_FAILURE_EVIDENCE);
    assert_eq!(broken.reasoning, INTERNAL_FAILURE_REASONING);
    assert_ne!(broken.evidence, API_FAILURE_EVIDENCE);
    assert_ne!(broken.evidence, MALFORMED_OUTPUT_EVIDENCE);

    for i in [0, 2] {
        assert_eq!(response.results[i].status, VerdictStatus::Pass);
        assert_eq!(response.results[i].confidence, 95);
    }
}

/// In-memory log sink for a `fmt` subscriber.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test]
async fn degraded_verdict_warnings_carry_rule_index() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    // The current-thread test runtime polls every spawned task on this thread.
    let _guard = tracing::subscriber::set_default(subscriber);

    let llm = Arc::new(
        MockLlm::new(pass_reply()).route("Must be signed", MockResponse::Reply("nope".into())),
    );
    let checker = checker(Arc::new(StubPdf::with_text(DOCUMENT)), llm, 4);
    checker
        .check(input(
            r#"["Must mention a date.", "Must be signed"]"#,
            Some(pdf_upload()),
        ))
        .await
        .unwrap();

    let out = logs.contents();
    let warning = out
        .lines()
        .find(|l| l.contains("rule evaluation degraded"))
        .expect("a warning for the malformed reply");
    assert!(warning.contains("rule_index=1"), "{warning}");
    assert!(warning.contains("malformed_output"), "{warning}");
    assert!(!out.contains("rule_index=0"));
}
