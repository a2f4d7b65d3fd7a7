//! Mock model backend for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{CompletionRequest, LlmBackend, LlmError};

/// A configurable mock response for [`MockLlm`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Reply with this exact text.
    Reply(String),
    /// Simulate an HTTP error status from the service.
    Status(u16),
    /// Simulate a request timeout.
    Timeout,
    /// Simulate a missing API key.
    MissingApiKey,
    /// Panic inside the call, as a buggy backend would.
    Panic,
}

impl MockResponse {
    /// Reply with `value` serialized as JSON.
    pub fn json(value: serde_json::Value) -> Self {
        MockResponse::Reply(value.to_string())
    }
}

struct Route {
    needle: String,
    response: MockResponse,
    /// Overrides the mock-wide delay for matching calls.
    delay: Option<Duration>,
}

/// A hand-rolled mock implementing [`LlmBackend`] for tests.
///
/// Supports:
/// - A fixed response (used for every call), **or**
/// - A sequence of responses (one per call, repeating the last if exhausted).
/// - Routes: a response chosen when the user message contains a substring.
/// - Optional per-call latency, globally or per route.
/// - Call counting and peak in-flight tracking.
pub struct MockLlm {
    name: &'static str,
    /// If non-empty, each call pops the next response.
    responses: Mutex<Vec<MockResponse>>,
    /// Checked before the sequence; first matching substring wins.
    routes: Vec<Route>,
    /// Fallback when the sequence is empty (or single-response mode).
    fallback: MockResponse,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlm {
    /// Create a mock that always returns `response`.
    pub fn new(response: MockResponse) -> Self {
        Self {
            name: "mock",
            responses: Mutex::new(Vec::new()),
            routes: Vec::new(),
            fallback: response,
            delay: None,
            call_count: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that returns responses in call order, repeating the last one.
    pub fn with_sequence(mut responses: Vec<MockResponse>) -> Self {
        let fallback = responses
            .last()
            .cloned()
            .unwrap_or(MockResponse::Status(500));
        // Reverse so we can pop() from the front cheaply.
        responses.reverse();
        let mock = Self::new(fallback);
        *mock.responses.lock().unwrap_or_else(|e| e.into_inner()) = responses;
        mock
    }

    /// Answer with `response` whenever the user message contains `needle`.
    pub fn route(mut self, needle: impl Into<String>, response: MockResponse) -> Self {
        self.routes.push(Route {
            needle: needle.into(),
            response,
            delay: None,
        });
        self
    }

    /// Like [`MockLlm::route`], but matching calls take `delay` to answer.
    pub fn route_with_delay(
        mut self,
        needle: impl Into<String>,
        response: MockResponse,
        delay: Duration,
    ) -> Self {
        self.routes.push(Route {
            needle: needle.into(),
            response,
            delay: Some(delay),
        });
        self
    }

    /// Set simulated network latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `complete()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_response(&self, request: &CompletionRequest) -> (MockResponse, Option<Duration>) {
        if let Some(route) = self
            .routes
            .iter()
            .find(|r| request.user.contains(r.needle.as_str()))
        {
            return (route.response.clone(), route.delay.or(self.delay));
        }
        let mut seq = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        let response = seq.pop().unwrap_or_else(|| self.fallback.clone());
        (response, self.delay)
    }
}

impl LlmBackend for MockLlm {
    fn name(&self) -> &str {
        self.name
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        let (response, delay) = self.next_response(request);

        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match response {
                MockResponse::Reply(text) => Ok(text),
                MockResponse::Status(status) => Err(LlmError::Status {
                    status,
                    message: "mock failure".to_string(),
                }),
                MockResponse::Timeout => Err(LlmError::Timeout),
                MockResponse::MissingApiKey => Err(LlmError::MissingApiKey),
                MockResponse::Panic => panic!("mock backend panicked"),
            }
        })
    }
}
