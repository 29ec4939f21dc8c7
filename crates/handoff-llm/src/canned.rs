//! Deterministic rule-based generator.
//!
//! [`CannedGenerator`] is the fallback when no endpoint is configured and
//! the workhorse of stage tests. It answers from a fixed-phrase table
//! keyed by substring match, or with a generic service response, and
//! reports a token count derived from the output length. It never fails
//! unless scripted to.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::generator::Generator;
use crate::types::{GenerateRequest, GenerateResponse};

/// A deterministic generator with optional scripted failures.
pub struct CannedGenerator {
    /// `(substring, response)` pairs checked in order against the prompt.
    rules: Vec<(String, String)>,
    /// Responses to pop before consulting the rules; used to script exact
    /// sequences in tests.
    scripted: Mutex<Vec<Result<GenerateResponse>>>,
}

impl CannedGenerator {
    /// Create a generator with the default service phrasing.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            scripted: Mutex::new(Vec::new()),
        }
    }

    /// Add a substring-triggered canned response.
    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    /// Queue an exact result to return before rule matching applies.
    /// Results are returned in the order they were pushed.
    pub fn push_scripted(&self, result: Result<GenerateResponse>) {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(result);
    }

    /// A plain-text response sized from its content.
    pub fn response(text: impl Into<String>) -> GenerateResponse {
        let text = text.into();
        let tokens_used = (text.split_whitespace().count() as u64).max(1);
        GenerateResponse {
            text,
            tokens_used,
            model_confidence: None,
        }
    }

    fn fallback(&self, request: &GenerateRequest) -> GenerateResponse {
        let text = format!(
            "Thanks for reaching out. Here is what I can tell you: I've looked \
             into your question ({} words) and summarized the relevant account \
             guidance. If anything is unclear, I can connect you with a \
             specialist.",
            request.prompt.split_whitespace().count()
        );
        Self::response(text)
    }
}

impl Default for CannedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for CannedGenerator {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        {
            let mut scripted = self.scripted.lock().unwrap_or_else(|e| e.into_inner());
            if !scripted.is_empty() {
                return scripted.remove(0);
            }
        }

        for (needle, response) in &self.rules {
            if request.prompt.contains(needle.as_str()) {
                return Ok(Self::response(response.clone()));
            }
        }
        Ok(self.fallback(request))
    }
}
