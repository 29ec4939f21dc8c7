//! Request and response types for generator calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single generation request.
///
/// The `nonce` makes retries idempotent: adapters forward it as an
/// idempotency key so a retried call cannot double-bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The user-facing prompt body.
    pub prompt: String,

    /// System instructions framing the generation.
    pub system: String,

    /// Caller-supplied idempotency nonce, stable across retries.
    pub nonce: Uuid,

    /// Cap on generated tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Per-call deadline. Adapters must not exceed it.
    #[serde(skip)]
    pub deadline: Option<Duration>,
}

impl GenerateRequest {
    /// Create a request with a fresh nonce and no caps.
    pub fn new(prompt: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: system.into(),
            nonce: Uuid::new_v4(),
            max_tokens: None,
            temperature: None,
            deadline: None,
        }
    }

    /// Set the token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the per-call deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// A completed generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateResponse {
    /// The generated text.
    pub text: String,

    /// Tokens consumed by the call (prompt + completion).
    pub tokens_used: u64,

    /// Self-reported model confidence in `0.0..=1.0`, when the
    /// collaborator provides one.
    pub model_confidence: Option<f64>,
}
