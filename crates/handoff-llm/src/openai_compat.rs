//! OpenAI-compatible generator implementation.
//!
//! [`OpenAiCompatGenerator`] works with any API that follows the OpenAI
//! chat completion format. The prompt and system instructions map to a
//! two-message conversation; the idempotency nonce is forwarded as an
//! `Idempotency-Key` header so retried calls cannot double-bill.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GeneratorError, Result};
use crate::generator::Generator;
use crate::types::{GenerateRequest, GenerateResponse};

/// Configuration for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Endpoint base URL (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Default per-call deadline when the request carries none.
    pub default_deadline: Duration,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "HANDOFF_GENERATOR_API_KEY".into(),
            model: "gpt-4o-mini".into(),
            default_deadline: Duration::from_secs(20),
        }
    }
}

/// A generator that uses the OpenAI-compatible chat completion API.
///
/// # Construction
///
/// ```rust,ignore
/// use handoff_llm::{OpenAiCompatGenerator, OpenAiCompatConfig};
///
/// let generator = OpenAiCompatGenerator::new(OpenAiCompatConfig {
///     base_url: "https://api.openai.com/v1".into(),
///     ..OpenAiCompatConfig::default()
/// });
/// ```
pub struct OpenAiCompatGenerator {
    config: OpenAiCompatConfig,
    http: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    total_tokens: u64,
}

impl OpenAiCompatGenerator {
    /// Create a new generator from configuration.
    ///
    /// The API key is resolved from `config.api_key_env` at request time.
    pub fn new(config: OpenAiCompatConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            api_key: None,
        }
    }

    /// Create a new generator with an explicit API key, bypassing the
    /// environment lookup.
    pub fn with_api_key(config: OpenAiCompatConfig, api_key: String) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            api_key: Some(api_key),
        }
    }

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.config.api_key_env).map_err(|_| {
            GeneratorError::NotConfigured(format!("set {} env var", self.config.api_key_env))
        })
    }
}

#[async_trait]
impl Generator for OpenAiCompatGenerator {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let api_key = self.resolve_api_key()?;
        let url = self.completions_url();
        let deadline = request.deadline.unwrap_or(self.config.default_deadline);

        let wire = WireRequest {
            model: &self.config.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: &request.system,
                },
                WireMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(
            model = %self.config.model,
            nonce = %request.nonce,
            "sending generation request"
        );

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .header("Idempotency-Key", request.nonce.to_string())
            .timeout(deadline)
            .json(&wire)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeneratorError::Timeout
                } else {
                    GeneratorError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                let retry_ms = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|secs| secs * 1000)
                    .unwrap_or(1000);
                warn!(retry_after_ms = retry_ms, "generator rate limited");
                return Err(GeneratorError::RateLimited {
                    retry_after_ms: retry_ms,
                });
            }

            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(GeneratorError::AuthFailed(body));
            }
            return Err(GeneratorError::RequestFailed(format!(
                "HTTP {status}: {body}"
            )));
        }

        let wire_response: WireResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::InvalidResponse(format!("failed to parse: {e}")))?;

        let text = wire_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| GeneratorError::InvalidResponse("no choices in response".into()))?;

        Ok(GenerateResponse {
            text,
            tokens_used: wire_response.usage.map(|u| u.total_tokens).unwrap_or(0),
            model_confidence: None,
        })
    }
}
