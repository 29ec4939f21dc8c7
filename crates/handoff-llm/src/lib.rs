//! Generator collaborator abstraction for the handoff orchestrator.
//!
//! The pipeline talks to text generation through the [`Generator`] trait:
//! one `generate` call taking a prompt, system instructions, an
//! idempotency nonce, and a deadline, returning text plus token usage.
//!
//! Around that seam this crate provides:
//!
//! - [`retry::RetryPolicy`] -- exponential-backoff retry of transient
//!   failures, rate-limit aware.
//! - [`limiter::RateLimited`] -- per-collaborator concurrency cap plus a
//!   token-bucket request rate limit.
//! - [`openai_compat::OpenAiCompatGenerator`] -- a concrete adapter for
//!   any OpenAI-compatible chat-completions endpoint.
//! - [`canned::CannedGenerator`] -- a deterministic rule-based generator
//!   used as the unconfigured fallback and in tests.

pub mod canned;
pub mod error;
pub mod generator;
pub mod limiter;
pub mod openai_compat;
pub mod retry;
pub mod types;

pub use canned::CannedGenerator;
pub use error::{GeneratorError, Result};
pub use generator::Generator;
pub use limiter::{LimitConfig, RateLimited};
pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatGenerator};
pub use retry::{RetryConfig, RetryPolicy};
pub use types::{GenerateRequest, GenerateResponse};
