//! The core [`Generator`] trait for text generation calls.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{GenerateRequest, GenerateResponse};

/// A collaborator that can execute generation requests.
///
/// Implementations handle protocol details for a specific backend. The
/// main implementation is
/// [`OpenAiCompatGenerator`](crate::openai_compat::OpenAiCompatGenerator);
/// [`CannedGenerator`](crate::canned::CannedGenerator) is the deterministic
/// fallback when no endpoint is configured.
///
/// # Example
///
/// ```rust,ignore
/// use handoff_llm::{Generator, GenerateRequest};
///
/// async fn respond(generator: &dyn Generator) -> handoff_llm::Result<String> {
///     let request = GenerateRequest::new("What is my balance?", "Be concise.");
///     let response = generator.generate(&request).await?;
///     Ok(response.text)
/// }
/// ```
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the generator name (e.g. "openai-compat", "canned").
    fn name(&self) -> &str;

    /// Execute a generation request and return the response.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError`](crate::error::GeneratorError) on network,
    /// authentication, rate-limit, or parse failures; callers consult
    /// `is_transient()` to decide on retries.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;
}
