/// Language model provider abstraction
///
/// The recommendation pipeline talks to the model server only through
/// [`LanguageModel`], so the HTTP layer and the pipeline can be exercised
/// against scripted models in tests.
use crate::error::AppResult;

pub mod ollama;

pub use ollama::{OllamaClient, OllamaOptions};

/// Parameters of a single generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Lifecycle of the local model server as seen by this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Not probed yet, or reset after a lost connection
    Unstarted,
    /// A launch is in progress
    Starting,
    Ready,
    /// Last attempt failed; the next `ensure_ready` tries again
    Failed { reason: String },
}

/// Result of a non-intrusive health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelHealth {
    pub endpoint_reachable: bool,
    pub model_available: bool,
}

/// Trait for language model providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Makes sure the inference endpoint answers, launching the server if allowed.
    ///
    /// Concurrent callers share one launch attempt.
    async fn ensure_ready(&self) -> AppResult<()>;

    /// Sends one prompt and returns the raw generated text. Never retried.
    async fn generate(&self, request: &GenerationRequest) -> AppResult<String>;

    /// Probes the endpoint without launching anything. Never fails.
    async fn health(&self, model_name: &str) -> ModelHealth;

    fn readiness(&self) -> Readiness;

    /// Stops a server process launched by this provider, if any
    async fn shutdown(&self);

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
