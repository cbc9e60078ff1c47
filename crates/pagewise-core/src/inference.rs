//! Generative inference provider trait.
//!
//! The enricher (figure interpretation fallback) and the answering step both
//! reach a language model through [`InferenceProvider`]. Concrete providers
//! (OpenAI, Ollama, disabled) live in the `pagewise` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// A single-turn prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Trait for generative inference backends.
///
/// Calls are issued one at a time by the pipelines and are never retried;
/// an error is reported to the caller as-is.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider identifier used in logs (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Run the prompt and return the model's raw text.
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}
