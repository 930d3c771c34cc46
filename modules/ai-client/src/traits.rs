use async_trait::async_trait;

use crate::error::Result;

/// Generation parameters common to every provider.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerateOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.2,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Provider-agnostic single-shot text generation.
///
/// Implementations own transport, auth, and retry; callers treat failures
/// as a single opaque category and decide for themselves whether to retry.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<String>;

    /// Cheap connectivity probe; does not consume a generation budget.
    async fn is_available(&self) -> bool;
}
