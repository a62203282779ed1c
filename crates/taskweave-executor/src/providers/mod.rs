/// OpenAI-compatible HTTP provider.
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskweave_core::{TaskweaveResult, Usage};

/// One completion request handed to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System prompt for the executor's role.
    pub system_prompt: Option<String>,
    /// The user-side input text.
    pub input: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: u32,
}

/// A completed provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text.
    pub text: String,
    /// Token accounting reported by the provider.
    pub usage: Usage,
}

/// Trait for external text-completion providers.
///
/// The execution core is provider-agnostic: the HTTP backend in
/// [`openai`] is one implementation, and tests substitute mocks. To add a
/// provider, implement this trait and wire it into
/// [`crate::ResilientExecutor::with_providers`].
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Perform one completion call.
    async fn complete(&self, request: &CompletionRequest) -> TaskweaveResult<Completion>;
}
