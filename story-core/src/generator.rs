//! The generative text service seam.

use async_trait::async_trait;
use ollama::{GenerateRequest, Ollama};
use std::sync::Arc;
use thiserror::Error;

/// Errors from a generation call.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Ollama error: {0}")]
    Ollama(#[from] ollama::Error),

    #[error("Generator returned an empty response")]
    EmptyResponse,

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

/// Anything that can turn a prompt into text.
///
/// A call is a single attempt. Retrying and backoff belong to the caller.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError>;
}

#[async_trait]
impl TextGenerator for Ollama {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError> {
        let request = GenerateRequest::new(prompt).with_model(model);
        let response = Ollama::generate(self, request).await?;
        Ok(response.text)
    }
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError> {
        (**self).generate(model, prompt).await
    }
}

/// Generate and reject responses that are blank after trimming.
///
/// The returned text is trimmed.
pub async fn generate_trimmed<G: TextGenerator + ?Sized>(
    generator: &G,
    model: &str,
    prompt: &str,
) -> Result<String, GenerateError> {
    let text = generator.generate(model, prompt).await?;
    let text = text.trim();
    if text.is_empty() {
        return Err(GenerateError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[tokio::test]
    async fn test_generate_trimmed_strips_whitespace() {
        let generator = ScriptedGenerator::new(["  The door creaked.\n"]);
        let text = generate_trimmed(&generator, "llama3", "go").await.unwrap();
        assert_eq!(text, "The door creaked.");
    }

    #[tokio::test]
    async fn test_generate_trimmed_rejects_blank() {
        let generator = ScriptedGenerator::new([" \n\t "]);
        let err = generate_trimmed(&generator, "llama3", "go").await.unwrap_err();
        assert!(matches!(err, GenerateError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_arc_forwards() {
        let generator = Arc::new(ScriptedGenerator::new(["shared"]));
        let text = TextGenerator::generate(&generator, "m", "p").await.unwrap();
        assert_eq!(text, "shared");
        assert_eq!(generator.call_count(), 1);
    }

    #[test]
    fn test_ollama_error_converts() {
        let err: GenerateError = ollama::Error::Network("connection refused".into()).into();
        assert!(err.to_string().contains("connection refused"));
    }
}
