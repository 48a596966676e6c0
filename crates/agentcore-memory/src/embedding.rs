//! Embedding provider selection and invocation.
//!
//! Mirrors the resolution order of the teacher's `EmbeddingConfig::from_env`:
//! explicit provider env var first, then a local deterministic provider for
//! tests, with OpenAI as the default cloud provider.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use agentcore_types::AgentCoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    OpenAi,
    Local,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub dimension: usize,
}

impl EmbeddingConfig {
    /// Resolution order (spec.md §6 / SPEC_FULL.md 4.B):
    /// 1. `EMBEDDINGS_PROVIDER` explicit ("openai" | "local")
    /// 2. API key: `EMBEDDING_API_KEY` → `OPENAI_API_KEY`
    /// 3. No explicit provider and no key resolves to `local`, so tests and
    ///    offline development never require network access.
    pub fn from_env() -> Self {
        let api_key = std::env::var("EMBEDDING_API_KEY")
            .ok()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty());

        let explicit = std::env::var("EMBEDDINGS_PROVIDER").ok();
        let provider = match explicit.as_deref() {
            Some("openai") => EmbeddingProviderKind::OpenAi,
            Some("local") => EmbeddingProviderKind::Local,
            _ if api_key.is_some() => EmbeddingProviderKind::OpenAi,
            _ => EmbeddingProviderKind::Local,
        };

        let dimension = match provider {
            EmbeddingProviderKind::OpenAi => 1536,
            EmbeddingProviderKind::Local => 256,
        };

        Self {
            provider,
            model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            api_key,
            dimension,
        }
    }
}

/// An embedding backend. Pre-call redaction of `text` is the caller's
/// responsibility (spec.md §6: "Pre-call redaction is mandatory").
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentCoreError>;

    fn dimension(&self) -> usize;
}

/// Cloud embedding calls are out of scope for this crate (spec.md §1: "LLM
/// provider internals" is an external collaborator's responsibility); this
/// type exists so the provider seam is real, and fails clearly rather than
/// silently degrading to the local hash provider if misconfigured.
pub struct OpenAiEmbeddingProvider {
    config: EmbeddingConfig,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, AgentCoreError> {
        if self.config.api_key.is_none() {
            return Err(AgentCoreError::EmbeddingUnavailable(
                "no API key configured for openai provider".to_string(),
            ));
        }
        Err(AgentCoreError::EmbeddingUnavailable(
            "openai embedding calls are delegated to an external provider collaborator"
                .to_string(),
        ))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

/// Deterministic hash-based embedding used for `EMBEDDINGS_PROVIDER=local`
/// and for the test environment. Not semantically meaningful, but stable:
/// identical input always yields identical output, so dedup and repeated
/// retrieval tests behave predictably without a network dependency.
pub struct LocalEmbeddingProvider {
    dimension: usize,
}

impl LocalEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentCoreError> {
        let mut out = Vec::with_capacity(self.dimension);
        let mut counter: u32 = 0;
        while out.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks_exact(4) {
                if out.len() == self.dimension {
                    break;
                }
                let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // Map into [-1.0, 1.0] so cosine similarity behaves sanely.
                out.push((bits as f32 / u32::MAX as f32) * 2.0 - 1.0);
            }
            counter += 1;
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub fn provider_from_config(config: &EmbeddingConfig) -> Box<dyn EmbeddingProvider> {
    match config.provider {
        EmbeddingProviderKind::OpenAi => Box::new(OpenAiEmbeddingProvider::new(config.clone())),
        EmbeddingProviderKind::Local => Box::new(LocalEmbeddingProvider::new(config.dimension)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_embedding_is_deterministic() {
        let p = LocalEmbeddingProvider::new(16);
        let a = p.embed("hello world").await.unwrap();
        let b = p.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[tokio::test]
    async fn local_embedding_differs_by_input() {
        let p = LocalEmbeddingProvider::new(16);
        let a = p.embed("hello").await.unwrap();
        let b = p.embed("goodbye").await.unwrap();
        assert_ne!(a, b);
    }
}
