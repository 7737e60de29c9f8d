//! Embedding model contract and the built-in hashing provider.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{BackendResult, ConfigResult, ConfigurationError};
use crate::model::ModelConfig;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Length of every vector returned by `embed`.
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> BackendResult<Vec<f32>>;
}

/// Builds an embedding model from a validated model configuration.
pub type EmbeddingFactory =
    Arc<dyn Fn(&ModelConfig) -> ConfigResult<Arc<dyn EmbeddingModel>> + Send + Sync>;

/// Provider name of [`HashingEmbedder`].
pub const HASHING_PROVIDER: &str = "hashing";

/// Dimensions used by [`HashingEmbedder`] when the config does not set any.
pub const DEFAULT_HASHING_DIMENSIONS: usize = 256;

/// Byte-frequency embedder.
///
/// Each byte of the input increments bucket `byte % dimensions`; the vector
/// is then L2-normalised. Texts sharing vocabulary land close together under
/// cosine similarity, which is enough for local search and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for byte in text.to_lowercase().bytes() {
            vector[byte as usize % self.dimensions] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    /// Factory registered under [`HASHING_PROVIDER`].
    pub fn factory() -> EmbeddingFactory {
        Arc::new(|config: &ModelConfig| {
            let dimensions = config.dimensions.unwrap_or(DEFAULT_HASHING_DIMENSIONS);
            if dimensions == 0 {
                return Err(ConfigurationError::invalid_value(
                    "hashing embedder",
                    "dimensions must be greater than zero",
                ));
            }
            Ok(Arc::new(HashingEmbedder::new(dimensions)) as Arc<dyn EmbeddingModel>)
        })
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingModel for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> BackendResult<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}
