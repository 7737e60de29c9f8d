//! Model registry.
//!
//! Holds initialized handles to named models. Embedding models are resolved
//! against registered provider factories at registration time so that a bad
//! provider name fails startup instead of the first search.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::embedding::{EmbeddingFactory, EmbeddingModel, HASHING_PROVIDER, HashingEmbedder};
use crate::error::{ConfigResult, ConfigurationError, NotFound, ResourceKind};
use crate::identifiers::ModelName;

/// What a model is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Embedding,
    Generative,
    Multimodal,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Embedding => "embedding",
            Self::Generative => "generative",
            Self::Multimodal => "multimodal",
        };
        f.write_str(kind)
    }
}

/// Configuration of a single model.
///
/// Required fields depend on `kind`:
/// - embedding: `provider`
/// - generative: `model_id`
/// - multimodal: `model_id` and at least one entry in `modalities`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub kind: ModelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modalities: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl ModelConfig {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            provider: None,
            model_id: None,
            dimensions: None,
            endpoint: None,
            modalities: Vec::new(),
            parameters: serde_json::Map::new(),
        }
    }

    /// Embedding config backed by the built-in hashing provider.
    pub fn hashing_embedding(dimensions: usize) -> Self {
        Self {
            provider: Some(HASHING_PROVIDER.to_string()),
            dimensions: Some(dimensions),
            ..Self::new(ModelKind::Embedding)
        }
    }

    /// Generative config pointing at an upstream model identifier.
    pub fn generative(model_id: impl Into<String>) -> Self {
        Self {
            model_id: Some(model_id.into()),
            ..Self::new(ModelKind::Generative)
        }
    }

    /// Check that every field required by `kind` is present.
    pub fn validate(&self, name: &str) -> ConfigResult<()> {
        let subject = format!("model '{name}'");
        let present = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());

        match self.kind {
            ModelKind::Embedding => {
                if !present(&self.provider) {
                    return Err(ConfigurationError::missing_field(subject, "provider"));
                }
                if self.dimensions == Some(0) {
                    return Err(ConfigurationError::invalid_value(
                        subject,
                        "dimensions must be greater than zero",
                    ));
                }
            }
            ModelKind::Generative => {
                if !present(&self.model_id) {
                    return Err(ConfigurationError::missing_field(subject, "model_id"));
                }
            }
            ModelKind::Multimodal => {
                if !present(&self.model_id) {
                    return Err(ConfigurationError::missing_field(subject, "model_id"));
                }
                if self.modalities.is_empty() {
                    return Err(ConfigurationError::missing_field(subject, "modalities"));
                }
            }
        }
        Ok(())
    }
}

/// A model as listed in the runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub config: ModelConfig,
}

/// Lifecycle state of a model handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Ready,
    Released,
}

/// An initialized model.
pub struct ModelHandle {
    name: ModelName,
    config: ModelConfig,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    released: AtomicBool,
}

impl ModelHandle {
    pub fn name(&self) -> &ModelName {
        &self.name
    }

    pub fn kind(&self) -> ModelKind {
        self.config.kind
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn status(&self) -> ModelStatus {
        if self.released.load(Ordering::Acquire) {
            ModelStatus::Released
        } else {
            ModelStatus::Ready
        }
    }

    /// The embedding model behind this handle.
    pub fn embedding_model(&self) -> ConfigResult<Arc<dyn EmbeddingModel>> {
        self.embedder
            .clone()
            .ok_or_else(|| ConfigurationError::WrongModelKind {
                model: self.name.to_string(),
                expected: ModelKind::Embedding,
                actual: self.config.kind,
            })
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("kind", &self.config.kind)
            .field("status", &self.status())
            .finish()
    }
}

/// Registry of named models.
pub struct ModelRegistry {
    models: RwLock<HashMap<String, Arc<ModelHandle>>>,
    providers: RwLock<HashMap<String, EmbeddingFactory>>,
}

impl ModelRegistry {
    /// Create a registry with the built-in `hashing` embedding provider.
    pub fn new() -> Self {
        let mut providers: HashMap<String, EmbeddingFactory> = HashMap::new();
        providers.insert(HASHING_PROVIDER.to_string(), HashingEmbedder::factory());
        Self {
            models: RwLock::new(HashMap::new()),
            providers: RwLock::new(providers),
        }
    }

    /// Make an embedding provider available to later registrations.
    pub fn register_provider(&self, name: impl Into<String>, factory: EmbeddingFactory) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Validate `config` and create a handle for it.
    pub fn register_model(&self, name: &str, config: ModelConfig) -> ConfigResult<Arc<ModelHandle>> {
        let model_name =
            ModelName::parse(name).map_err(|source| ConfigurationError::InvalidIdentifier {
                name: name.to_string(),
                source,
            })?;
        config.validate(name)?;

        let embedder = match config.kind {
            ModelKind::Embedding => {
                let provider = config.provider.as_deref().unwrap_or_default();
                let factory = self
                    .providers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(provider)
                    .cloned()
                    .ok_or_else(|| ConfigurationError::UnknownProvider {
                        model: name.to_string(),
                        provider: provider.to_string(),
                    })?;
                Some(factory(&config)?)
            }
            ModelKind::Generative | ModelKind::Multimodal => None,
        };

        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        if models.contains_key(name) {
            return Err(ConfigurationError::Duplicate {
                kind: ResourceKind::Model,
                name: name.to_string(),
            });
        }

        let handle = Arc::new(ModelHandle {
            name: model_name,
            config,
            embedder,
            released: AtomicBool::new(false),
        });
        models.insert(name.to_string(), Arc::clone(&handle));
        tracing::debug!(model = %name, kind = %handle.kind(), "Registered model");
        Ok(handle)
    }

    pub fn get_model(&self, name: &str) -> Result<Arc<ModelHandle>, NotFound> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| NotFound::model(name))
    }

    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Release every model. Calling it again is a no-op.
    pub fn release_all(&self) {
        let drained: Vec<Arc<ModelHandle>> = self
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        if drained.is_empty() {
            return;
        }
        for handle in &drained {
            handle.released.store(true, Ordering::Release);
        }
        tracing::info!(count = drained.len(), "Released models");
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendResult;
    use async_trait::async_trait;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingModel for FixedEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> BackendResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = ModelRegistry::new();
        registry
            .register_model("embed", ModelConfig::hashing_embedding(16))
            .unwrap();

        let handle = registry.get_model("embed").unwrap();
        assert_eq!(handle.kind(), ModelKind::Embedding);
        assert_eq!(handle.status(), ModelStatus::Ready);
        assert_eq!(handle.embedding_model().unwrap().dimensions(), 16);
    }

    #[test]
    fn test_missing_required_field_is_configuration_error() {
        let registry = ModelRegistry::new();

        let err = registry
            .register_model("embed", ModelConfig::new(ModelKind::Embedding))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::missing_field("model 'embed'", "provider")
        );

        let err = registry
            .register_model("chat", ModelConfig::new(ModelKind::Generative))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingField {
                field: "model_id",
                ..
            }
        ));

        let mut multimodal = ModelConfig::new(ModelKind::Multimodal);
        multimodal.model_id = Some("vision-1".into());
        let err = registry.register_model("vision", multimodal).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingField {
                field: "modalities",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let registry = ModelRegistry::new();
        let mut config = ModelConfig::new(ModelKind::Embedding);
        config.provider = Some("remote".into());

        let err = registry.register_model("embed", config).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownProvider { .. }));
    }

    #[test]
    fn test_custom_provider() {
        let registry = ModelRegistry::new();
        registry.register_provider(
            "fixed",
            Arc::new(|_: &ModelConfig| Ok(Arc::new(FixedEmbedder) as Arc<dyn EmbeddingModel>)),
        );
        let mut config = ModelConfig::new(ModelKind::Embedding);
        config.provider = Some("fixed".into());

        let handle = registry.register_model("embed", config).unwrap();
        assert_eq!(handle.embedding_model().unwrap().dimensions(), 2);
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = ModelRegistry::new();
        registry
            .register_model("chat", ModelConfig::generative("gpt"))
            .unwrap();
        let err = registry
            .register_model("chat", ModelConfig::generative("gpt"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Duplicate { .. }));
    }

    #[test]
    fn test_generative_handle_is_not_an_embedder() {
        let registry = ModelRegistry::new();
        let handle = registry
            .register_model("chat", ModelConfig::generative("gpt"))
            .unwrap();
        assert!(matches!(
            handle.embedding_model(),
            Err(ConfigurationError::WrongModelKind { .. })
        ));
    }

    #[test]
    fn test_get_unknown_model() {
        let registry = ModelRegistry::new();
        let err = registry.get_model("nope").unwrap_err();
        assert_eq!(err.kind, ResourceKind::Model);
    }

    #[test]
    fn test_release_all_is_idempotent() {
        let registry = ModelRegistry::new();
        let handle = registry
            .register_model("chat", ModelConfig::generative("gpt"))
            .unwrap();
        registry
            .register_model("embed", ModelConfig::hashing_embedding(8))
            .unwrap();

        registry.release_all();
        registry.release_all();

        assert!(registry.get_model("chat").is_err());
        assert!(registry.get_model("embed").is_err());
        assert_eq!(handle.status(), ModelStatus::Released);
        assert!(registry.model_names().is_empty());
    }

    #[test]
    fn test_descriptor_deserializes_flattened() {
        let descriptor: ModelDescriptor = serde_json::from_value(serde_json::json!({
            "name": "embed",
            "kind": "embedding",
            "provider": "hashing",
            "dimensions": 64
        }))
        .unwrap();
        assert_eq!(descriptor.config.kind, ModelKind::Embedding);
        assert_eq!(descriptor.config.dimensions, Some(64));
    }
}
