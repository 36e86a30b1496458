//! Converted model artifacts: a JSON manifest (`model.json`) naming the
//! topology and the binary weight shards that sit next to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::source::{Fetcher, ModelSource};
use super::{ModelLoadError, ModelProvider};

/// Serialized model flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelFormat {
    #[serde(rename = "graph-model")]
    Graph,
    #[serde(rename = "layers-model")]
    Layers,
}

impl ModelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::Graph => "graph-model",
            ModelFormat::Layers => "layers-model",
        }
    }
}

/// Element type of a weight tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Float32,
    Int32,
    Bool,
    Complex64,
    String,
}

impl DType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "float32" => Some(DType::Float32),
            "int32" => Some(DType::Int32),
            "bool" => Some(DType::Bool),
            "complex64" => Some(DType::Complex64),
            "string" => Some(DType::String),
            _ => None,
        }
    }

    /// Bytes per element; `None` for variable-length strings.
    pub fn byte_size(&self) -> Option<usize> {
        match self {
            DType::Float32 | DType::Int32 => Some(4),
            DType::Bool => Some(1),
            DType::Complex64 => Some(8),
            DType::String => None,
        }
    }
}

/// One named tensor inside the weight shards.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeightSpec {
    pub name: String,
    #[serde(default)]
    pub shape: Vec<usize>,
    pub dtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<serde_json::Value>,
}

/// A set of shard files holding the concatenated bytes of `weights`.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightGroup {
    pub paths: Vec<String>,
    pub weights: Vec<WeightSpec>,
}

/// `model.json` as written by the model converter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelManifest {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub generated_by: Option<String>,
    #[serde(default)]
    pub converted_by: Option<String>,
    #[serde(default)]
    pub model_topology: Option<serde_json::Value>,
    #[serde(default)]
    pub weights_manifest: Vec<WeightGroup>,
}

impl ModelManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, ModelLoadError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ModelLoadError::Corrupt(format!("manifest is not valid JSON: {e}")))
    }

    /// Check the manifest is something this runtime can serve and return its
    /// format. A manifest without `format` predates the field and is a
    /// layers model.
    pub fn validate(&self) -> Result<ModelFormat, ModelLoadError> {
        let format = match self.format.as_deref() {
            Some("graph-model") => ModelFormat::Graph,
            Some("layers-model") | None => ModelFormat::Layers,
            Some(other) => {
                return Err(ModelLoadError::Incompatible(format!(
                    "unsupported model format '{other}'"
                )));
            }
        };

        match &self.model_topology {
            Some(t) if !t.is_null() => {}
            _ => return Err(ModelLoadError::Corrupt("manifest has no modelTopology".into())),
        }

        for weight in self.weights() {
            if DType::parse(&weight.dtype).is_none() {
                return Err(ModelLoadError::Incompatible(format!(
                    "weight '{}' has unsupported dtype '{}'",
                    weight.name, weight.dtype
                )));
            }
        }

        Ok(format)
    }

    pub fn weights(&self) -> impl Iterator<Item = &WeightSpec> {
        self.weights_manifest.iter().flat_map(|g| g.weights.iter())
    }

    /// Shard paths in manifest order.
    pub fn shard_paths(&self) -> impl Iterator<Item = &str> {
        self.weights_manifest
            .iter()
            .flat_map(|g| g.paths.iter().map(String::as_str))
    }

    /// Total shard bytes implied by the weight specs, or `None` when any
    /// weight is quantized or variable-length and the size can't be known.
    pub fn declared_weight_bytes(&self) -> Result<Option<usize>, ModelLoadError> {
        let mut total: usize = 0;
        for weight in self.weights() {
            if weight.quantization.is_some() {
                return Ok(None);
            }
            let Some(elem) = DType::parse(&weight.dtype).and_then(|d| d.byte_size()) else {
                return Ok(None);
            };
            let bytes = weight
                .shape
                .iter()
                .try_fold(elem, |acc, dim| acc.checked_mul(*dim))
                .and_then(|b| total.checked_add(b));
            total = bytes.ok_or_else(|| {
                ModelLoadError::Corrupt(format!("weight '{}' shape overflows", weight.name))
            })?;
        }
        Ok(Some(total))
    }
}

/// The immutable model handle shared with every request handler.
#[derive(Debug)]
pub struct LoadedModel {
    source: ModelSource,
    format: ModelFormat,
    generated_by: Option<String>,
    converted_by: Option<String>,
    topology: serde_json::Value,
    weights: Vec<WeightSpec>,
    weight_data: Vec<u8>,
    fingerprint: String,
    loaded_at: DateTime<Utc>,
}

impl LoadedModel {
    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn format(&self) -> ModelFormat {
        self.format
    }

    pub fn topology(&self) -> &serde_json::Value {
        &self.topology
    }

    pub fn weights(&self) -> &[WeightSpec] {
        &self.weights
    }

    pub fn weight_data(&self) -> &[u8] {
        &self.weight_data
    }

    /// Hex SHA-256 over the manifest bytes followed by every shard.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            source: self.source.to_string(),
            format: self.format,
            generated_by: self.generated_by.clone(),
            converted_by: self.converted_by.clone(),
            fingerprint: self.fingerprint.clone(),
            weights: self.weights.len(),
            weight_bytes: self.weight_data.len(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Public, serializable view of a [`LoadedModel`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub source: String,
    pub format: ModelFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_by: Option<String>,
    pub fingerprint: String,
    pub weights: usize,
    pub weight_bytes: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Loads a converted model from the configured location.
#[derive(Debug, Clone)]
pub struct ArtifactModelProvider {
    location: Option<String>,
    fetcher: Fetcher,
}

impl ArtifactModelProvider {
    /// `location` is checked at acquisition time, so a missing location
    /// fails the model-loading stage like any other load error.
    pub fn new(location: Option<String>) -> Self {
        Self {
            location,
            fetcher: Fetcher::default(),
        }
    }

    async fn load(&self) -> Result<LoadedModel, ModelLoadError> {
        let location = self.location.as_deref().ok_or(ModelLoadError::NotConfigured)?;
        let source = ModelSource::parse(location)?;

        let manifest_bytes = self.fetcher.fetch(&source).await?;
        let manifest = ModelManifest::parse(&manifest_bytes)?;
        let format = manifest.validate()?;

        let mut hasher = Sha256::new();
        hasher.update(&manifest_bytes);

        let mut weight_data = Vec::new();
        for path in manifest.shard_paths() {
            let shard = source.join(path);
            let bytes = self.fetcher.fetch(&shard).await?;
            debug!(shard = %shard, bytes = bytes.len(), "weight shard read");
            hasher.update(&bytes);
            weight_data.extend_from_slice(&bytes);
        }

        if let Some(expected) = manifest.declared_weight_bytes()? {
            if expected != weight_data.len() {
                return Err(ModelLoadError::Corrupt(format!(
                    "weights declare {expected} bytes but shards hold {}",
                    weight_data.len()
                )));
            }
        }

        let fingerprint = hex::encode(hasher.finalize());
        info!(
            %source,
            format = format.as_str(),
            weights = manifest.weights().count(),
            weight_bytes = weight_data.len(),
            %fingerprint,
            "model artifact loaded"
        );

        let ModelManifest {
            generated_by,
            converted_by,
            model_topology,
            weights_manifest,
            ..
        } = manifest;

        Ok(LoadedModel {
            source,
            format,
            generated_by,
            converted_by,
            topology: model_topology.unwrap_or_default(),
            weights: weights_manifest.into_iter().flat_map(|g| g.weights).collect(),
            weight_data,
            fingerprint,
            loaded_at: Utc::now(),
        })
    }
}

impl ModelProvider for ArtifactModelProvider {
    type Model = LoadedModel;

    async fn acquire(&self) -> Result<LoadedModel, ModelLoadError> {
        self.load().await
    }
}
