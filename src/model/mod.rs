//! Model acquisition: the one startup step allowed to suspend.
//!
//! - **provider contract**: [`ModelProvider`] produces a model handle once;
//!   [`acquire_once`] wraps it with the optional load timeout.
//! - **source**: where an artifact lives (local path or remote URL) and how
//!   its bytes are fetched.
//! - **artifact**: the converted graph/layers model format, its validation,
//!   and the immutable [`LoadedModel`] handle built from it.

mod artifact;
mod source;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

pub use artifact::{
    ArtifactModelProvider, DType, LoadedModel, ModelFormat, ModelManifest, ModelSummary,
    WeightGroup, WeightSpec,
};
pub use source::{expand_home, ModelSource};

#[cfg(test)]
pub(crate) use artifact::fixtures;

/// Why a model could not be acquired. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("no model location configured (set MODEL_URL or [model] url)")]
    NotConfigured,

    #[error("model artifact not found: {0}")]
    NotFound(String),

    #[error("corrupt model artifact: {0}")]
    Corrupt(String),

    #[error("incompatible model artifact: {0}")]
    Incompatible(String),

    #[error("model acquisition timed out after {0:?}")]
    TimedOut(Duration),

    #[error("cannot read {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot fetch {location}: {message}")]
    Fetch { location: String, message: String },
}

/// Produces a ready-to-use model. Called exactly once, before the listener
/// accepts connections; never per request.
pub trait ModelProvider: Send + Sync {
    /// The handle shared read-only with every request handler.
    type Model: Send + Sync + 'static;

    fn acquire(&self) -> impl Future<Output = Result<Self::Model, ModelLoadError>> + Send;
}

/// Run `provider.acquire()` once, bounded by `timeout` when one is set.
pub async fn acquire_once<P: ModelProvider>(
    provider: &P,
    timeout: Option<Duration>,
) -> Result<P::Model, ModelLoadError> {
    match timeout {
        Some(limit) => {
            debug!(timeout = ?limit, "acquiring model with timeout");
            tokio::time::timeout(limit, provider.acquire())
                .await
                .map_err(|_| ModelLoadError::TimedOut(limit))?
        }
        None => provider.acquire().await,
    }
}
