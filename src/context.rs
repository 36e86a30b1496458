//! Request-handling context: the model handle, reachable from every handler.
//!
//! Built once by the startup sequence after the model is acquired and
//! injected into every handler via [`axum::extract::State`]. There is no
//! setter: handlers can read the model, never replace it.

use std::sync::Arc;

/// Axum router state shared by every route.
///
/// Cheap to clone: the model is reference-counted.
pub struct AppContext<M> {
    model: Arc<M>,
}

impl<M> AppContext<M> {
    /// Attach an acquired model.
    pub fn new(model: M) -> Self {
        Self { model: Arc::new(model) }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Owned handle for work that outlives the request (e.g. `spawn_blocking`).
    pub fn model_handle(&self) -> Arc<M> {
        Arc::clone(&self.model)
    }
}

// Manual impl: `M` itself need not be `Clone`.
impl<M> Clone for AppContext<M> {
    fn clone(&self) -> Self {
        Self { model: Arc::clone(&self.model) }
    }
}
