//! Built-in routes shipped with the binary.
//!
//! ```text
//! GET /health   liveness plus a summary of the loaded model
//! ```

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::context::AppContext;
use crate::model::{LoadedModel, ModelSummary};
use crate::routes::{Route, RouteTable};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: ModelSummary,
}

/// GET /health
pub async fn health(State(ctx): State<AppContext<LoadedModel>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: ctx.model().summary(),
    })
}

/// The route table `main` registers.
pub fn default_routes() -> RouteTable<LoadedModel> {
    RouteTable::new().with(Route::get("/health", health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::fixtures::{write_model, MANIFEST};
    use crate::model::{ArtifactModelProvider, ModelProvider};
    use crate::server::build_app;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_loaded_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_model(dir.path(), MANIFEST, 36);
        let model = ArtifactModelProvider::new(Some(path.display().to_string()))
            .acquire()
            .await
            .unwrap();
        let fingerprint = model.fingerprint().to_string();

        let app = build_app(
            &Config::test_default().server,
            AppContext::new(model),
            default_routes(),
        )
        .unwrap();

        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"]["format"], "graph-model");
        assert_eq!(body["model"]["weights"], 2);
        assert_eq!(body["model"]["fingerprint"], fingerprint.as_str());
    }
}
