//! End-to-end startup tests over a real loopback socket.

use std::path::Path;

use axum::extract::State;
use predict_server::config::{self, Config, EnvOverrides};
use predict_server::context::AppContext;
use predict_server::error::AppError;
use predict_server::handlers::health;
use predict_server::interceptor::InputError;
use predict_server::model::{ArtifactModelProvider, LoadedModel, ModelLoadError};
use predict_server::routes::{Route, RouteTable};
use predict_server::server::{self, Stage};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const MANIFEST: &str = r#"{
  "format": "layers-model",
  "generatedBy": "keras v2.15.0",
  "convertedBy": "TensorFlow.js Converter v4.17.0",
  "modelTopology": { "class_name": "Sequential", "config": {} },
  "weightsManifest": [
    {
      "paths": ["group1-shard1of1.bin"],
      "weights": [{ "name": "dense/kernel", "shape": [4, 2], "dtype": "float32" }]
    }
  ]
}"#;

fn write_model(dir: &Path) -> String {
    std::fs::write(dir.join("model.json"), MANIFEST).unwrap();
    std::fs::write(dir.join("group1-shard1of1.bin"), vec![1u8; 32]).unwrap();
    format!("file://{}", dir.join("model.json").display())
}

fn loopback_config(model_url: Option<String>) -> Config {
    config::defaults(&EnvOverrides {
        port: Some("0".into()),
        host: Some("127.0.0.1".into()),
        model_url,
        log_level: None,
    })
    .unwrap()
}

async fn reject_upload(State(_ctx): State<AppContext<LoadedModel>>) -> Result<&'static str, InputError> {
    Err(InputError::bad_request("Unsupported image format."))
}

fn routes() -> RouteTable<LoadedModel> {
    RouteTable::new()
        .with(Route::get("/health", health))
        .with(Route::post("/predict", reject_upload))
}

#[tokio::test]
async fn serves_envelopes_after_model_loads() {
    let dir = TempDir::new().unwrap();
    let config = loopback_config(Some(write_model(dir.path())));
    let provider = ArtifactModelProvider::new(config.model.url.clone());

    let ready = server::prepare(&config, &provider, routes()).await.unwrap();
    assert_eq!(ready.stage(), Stage::InterceptorInstalled);
    let base = ready.url();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(ready.serve(shutdown.clone()));
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["model"]["format"], "layers-model");
    assert_eq!(body["model"]["weightBytes"], 32);

    let resp = client.get(format!("{base}/nonexistent-route")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "status": "fail", "message": "Not Found" }));

    let resp = client.post(format!("{base}/predict")).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "status": "fail", "message": "Unsupported image format. Silakan gunakan foto lain." })
    );

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn missing_model_aborts_with_exit_code_one() {
    let dir = TempDir::new().unwrap();
    let url = format!("file://{}", dir.path().join("model.json").display());
    let config = loopback_config(Some(url));
    let provider = ArtifactModelProvider::new(config.model.url.clone());

    let err = server::prepare(&config, &provider, routes()).await.err().unwrap();
    assert!(matches!(err, AppError::ModelLoad(ModelLoadError::NotFound(_))));
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn unconfigured_model_aborts() {
    let config = loopback_config(None);
    let provider = ArtifactModelProvider::new(config.model.url.clone());

    let err = server::run(&config, provider, routes(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ModelLoad(ModelLoadError::NotConfigured)));
    assert_eq!(err.exit_code(), 1);
}
