//! Model artifact locations and byte fetching.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::ModelLoadError;

/// Where a model artifact (manifest or weight shard) lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A file on local disk.
    Local(PathBuf),
    /// An `http://` or `https://` URL.
    Remote(String),
}

impl ModelSource {
    /// Parse a configured location: `http(s)://…` is remote, `file://…` and
    /// bare paths are local. Other schemes are rejected.
    pub fn parse(location: &str) -> Result<Self, ModelLoadError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ModelLoadError::NotConfigured);
        }

        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(ModelSource::Remote(location.to_string()));
        }

        if let Some(path) = location.strip_prefix("file://") {
            return Ok(ModelSource::Local(expand_home(path)));
        }

        if let Some((scheme, _)) = location.split_once("://") {
            return Err(ModelLoadError::Incompatible(format!(
                "unsupported model location scheme '{scheme}'"
            )));
        }

        Ok(ModelSource::Local(expand_home(location)))
    }

    /// Resolve `relative` against the directory holding this artifact, the
    /// way weight shard paths are resolved against their manifest.
    pub fn join(&self, relative: &str) -> ModelSource {
        if relative.starts_with("http://") || relative.starts_with("https://") {
            return ModelSource::Remote(relative.to_string());
        }
        match self {
            ModelSource::Local(path) => {
                let dir = path.parent().unwrap_or(Path::new("."));
                ModelSource::Local(dir.join(relative))
            }
            ModelSource::Remote(url) => {
                // The manifest's query (e.g. an access token) is carried onto
                // every shard URL; its fragment is not.
                let url = url.split_once('#').map_or(url.as_str(), |(u, _)| u);
                let (path, query) = match url.split_once('?') {
                    Some((p, q)) => (p, Some(q)),
                    None => (url, None),
                };
                let base = match path.rfind('/') {
                    Some(idx) if idx > path.find("://").map_or(0, |s| s + 2) => &path[..=idx],
                    _ => path,
                };
                let base = base.trim_end_matches('/');
                let mut joined = format!("{base}/{}", relative.trim_start_matches('/'));
                if let Some(query) = query.filter(|q| !q.is_empty() && !relative.contains('?')) {
                    joined.push('?');
                    joined.push_str(query);
                }
                ModelSource::Remote(joined)
            }
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Local(path) => write!(f, "{}", path.display()),
            ModelSource::Remote(url) => f.write_str(url),
        }
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Reads artifact bytes from either kind of [`ModelSource`].
#[derive(Debug, Clone, Default)]
pub(crate) struct Fetcher {
    #[cfg(feature = "remote-model")]
    http: reqwest::Client,
}

impl Fetcher {
    pub(crate) async fn fetch(&self, source: &ModelSource) -> Result<Vec<u8>, ModelLoadError> {
        match source {
            ModelSource::Local(path) => {
                debug!(path = %path.display(), "reading model artifact");
                tokio::fs::read(path).await.map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => {
                        ModelLoadError::NotFound(path.display().to_string())
                    }
                    _ => ModelLoadError::Io {
                        location: path.display().to_string(),
                        source: e,
                    },
                })
            }
            ModelSource::Remote(url) => self.fetch_remote(url).await,
        }
    }

    #[cfg(feature = "remote-model")]
    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, ModelLoadError> {
        debug!(%url, "downloading model artifact");
        let fetch_err = |message: String| ModelLoadError::Fetch {
            location: url.to_string(),
            message,
        };

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ModelLoadError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {status}")));
        }

        let body = resp.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
        Ok(body.to_vec())
    }

    #[cfg(not(feature = "remote-model"))]
    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, ModelLoadError> {
        Err(ModelLoadError::Incompatible(format!(
            "{url}: remote model sources need the `remote-model` feature"
        )))
    }
}
