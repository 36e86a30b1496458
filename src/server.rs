//! Startup sequence and HTTP listener.
//!
//! ```text
//! CONFIGURED → MODEL_LOADING → MODEL_READY → ROUTES_REGISTERED
//!            → INTERCEPTOR_INSTALLED → LISTENING
//!                 ╰──────────→ FAILED
//! ```
//!
//! Stages run strictly in order. The router cannot be built without an
//! [`AppContext`], and the context cannot exist without an acquired model,
//! so no request is routed before the model is ready. Any failure before
//! `LISTENING` aborts startup; there is no degraded mode.

use std::fmt;
use std::net::SocketAddr;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::{Config, ServerConfig};
use crate::context::AppContext;
use crate::error::AppError;
use crate::interceptor;
use crate::model::{self, ModelProvider};
use crate::routes::RouteTable;

// ── Stages ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configured,
    ModelLoading,
    ModelReady,
    RoutesRegistered,
    InterceptorInstalled,
    Listening,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configured => "CONFIGURED",
            Stage::ModelLoading => "MODEL_LOADING",
            Stage::ModelReady => "MODEL_READY",
            Stage::RoutesRegistered => "ROUTES_REGISTERED",
            Stage::InterceptorInstalled => "INTERCEPTOR_INSTALLED",
            Stage::Listening => "LISTENING",
            Stage::Failed => "FAILED",
        }
    }

    /// The only stage reachable on success.
    fn successor(&self) -> Option<Stage> {
        match self {
            Stage::Configured => Some(Stage::ModelLoading),
            Stage::ModelLoading => Some(Stage::ModelReady),
            Stage::ModelReady => Some(Stage::RoutesRegistered),
            Stage::RoutesRegistered => Some(Stage::InterceptorInstalled),
            Stage::InterceptorInstalled => Some(Stage::Listening),
            Stage::Listening | Stage::Failed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linear, non-repeating stage progression.
#[derive(Debug)]
pub struct StageTracker {
    current: Stage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self { current: Stage::Configured }
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Move to `to`, which must be the immediate successor.
    pub fn advance(&mut self, to: Stage) -> Result<(), AppError> {
        if self.current.successor() != Some(to) {
            return Err(AppError::Stage(format!(
                "cannot move from {} to {to}",
                self.current
            )));
        }
        debug!(from = %self.current, to = %to, "startup stage");
        self.current = to;
        Ok(())
    }

    /// Enter `FAILED`. Allowed from any stage before `LISTENING`.
    pub fn fail(&mut self, err: &AppError) {
        error!(stage = %self.current, "startup failed: {err}");
        if self.current != Stage::Listening {
            self.current = Stage::Failed;
        }
    }
}

// ── Startup ───────────────────────────────────────────────────────────────────

/// A server that has a model, a router and a bound socket, but has not yet
/// started accepting connections.
pub struct ReadyServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
    stages: StageTracker,
}

impl ReadyServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://host:port` of the bound listener.
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub fn stage(&self) -> Stage {
        self.stages.current()
    }

    /// Enter `LISTENING` and serve until `shutdown` is cancelled.
    pub async fn serve(mut self, shutdown: CancellationToken) -> Result<(), AppError> {
        self.stages.advance(Stage::Listening)?;
        info!(addr = %self.local_addr, "Server started at: {}", self.url());

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| AppError::Serve(format!("axum server error: {e}")))?;

        info!("server shut down");
        Ok(())
    }
}

/// Run every startup stage up to (not including) `LISTENING`.
///
/// `provider.acquire()` is awaited exactly once. On failure nothing is bound.
pub async fn prepare<P: ModelProvider>(
    config: &Config,
    provider: &P,
    routes: RouteTable<P::Model>,
) -> Result<ReadyServer, AppError> {
    let mut stages = StageTracker::new();
    info!(
        bind = %config.server.bind_addr(),
        body_limit_bytes = config.server.body_limit_bytes,
        routes = routes.len(),
        "server configured"
    );

    stages.advance(Stage::ModelLoading)?;
    let model = match model::acquire_once(provider, config.model.load_timeout).await {
        Ok(model) => model,
        Err(e) => {
            let err = AppError::ModelLoad(e);
            stages.fail(&err);
            return Err(err);
        }
    };
    stages.advance(Stage::ModelReady)?;

    let context = AppContext::new(model);
    let router = match assemble(&config.server, context, routes, &mut stages) {
        Ok(router) => router,
        Err(err) => {
            stages.fail(&err);
            return Err(err);
        }
    };

    let bind_addr = config.server.bind_addr();
    let bound = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener
            .local_addr()
            .map(|addr| (listener, addr))
            .map_err(AppError::from),
        Err(e) => Err(AppError::Bind(format!("cannot bind {bind_addr}: {e}"))),
    };
    let (listener, local_addr) = match bound {
        Ok(bound) => bound,
        Err(err) => {
            stages.fail(&err);
            return Err(err);
        }
    };

    Ok(ReadyServer {
        listener,
        router,
        local_addr,
        stages,
    })
}

/// [`prepare`] then [`ReadyServer::serve`].
pub async fn run<P: ModelProvider>(
    config: &Config,
    provider: P,
    routes: RouteTable<P::Model>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let ready = prepare(config, &provider, routes).await?;
    ready.serve(shutdown).await
}

/// Build the full router for an already-attached context, without binding.
pub fn build_app<M: Send + Sync + 'static>(
    server: &ServerConfig,
    context: AppContext<M>,
    routes: RouteTable<M>,
) -> Result<Router, AppError> {
    let mut stages = StageTracker { current: Stage::ModelReady };
    assemble(server, context, routes, &mut stages)
}

/// MODEL_READY → ROUTES_REGISTERED → INTERCEPTOR_INSTALLED.
fn assemble<M: Send + Sync + 'static>(
    server: &ServerConfig,
    context: AppContext<M>,
    routes: RouteTable<M>,
    stages: &mut StageTracker,
) -> Result<Router, AppError> {
    let router = routes
        .register(Router::new())?
        .layer(DefaultBodyLimit::max(server.body_limit_bytes));
    stages.advance(Stage::RoutesRegistered)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = interceptor::install(router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(context);
    stages.advance(Stage::InterceptorInstalled)?;

    Ok(router)
}
