//! Route table: the externally supplied `{method, path, handler}` list.
//!
//! The server knows nothing about what a route does. It only checks the
//! table is well formed and attaches it, in order, to the router whose state
//! is the [`AppContext`].

use std::collections::HashSet;

use axum::Router;
use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{self, MethodFilter, MethodRouter};
use tracing::debug;

use crate::context::AppContext;
use crate::error::AppError;

/// One route definition.
pub struct Route<M> {
    method: Method,
    path: String,
    handler: MethodRouter<AppContext<M>>,
}

impl<M: Send + Sync + 'static> Route<M> {
    /// Route for an arbitrary method. Fails for methods the router cannot
    /// dispatch on (extension methods).
    pub fn new<H, T>(method: Method, path: impl Into<String>, handler: H) -> Result<Self, AppError>
    where
        H: Handler<T, AppContext<M>>,
        T: 'static,
    {
        let path = path.into();
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|e| AppError::Routes(format!("{method} {path}: {e}")))?;
        Ok(Self {
            method,
            path,
            handler: routing::on(filter, handler),
        })
    }

    pub fn get<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, AppContext<M>>,
        T: 'static,
    {
        Self {
            method: Method::GET,
            path: path.into(),
            handler: routing::get(handler),
        }
    }

    pub fn post<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, AppContext<M>>,
        T: 'static,
    {
        Self {
            method: Method::POST,
            path: path.into(),
            handler: routing::post(handler),
        }
    }
}

impl<M> Route<M> {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Ordered collection of routes.
pub struct RouteTable<M> {
    routes: Vec<Route<M>>,
}

impl<M> Default for RouteTable<M> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<M: Send + Sync + 'static> RouteTable<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append.
    pub fn with(mut self, route: Route<M>) -> Self {
        self.routes.push(route);
        self
    }

    pub fn push(&mut self, route: Route<M>) {
        self.routes.push(route);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route<M>> {
        self.routes.iter()
    }

    /// Attach every route to `router`, in table order.
    ///
    /// Paths must start with `/`, and a `(method, path)` pair may appear only
    /// once; the router would otherwise panic mid-startup.
    pub fn register(
        self,
        mut router: Router<AppContext<M>>,
    ) -> Result<Router<AppContext<M>>, AppError> {
        let mut seen: HashSet<(Method, String)> = HashSet::new();

        for route in self.routes {
            if !route.path.starts_with('/') {
                return Err(AppError::Routes(format!(
                    "{} {}: path must start with '/'",
                    route.method, route.path
                )));
            }
            if !seen.insert((route.method.clone(), route.path.clone())) {
                return Err(AppError::Routes(format!(
                    "{} {} registered twice",
                    route.method, route.path
                )));
            }
            debug!(method = %route.method, path = %route.path, "route registered");
            router = router.route(&route.path, route.handler);
        }

        Ok(router)
    }
}
