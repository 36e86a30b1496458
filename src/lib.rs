// Library root: the binary entry point is src/main.rs.

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod interceptor;
pub mod logger;
pub mod model;
pub mod routes;
pub mod server;
