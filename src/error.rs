//! Application-wide error types.
//!
//! Everything here is a *startup* error: once the server is listening,
//! request-level failures are responses (see [`crate::interceptor`]), never
//! an [`AppError`].

use thiserror::Error;

use crate::model::ModelLoadError;

/// Exit status for a model that could not be acquired.
pub const EXIT_MODEL_LOAD: i32 = 1;
/// Exit status for a listener that could not bind or stopped with an error.
pub const EXIT_LISTENER: i32 = 2;
/// Exit status for bad configuration, logger setup or route table.
pub const EXIT_CONFIG: i32 = 3;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),

    #[error("route table error: {0}")]
    Routes(String),

    #[error("startup stage error: {0}")]
    Stage(String),

    #[error("bind error: {0}")]
    Bind(String),

    #[error("server error: {0}")]
    Serve(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Process exit status for this error. Never zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::ModelLoad(_) => EXIT_MODEL_LOAD,
            AppError::Bind(_) | AppError::Serve(_) | AppError::Io(_) => EXIT_LISTENER,
            AppError::Config(_) | AppError::Logger(_) | AppError::Routes(_) | AppError::Stage(_) => {
                EXIT_CONFIG
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn model_load_error_converts() {
        let e: AppError = ModelLoadError::NotConfigured.into();
        assert!(e.to_string().starts_with("model load error"));
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }

    #[test]
    fn exit_codes_are_distinct_and_non_zero() {
        let model = AppError::ModelLoad(ModelLoadError::NotConfigured).exit_code();
        let bind = AppError::Bind("in use".into()).exit_code();
        let config = AppError::Config("bad port".into()).exit_code();
        assert_ne!(model, 0);
        assert_ne!(bind, 0);
        assert_ne!(config, 0);
        assert_ne!(model, bind);
        assert_ne!(bind, config);
        assert_ne!(model, config);
    }
}
