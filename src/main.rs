//! predict-server entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags
//!   3. Load config
//!   4. Init logger once (CLI `-v` flags > RUST_LOG > config)
//!   5. Spawn Ctrl-C / SIGTERM → shutdown watcher
//!   6. Acquire the model, attach it, register routes, install the
//!      interceptor, bind (see `server`)
//!   7. Serve until shutdown
//!
//! Any failure before serving exits non-zero; see `AppError::exit_code`.

use tokio_util::sync::CancellationToken;
use tracing::info;

use predict_server::error::{AppError, EXIT_CONFIG};
use predict_server::model::ArtifactModelProvider;
use predict_server::{config, handlers, logger, server};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present: ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        bind = %config.server.bind_addr(),
        model_url = config.model.url.as_deref().unwrap_or("<unset>"),
        load_timeout = ?config.model.load_timeout,
        log_level = %effective_log_level,
        "config loaded"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    let provider = ArtifactModelProvider::new(config.model.url.clone());
    server::run(&config, provider, handlers::default_routes(), shutdown).await
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    parse_args(std::env::args().skip(1))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: predict-server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                println!();
                println!("Environment: PORT, HOST, MODEL_URL, PREDICT_LOG_LEVEL, RUST_LOG");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(EXIT_CONFIG);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add(u8::try_from(a.len() - 1).unwrap_or(u8::MAX));
            }
            _ => {}
        }
    }

    CliArgs {
        log_level: logger::level_for_verbosity(verbosity),
        config_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> CliArgs {
        parse_args(list.iter().map(|a| a.to_string()))
    }

    #[test]
    fn verbosity_flags_accumulate() {
        assert_eq!(args(&[]).log_level, None);
        assert_eq!(args(&["-vv"]).log_level, Some("info"));
        assert_eq!(args(&["-v", "--verbose", "-v"]).log_level, Some("debug"));
    }

    #[test]
    fn very_long_verbosity_flag_saturates() {
        let flag = format!("-{}", "v".repeat(256));
        assert_eq!(args(&[&flag]).log_level, Some("trace"));
    }

    #[test]
    fn config_path_is_taken() {
        let parsed = args(&["-f", "/etc/predict.toml", "-v"]);
        assert_eq!(parsed.config_path.as_deref(), Some("/etc/predict.toml"));
        assert_eq!(parsed.log_level, Some("warn"));
    }
}
