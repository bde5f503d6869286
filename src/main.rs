//! xreply -- single-operator X reply assistant.
//!
//! Entry point. Loads configuration, sets up logging, wires the OAuth
//! manager, X client and reply generator into shared state, and serves the
//! HTTP API until SIGTERM / SIGINT.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use xreply::AppState;
use xreply::api;
use xreply::config::{Config, LoggingConfig};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: PathBuf,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("xreply.toml");

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("xreply {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    CliArgs { config_path }
}

fn print_usage() {
    println!(
        "\
xreply {version} -- X reply assistant

USAGE:
    xreply [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: xreply.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    XREPLY_CONFIG          Alternative to --config flag
    X_CLIENT_ID            X OAuth client id
    X_CLIENT_SECRET        X OAuth client secret
    X_REDIRECT_URI         Registered OAuth callback URL
    APP_BASE_URL           Public base URL of this server
    OPENAI_API_KEY         Key used to draft replies
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
        .block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let cli = parse_args();

    // XREPLY_CONFIG wins over --config
    let config_path = std::env::var("XREPLY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);

    let config = Config::load(&config_path)?;

    init_tracing(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting xreply"
    );
    report_settings(&config);

    let config = Arc::new(config);
    let state = AppState::from_config(config.clone())?;

    let app = build_app(state);

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Listening");

    println!();
    println!("  xreply v{} is running", env!("CARGO_PKG_VERSION"));
    println!("  Connect X: http://{listen_addr}/api/auth/x/oauth");
    println!("  Health:    http://{listen_addr}/health");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully");
    Ok(())
}

/// Log env overrides and settings whose absence only shows up per request.
fn report_settings(config: &Config) {
    for (setting, var) in config.env_overrides.all() {
        tracing::debug!(setting = %setting, env = %var, "Setting overridden from environment");
    }

    let missing: Vec<&str> = [
        ("X_CLIENT_ID", config.x.client_id.is_none()),
        ("X_CLIENT_SECRET", config.x.client_secret.is_none()),
        ("APP_BASE_URL", config.app.base_url.is_none()),
        ("OPENAI_API_KEY", config.openai.api_key.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();

    if !missing.is_empty() {
        tracing::warn!(
            missing = %missing.join(", "),
            "Some settings are unset; the routes that need them will fail"
        );
    }
}

// ---------------------------------------------------------------------------
// Router assembly
// ---------------------------------------------------------------------------

/// Build the application router with all middleware layers.
fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let trace = TraceLayer::new_for_http();

    api::build_api_router()
        .layer(propagate_id)
        .layer(request_id)
        .layer(trace)
        .layer(cors)
        .with_state(state)
}

/// Build the CORS layer from config.
fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        EnvFilter::new(format!("xreply={level},tower_http={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

/// Wait for a shutdown signal (SIGTERM or SIGINT / Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_usage_does_not_panic() {
        print_usage();
    }

    #[test]
    fn test_build_cors_layer_empty_origins() {
        let config = Config::default();
        let _cors = build_cors_layer(&config);
    }

    #[test]
    fn test_report_settings_with_defaults() {
        report_settings(&Config::default());
    }

    #[test]
    fn test_build_cors_layer_with_origins() {
        let mut config = Config::default();
        config.server.cors_origins = vec!["http://localhost:3000".to_string()];
        let _cors = build_cors_layer(&config);
    }
}
