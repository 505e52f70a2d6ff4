//! # charla
//!
//! Real-time chat session server.
//!
//! charla exposes a small HTTP surface and a WebSocket API: connections are
//! admitted through a JWT-gated handshake, bound to identity-keyed rooms for
//! multi-device fan-out, and run a typing-indicator protocol around a
//! cancellable reply pipeline.
//!
//! ## API surface
//!
//! | Method | Path          | Auth          | Description                    |
//! |--------|---------------|---------------|--------------------------------|
//! | GET    | `/api/health` | No            | Liveness probe                 |
//! | GET    | `/ws`         | `?token=<jwt>`| WebSocket chat sessions        |
//!
//! ## Architecture
//!
//! ```text
//! main.rs     — entry point, clap CLI, router setup, graceful shutdown
//! config.rs   — TOML + env-var configuration
//! auth.rs     — JWT verification for the handshake gate
//! events.rs   — tagged wire protocol (closed enum, exact type names)
//! rooms.rs    — identity-keyed fan-out registry
//! session.rs  — per-connection state, message pipeline, cancellable reply
//! reply.rs    — reply-generation collaborator boundary
//! state.rs    — shared AppState
//! routes/
//!   health.rs — GET /api/health
//! ws/
//!   mod.rs    — connection gate, upgrade, event loop, keep-alive, teardown
//! ```

use axum::http::HeaderValue;
use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use charla::config::{Config, ServerConfig};
use charla::state::AppState;
use charla::{routes, ws};

/// Real-time chat session server.
#[derive(Parser)]
#[command(name = "charla", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WS server (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = match cli.command {
        Some(Commands::Serve { config }) => config,
        None => None,
    };
    run_server(config_path.as_deref()).await;
}

async fn run_server(config_path: Option<&str>) {
    let config = Config::load(config_path);

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("charla v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);

    if config.auth.secret == "change-me" {
        warn!("Using default signing secret — set CHARLA_SECRET or update config");
    }

    let cors = cors_layer(&config.server);
    let state = AppState::new(config);

    let app = Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/ws", get(ws::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    let listener = TcpListener::bind(&state.config.server.listen)
        .await
        .expect("Failed to bind");

    info!("Server ready");

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    info!("Goodbye");
}

/// Build the CORS layer from the configured origin allowlist.
fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring unparseable allowed origin: {o}");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
