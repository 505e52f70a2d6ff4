//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `CHARLA_SECRET`, `CHARLA_LISTEN`
//! 2. **Config file** — path via `--config <path>`, or `charla.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:4000"
//! allowed_origins = ["http://localhost:5173", "http://localhost:3000"]
//! keepalive_interval_secs = 25
//! keepalive_timeout_secs = 60
//! send_queue_capacity = 256
//!
//! [auth]
//! secret = "your-signing-secret"
//!
//! [reply]
//! delay_ms = 2000
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP/WebSocket server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:4000`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Origins allowed to establish a connection. Defaults to the two local
    /// development origins used by the web client.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Seconds between server-initiated WebSocket pings (default 25).
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
    /// Seconds of client silence before the connection is closed (default 60).
    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,
    /// Outgoing event queue capacity per connection (default 256). Events for
    /// a connection whose queue is full are dropped, never awaited.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret for handshake tokens. Override with
    /// `CHARLA_SECRET`. Defaults to `"change-me"` which triggers a startup
    /// warning.
    #[serde(default = "default_secret")]
    pub secret: String,
}

/// Reply-generation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyConfig {
    /// Milliseconds between acknowledging a message and emitting the reply
    /// (default 2000). Models the latency of the reply collaborator.
    #[serde(default = "default_reply_delay_ms")]
    pub delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:4000".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
    ]
}
fn default_keepalive_interval() -> u64 {
    25
}
fn default_keepalive_timeout() -> u64 {
    60
}
fn default_send_queue_capacity() -> usize {
    256
}
fn default_secret() -> String {
    "change-me".to_string()
}
fn default_reply_delay_ms() -> u64 {
    2000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            allowed_origins: default_allowed_origins(),
            keepalive_interval_secs: default_keepalive_interval(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            send_queue_capacity: default_send_queue_capacity(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_secret(),
        }
    }
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_reply_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Whether a connection attempt from `origin` may be admitted.
    ///
    /// A missing `Origin` header (non-browser clients) is always admitted;
    /// browsers are held to the configured allowlist.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(o) => self.allowed_origins.iter().any(|a| a == o),
            None => true,
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise looks
    /// for `charla.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config: Config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("charla.toml").exists() {
            let content =
                std::fs::read_to_string("charla.toml").expect("Failed to read charla.toml");
            toml::from_str(&content).expect("Failed to parse charla.toml")
        } else {
            Config {
                server: ServerConfig::default(),
                auth: AuthConfig::default(),
                reply: ReplyConfig::default(),
                logging: LoggingConfig::default(),
            }
        };

        // Env var overrides
        if let Ok(secret) = std::env::var("CHARLA_SECRET") {
            config.auth.secret = secret;
        }
        if let Ok(listen) = std::env::var("CHARLA_LISTEN") {
            config.server.listen = listen;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:4000");
        assert_eq!(config.server.allowed_origins.len(), 2);
        assert_eq!(config.auth.secret, "change-me");
        assert_eq!(config.reply.delay_ms, 2000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:9000"
            allowed_origins = ["https://chat.example.com"]

            [reply]
            delay_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.allowed_origins, ["https://chat.example.com"]);
        assert_eq!(config.reply.delay_ms, 50);
        // Untouched sections keep their defaults
        assert_eq!(config.server.keepalive_interval_secs, 25);
        assert_eq!(config.auth.secret, "change-me");
    }

    #[test]
    fn origin_allowlist() {
        let server = ServerConfig::default();
        assert!(server.origin_allowed(Some("http://localhost:5173")));
        assert!(server.origin_allowed(Some("http://localhost:3000")));
        assert!(!server.origin_allowed(Some("https://evil.example.com")));
        // Non-browser clients send no Origin header
        assert!(server.origin_allowed(None));
    }
}
