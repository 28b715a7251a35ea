//! Configuration management for relay-tunnel.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::{Args, Command};
use crate::pty::{default_shell, PtySize};
use crate::session::{Feature, SessionId};

/// Environment variable naming the configuration file.
pub const ENV_CONFIG: &str = "RELAY_TUNNEL_CONFIG";
/// Environment variable holding the relay database URL.
pub const ENV_URL: &str = "RELAY_TUNNEL_URL";
/// Environment variable holding the relay auth token.
pub const ENV_AUTH: &str = "RELAY_TUNNEL_AUTH";
/// Environment variable carrying the port an HTTP session was started for.
pub const ENV_SESSION_PORT: &str = "RELAY_TUNNEL_SESSION_PORT";
/// Environment variable holding the log level.
pub const ENV_LOG_LEVEL: &str = "RELAY_TUNNEL_LOG_LEVEL";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay store connection.
    pub relay: RelaySection,
    /// Client-side reverse proxy.
    pub proxy: ProxySection,
    /// Server-side HTTP forwarding.
    pub forward: ForwardSection,
    /// Session manager and admin API.
    pub manage: ManageSection,
    /// Served shell.
    pub shell: ShellSection,
    /// Logging configuration.
    pub logging: LoggingSection,
    /// File this configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Relay store section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    /// Base URL of the realtime database.
    #[serde(alias = "realtime_db_url")]
    pub url: Option<String>,
    /// Token sent as the `auth` query parameter.
    pub auth: Option<String>,
    /// Pause before reopening a dropped subscription.
    pub reconnect_delay_ms: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            url: None,
            auth: None,
            reconnect_delay_ms: 1000,
        }
    }
}

/// Reverse proxy section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Forward every request to this remote port instead of `/<port>/...`.
    pub target_port: Option<u16>,
    /// How long a relayed request may wait for its response.
    pub timeout_secs: u64,
    /// Largest request body accepted for relaying.
    pub max_body_bytes: usize,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 55080,
            target_port: None,
            timeout_secs: 30,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Forwarding section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardSection {
    /// Host the HTTP server role calls.
    pub host: String,
    /// Port the session was started for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Default for ForwardSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
        }
    }
}

/// Session manager section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManageSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// HTML page served at `/`.
    pub page: Option<PathBuf>,
    /// Sessions started when the manager boots.
    pub autostart: Vec<AutostartEntry>,
}

impl Default for ManageSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 55777,
            page: None,
            autostart: Vec::new(),
        }
    }
}

/// A session the manager starts on boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutostartEntry {
    pub feature: Feature,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Shell section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    /// Shell program, platform default when unset.
    pub program: Option<String>,
    pub rows: u16,
    pub cols: u16,
}

impl Default for ShellSection {
    fn default() -> Self {
        let size = PtySize::default();
        Self {
            program: None,
            rows: size.rows,
            cols: size.cols,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Some(url) = non_empty_env(ENV_URL) {
            self.relay.url = Some(url);
        }

        if let Some(auth) = non_empty_env(ENV_AUTH) {
            self.relay.auth = Some(auth);
        }

        if let Some(level) = non_empty_env(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }

        if let Some(port) = non_empty_env(ENV_SESSION_PORT) {
            self.forward.port = port.trim().parse().ok();
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref url) = args.relay_url {
            self.relay.url = Some(url.clone());
        }

        if let Some(ref auth) = args.auth {
            self.relay.auth = Some(auth.clone());
        }

        match args.command {
            Some(Command::Manage { port }) => {
                if let Some(port) = port.or(args.port) {
                    self.manage.port = port;
                }
            }
            _ => {
                if let Some(port) = args.port {
                    self.proxy.port = port;
                }
            }
        }

        if let Some(port) = args.target_port {
            self.proxy.target_port = Some(port);
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let path = args
            .config
            .clone()
            .or_else(|| non_empty_env(ENV_CONFIG).map(PathBuf::from));

        let mut config = match path {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Relay URL, required by every mode.
    pub fn relay_url(&self) -> Result<&str, ConfigError> {
        self.relay
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingRelayUrl)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.relay.reconnect_delay_ms)
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy.timeout_secs)
    }

    /// Bind address of the reverse proxy.
    pub fn proxy_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.proxy.host, self.proxy.port)
    }

    /// Bind address of the admin API.
    pub fn manage_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.manage.host, self.manage.port)
    }

    pub fn shell_program(&self) -> String {
        self.shell.program.clone().unwrap_or_else(default_shell)
    }

    pub fn pty_size(&self) -> PtySize {
        PtySize::new(self.shell.rows, self.shell.cols)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let ip = host
        .parse()
        .map_err(|_| ConfigError::InvalidHost(host.to_string()))?;
    Ok(SocketAddr::new(ip, port))
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error.
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    /// Invalid host address.
    #[error("invalid host address: {0}")]
    InvalidHost(String),
    /// No relay URL in any layer.
    #[error("relay URL is not configured (use -u, RELAY_TUNNEL_URL or relay.url)")]
    MissingRelayUrl,
}
