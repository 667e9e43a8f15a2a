use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::realtime::multiplexer::{MultiplexerConfig, ResubscribeMode};
use crate::realtime::transport::{ReconnectPolicy, TransportConfig};

/// Config file read when `--config-path` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "edge_console.conf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{field} is not a valid url: {source}")]
    Url {
        field: &'static str,
        source: url::ParseError,
    },

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Every setting of the console binaries. Each source fills in what it
/// knows; later sources override earlier ones field by field.
#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "AR edge console realtime client", version)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    #[clap(long, env = "EDGE_API_URL", help = "Base url of the edge REST API.")]
    pub api_url: Option<String>,

    #[clap(long, env = "EDGE_WS_URL", help = "Edge WebSocket url. Derived from the API url when absent.")]
    pub ws_url: Option<String>,

    #[clap(long, env = "EDGE_AUTH_TOKEN", help = "Bearer token passed through to the edge server.")]
    pub auth_token: Option<String>,

    #[clap(long, env = "EDGE_LOCATION", help = "Location to watch.")]
    pub location: Option<String>,

    #[clap(long, env = "EDGE_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "EDGE_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "EDGE_LOG_LEVEL", help = "Log filter (trace, debug, info, warn, error or a directive list).")]
    pub log_level: Option<String>,

    #[clap(long, env = "EDGE_HEARTBEAT_INTERVAL_MS", help = "Milliseconds between heartbeat pings.")]
    pub heartbeat_interval_ms: Option<u64>,

    #[clap(long, env = "EDGE_PONG_TIMEOUT_MS", help = "Milliseconds to wait for a pong before reconnecting.")]
    pub pong_timeout_ms: Option<u64>,

    #[clap(long, env = "EDGE_RECONNECT_BASE_DELAY_MS", help = "Delay in milliseconds before the first reconnect attempt.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "EDGE_RECONNECT_MAX_DELAY_MS", help = "Cap in milliseconds for the doubling reconnect delay.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "EDGE_RESUBSCRIBE_WILDCARD", num_args = 0..=1, default_missing_value = "true", help = "Replay `subscribe <event> *` after reconnects instead of the registered filters.")]
    pub resubscribe_wildcard: Option<bool>,

    #[clap(long, env = "EDGE_PORT", help = "Port the local edge server listens on.")]
    pub port: Option<u16>,
}

impl ClientConfig {
    pub fn defaults() -> Self {
        Self {
            api_url: Some("http://127.0.0.1:5000/".to_string()),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            heartbeat_interval_ms: Some(15_000),
            pong_timeout_ms: Some(5_000),
            reconnect_base_delay_ms: Some(1_000),
            reconnect_max_delay_ms: Some(1_000),
            resubscribe_wildcard: Some(false),
            port: Some(5000),
            ..Default::default()
        }
    }

    /// `other` overrides `self` for every field it sets.
    pub fn merge(self, other: ClientConfig) -> ClientConfig {
        ClientConfig {
            api_url: other.api_url.or(self.api_url),
            ws_url: other.ws_url.or(self.ws_url),
            auth_token: other.auth_token.or(self.auth_token),
            location: other.location.or(self.location),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            heartbeat_interval_ms: other.heartbeat_interval_ms.or(self.heartbeat_interval_ms),
            pong_timeout_ms: other.pong_timeout_ms.or(self.pong_timeout_ms),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            resubscribe_wildcard: other.resubscribe_wildcard.or(self.resubscribe_wildcard),
            port: other.port.or(self.port),
        }
    }

    pub fn from_file(path: &Path) -> Result<ClientConfig, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layers defaults, the config file and `overrides` (normally parsed
    /// from the command line and environment).
    ///
    /// A missing file is fine unless its path was given explicitly; an
    /// unreadable or malformed one is an error.
    pub fn layered(overrides: ClientConfig) -> Result<ClientConfig, ConfigError> {
        let explicit = overrides.config_path.clone();
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = ClientConfig::defaults();
        if explicit.is_some() || path.exists() {
            config = config.merge(ClientConfig::from_file(&path)?);
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults and overrides");
        }
        Ok(config.merge(overrides))
    }

    /// [`ClientConfig::layered`] over the process's arguments and environment.
    pub fn load() -> Result<ClientConfig, ConfigError> {
        ClientConfig::layered(ClientConfig::parse())
    }

    /// Validates and converts into runtime settings. Unset fields fall back
    /// to [`ClientConfig::defaults`].
    pub fn resolve(&self) -> Result<EdgeSettings, ConfigError> {
        let config = ClientConfig::defaults().merge(self.clone());

        let api_url = parse_url("api_url", config.api_url.as_deref().unwrap_or_default())?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "api_url",
                reason: format!("unsupported scheme {}", api_url.scheme()),
            });
        }
        let ws_url = match config.ws_url.as_deref() {
            Some(url) => parse_url("ws_url", url)?,
            None => derive_ws_url(&api_url)?,
        };
        if !matches!(ws_url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Invalid {
                field: "ws_url",
                reason: format!("unsupported scheme {}", ws_url.scheme()),
            });
        }

        let heartbeat_interval = positive_ms("heartbeat_interval_ms", config.heartbeat_interval_ms)?;
        let pong_timeout = positive_ms("pong_timeout_ms", config.pong_timeout_ms)?;
        let base_delay = positive_ms("reconnect_base_delay_ms", config.reconnect_base_delay_ms)?;
        let max_delay = positive_ms("reconnect_max_delay_ms", config.reconnect_max_delay_ms)?;
        if max_delay < base_delay {
            return Err(ConfigError::Invalid {
                field: "reconnect_max_delay_ms",
                reason: "must not be below reconnect_base_delay_ms".to_string(),
            });
        }

        let transport = TransportConfig {
            url: ws_url.to_string(),
            heartbeat_interval,
            pong_timeout,
            reconnect: ReconnectPolicy::exponential(base_delay, max_delay),
            ..TransportConfig::new(ws_url.as_str())
        };
        let multiplexer = MultiplexerConfig {
            resubscribe: if config.resubscribe_wildcard.unwrap_or(false) {
                ResubscribeMode::Wildcard
            } else {
                ResubscribeMode::OriginalFilter
            },
        };

        Ok(EdgeSettings {
            api_url,
            auth_token: config.auth_token.filter(|token| !token.is_empty()),
            location: config.location,
            log_dir: config.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: config.log_level.unwrap_or_else(|| "info".to_string()),
            port: config.port.unwrap_or(5000),
            transport,
            multiplexer,
        })
    }
}

/// Validated settings, ready to hand to the library.
#[derive(Debug, Clone)]
pub struct EdgeSettings {
    pub api_url: Url,
    pub auth_token: Option<String>,
    pub location: Option<String>,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub port: u16,
    pub transport: TransportConfig,
    pub multiplexer: MultiplexerConfig,
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::Url { field, source })
}

fn positive_ms(field: &'static str, value: Option<u64>) -> Result<Duration, ConfigError> {
    match value {
        Some(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::Invalid {
            field,
            reason: "must be a positive number of milliseconds".to_string(),
        }),
    }
}

/// `http(s)://host/api/` becomes `ws(s)://host/api/ws`.
fn derive_ws_url(api_url: &Url) -> Result<Url, ConfigError> {
    let scheme = if api_url.scheme() == "https" { "wss" } else { "ws" };
    let mut base = api_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    let mut ws = base
        .join("ws")
        .map_err(|source| ConfigError::Url { field: "ws_url", source })?;
    ws.set_scheme(scheme).map_err(|()| ConfigError::Invalid {
        field: "ws_url",
        reason: format!("cannot derive a {scheme} url from {api_url}"),
    })?;
    Ok(ws)
}
