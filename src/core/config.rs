/// Server Configuration
///
/// All settings come from environment variables and are read once at
/// startup. Unset variables take their defaults; unparseable numbers fall
/// back to the default with a warning.
///
/// Environment Variables:
/// - SERVER_NAME: Name reported by `initialize` (default: "mcp-sse-bridge")
/// - SERVER_VERSION: Version reported by `initialize` (default: crate version)
/// - MCP_TRANSPORT_MODE: "http", "stdio", or "both" (default: "http")
/// - HOST / PORT: HTTP bind address (default: 0.0.0.0:3000)
/// - WORKER_THREADS: HTTP workers (default: CPU count, max 16)
/// - SSE_KEEP_ALIVE_SECS: Keep-alive frame interval (default: 30)
/// - ECHO_PREFIX: Prefix prepended by the echo tool (default: empty)

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::core::session::DEFAULT_KEEP_ALIVE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid transport mode '{0}'. Must be 'stdio', 'http', or 'both'")]
    InvalidTransport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Http,
    Stdio,
    /// STDIO in the background, HTTP in the foreground
    Both,
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(TransportMode::Http),
            "stdio" => Ok(TransportMode::Stdio),
            "both" => Ok(TransportMode::Both),
            _ => Err(ConfigError::InvalidTransport(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub transport: TransportMode,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub keep_alive: Duration,
    pub echo_prefix: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let transport = get("MCP_TRANSPORT_MODE", "http").parse()?;
        let port = parse_or(&lookup, "PORT", 3000u16);
        let workers = parse_or(&lookup, "WORKER_THREADS", num_cpus::get().clamp(1, 16)).max(1);
        let keep_alive_secs = parse_or(&lookup, "SSE_KEEP_ALIVE_SECS", DEFAULT_KEEP_ALIVE.as_secs());

        Ok(Self {
            name: get("SERVER_NAME", "mcp-sse-bridge"),
            version: get("SERVER_VERSION", env!("CARGO_PKG_VERSION")),
            transport,
            host: get("HOST", "0.0.0.0"),
            port,
            workers,
            keep_alive: Duration::from_secs(keep_alive_secs.max(1)),
            echo_prefix: get("ECHO_PREFIX", ""),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            default
        }),
    }
}
