//! Relay configuration
//!
//! Resolved from the command line and `RELAY_*` environment variables.

use std::env;

use tracing::warn;

/// Default bind address
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Default WebSocket endpoint path
pub const DEFAULT_PATH: &str = "/ws";

/// Default per-connection outbound buffer size
pub const DEFAULT_OUTBOUND_BUFFER: usize = 32;

/// Prompt written to every client before it sends its username
pub const HANDSHAKE_PROMPT: &str = "hello:";

/// Username assigned when the handshake read fails
pub const DEFAULT_USERNAME: &str = "Anonymous";

/// Runtime settings for the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Socket address to bind
    pub addr: String,
    /// Path accepted for WebSocket upgrades
    pub path: String,
    /// Capacity of each connection's outbound channel
    pub outbound_buffer: usize,
    /// Literal text frame opening the handshake
    pub handshake_prompt: String,
    /// Fallback username
    pub default_username: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            path: DEFAULT_PATH.to_string(),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            handshake_prompt: HANDSHAKE_PROMPT.to_string(),
            default_username: DEFAULT_USERNAME.to_string(),
        }
    }
}

impl RelayConfig {
    /// Load from process arguments and environment
    ///
    /// The bind address is the first argument, else `RELAY_ADDR`.
    pub fn from_env() -> Self {
        Self::resolve(env::args().nth(1), |key| env::var(key).ok())
    }

    /// Build a config from an optional address argument and a variable lookup
    pub fn resolve<F>(addr_arg: Option<String>, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let addr = addr_arg
            .or_else(|| var("RELAY_ADDR"))
            .unwrap_or(defaults.addr);

        let path = match var("RELAY_PATH") {
            Some(p) if p.starts_with('/') => p,
            Some(p) => format!("/{}", p),
            None => defaults.path,
        };

        let outbound_buffer = match var("RELAY_OUTBOUND_BUFFER") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(
                        "Invalid RELAY_OUTBOUND_BUFFER {:?}, using {}",
                        raw, DEFAULT_OUTBOUND_BUFFER
                    );
                    DEFAULT_OUTBOUND_BUFFER
                }
            },
            None => defaults.outbound_buffer,
        };

        Self {
            addr,
            path,
            outbound_buffer,
            ..defaults
        }
    }
}
