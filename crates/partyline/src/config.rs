//! Server configuration, read from the environment.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `PORT` | `3000` | TCP port to listen on |
//! | `PARTYLINE_HOST` | `0.0.0.0` | Interface to bind |
//! | `PARTYLINE_IDLE_TIMEOUT_SECS` | unset | Close connections silent this long |
//! | `PARTYLINE_OUTBOX_CAPACITY` | `256` | Events queued per connection before new ones are dropped |
//!
//! A value that does not parse is logged and the default is kept.

use std::str::FromStr;
use std::time::Duration;

use partyline_room::RegistryConfig;

/// Port used when `PORT` is unset or invalid.
pub const DEFAULT_PORT: u16 = 3000;

/// Interface used when `PARTYLINE_HOST` is unset.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Everything needed to start a [`PartylineServer`](crate::PartylineServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, as `host:port`.
    pub bind_addr: String,

    /// Close a connection after this long without an inbound frame.
    /// `None` keeps connections open indefinitely. `0` in the environment
    /// also means none.
    pub idle_timeout: Option<Duration>,

    /// Registry actor settings.
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("{DEFAULT_HOST}:{DEFAULT_PORT}"),
            idle_timeout: None,
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable
    /// name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = parse_or("PORT", lookup("PORT"), DEFAULT_PORT);
        let host = lookup("PARTYLINE_HOST")
            .map(|host| host.trim().to_owned())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let idle_secs: u64 = parse_or(
            "PARTYLINE_IDLE_TIMEOUT_SECS",
            lookup("PARTYLINE_IDLE_TIMEOUT_SECS"),
            0,
        );
        let idle_timeout = (idle_secs > 0).then(|| Duration::from_secs(idle_secs));

        let defaults = Self::default();
        let outbox_capacity = parse_or(
            "PARTYLINE_OUTBOX_CAPACITY",
            lookup("PARTYLINE_OUTBOX_CAPACITY"),
            defaults.registry.outbox_capacity,
        );

        Self {
            bind_addr: format!("{host}:{port}"),
            idle_timeout,
            registry: RegistryConfig {
                outbox_capacity,
                ..defaults.registry
            },
        }
    }
}

/// Parses `raw` when present, logging and falling back on failure.
fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }
    }
}
