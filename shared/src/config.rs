//! Runtime configuration: defaults, optional TOML file, then env overrides.
//! Binaries apply their CLI flags on top.

use log::{debug, warn};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_REGISTRY_URL: &str = "PONG_REGISTRY_URL";
pub const ENV_PORT: &str = "PONG_PORT";
pub const ENV_TRANSPORT: &str = "PONG_TRANSPORT";

/// How state and input travel between the peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// TCP straight to the host; the host needs a reachable port.
    #[default]
    Direct,
    /// Through the matchmaking service's relay endpoints.
    Relay,
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(TransportMode::Direct),
            "relay" => Ok(TransportMode::Relay),
            other => Err(format!("unknown transport '{}', expected direct or relay", other)),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Direct => f.write_str("direct"),
            TransportMode::Relay => f.write_str("relay"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetplayConfig {
    pub transport: TransportMode,
    /// Base URL of the matchmaking/relay service.
    pub registry_url: String,
    /// Timeout for control-plane registry calls (create/join/update/close).
    pub registry_timeout_ms: u64,
    /// Timeout for a single relay poll or push.
    pub relay_timeout_ms: u64,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Relay state pushes per second.
    pub broadcast_rate: u32,
    /// Relay polls per second (state on the remote, input on the host).
    pub relay_poll_rate: u32,
    /// Queued remote inputs pushed per second in relay mode.
    pub input_drain_rate: u32,
    /// Direct-socket silence after which the link is logged as stalled.
    pub idle_timeout_ms: u64,
    pub win_score: u32,
    /// TCP port for direct mode.
    pub port: u16,
}

impl Default for NetplayConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::Direct,
            registry_url: "http://127.0.0.1:8000".to_string(),
            registry_timeout_ms: 10_000,
            relay_timeout_ms: 80,
            tick_rate: 60,
            broadcast_rate: 60,
            relay_poll_rate: 30,
            input_drain_rate: 100,
            idle_timeout_ms: 5_000,
            win_score: 5,
            port: 5555,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value: {0}")]
    Invalid(String),
}

fn rate_period(rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / rate.max(1) as f64)
}

impl NetplayConfig {
    /// Defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                debug!("Loaded config from {}", path.display());
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_REGISTRY_URL) {
            self.registry_url = url;
        }
        if let Ok(s) = std::env::var(ENV_PORT) {
            match s.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => warn!("Ignoring {}={}: not a port number", ENV_PORT, s),
            }
        }
        if let Ok(s) = std::env::var(ENV_TRANSPORT) {
            match s.parse() {
                Ok(mode) => self.transport = mode,
                Err(e) => warn!("Ignoring {}: {}", ENV_TRANSPORT, e),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("tick_rate", self.tick_rate),
            ("broadcast_rate", self.broadcast_rate),
            ("relay_poll_rate", self.relay_poll_rate),
            ("input_drain_rate", self.input_drain_rate),
        ];
        for (name, rate) in rates {
            if rate == 0 || rate > 1000 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 1 and 1000, got {}",
                    name, rate
                )));
            }
        }
        if self.win_score == 0 {
            return Err(ConfigError::Invalid("win_score must be at least 1".into()));
        }
        if self.relay_timeout_ms == 0 {
            return Err(ConfigError::Invalid("relay_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn tick_duration(&self) -> Duration {
        rate_period(self.tick_rate)
    }

    pub fn broadcast_interval(&self) -> Duration {
        rate_period(self.broadcast_rate)
    }

    pub fn relay_poll_interval(&self) -> Duration {
        rate_period(self.relay_poll_rate)
    }

    pub fn input_drain_interval(&self) -> Duration {
        rate_period(self.input_drain_rate)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}
