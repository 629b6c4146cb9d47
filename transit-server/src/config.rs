//! Process configuration.
//!
//! Deployment settings come from the environment; algorithm tunables keep
//! their `Default` values unless a caller overrides them in code.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::notify::NotificationConfig;
use crate::planner::SearchConfig;
use crate::quorum::ThresholdConfig;
use crate::sweep::SweepConfig;
use crate::trust::TrustConfig;

pub const ADDR_VAR: &str = "TRANSIT_ADDR";
pub const DATA_VAR: &str = "TRANSIT_DATA";
pub const STORE_TIMEOUT_VAR: &str = "TRANSIT_STORE_TIMEOUT_MS";

/// Error reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {var}={value:?}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Everything needed to wire the server.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: SocketAddr,

    /// Reference data snapshot; the network starts empty when unset.
    pub data_path: Option<PathBuf>,

    pub store_timeout_ms: u64,

    pub search: SearchConfig,
    pub threshold: ThresholdConfig,
    pub trust: TrustConfig,
    pub notification: NotificationConfig,
    pub sweep: SweepConfig,
}

impl AppConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Read deployment settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read deployment settings through `lookup`; unset variables keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ADDR_VAR) {
            config.addr = value.parse().map_err(|e: std::net::AddrParseError| ConfigError {
                var: ADDR_VAR,
                value: value.clone(),
                reason: e.to_string(),
            })?;
        }

        if let Some(value) = lookup(DATA_VAR).filter(|v| !v.trim().is_empty()) {
            config.data_path = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup(STORE_TIMEOUT_VAR) {
            config.store_timeout_ms = match value.trim().parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError {
                        var: STORE_TIMEOUT_VAR,
                        value,
                        reason: "must be positive".into(),
                    });
                }
                Ok(ms) => ms,
                Err(e) => {
                    return Err(ConfigError {
                        var: STORE_TIMEOUT_VAR,
                        value,
                        reason: e.to_string(),
                    });
                }
            };
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_path: None,
            store_timeout_ms: 2000,
            search: SearchConfig::default(),
            threshold: ThresholdConfig::default(),
            trust: TrustConfig::default(),
            notification: NotificationConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}
