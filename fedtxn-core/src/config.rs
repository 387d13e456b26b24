use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    /// Idle time after which an inactive transaction is aborted by the sweep.
    pub idle_timeout_seconds: u64,
    /// Interval between idle sweeps.
    pub idle_check_interval_seconds: u64,
    /// Maximum number of commit/abort calls in flight per transaction.
    pub max_finishing_concurrency: usize,
    /// Whether the status endpoint is served.
    pub status_enabled: bool,
    pub status_host: String,
    pub status_port: u16,
    /// Path prefix for the status routes, e.g. "/fedtxn".
    pub status_path_prefix: String,
    /// Log format: "compact" or "json".
    pub log_format: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 300,
            idle_check_interval_seconds: 60,
            max_finishing_concurrency: 1,
            status_enabled: true,
            status_host: "0.0.0.0".to_string(),
            status_port: 4215,
            status_path_prefix: String::new(),
            log_format: "compact".to_string(),
        }
    }
}

impl CoordinatorConfig {
    pub fn load() -> anyhow::Result<Self> {
        let defaults_json = serde_json::to_string(&Self::default())
            .with_context(|| "failed to serialize defaults")?;
        let settings = config::Config::builder()
            .add_source(
                config::File::from_str(&defaults_json, config::FileFormat::Json).required(false),
            )
            .add_source(config::Environment::with_prefix("FEDTXN"))
            .build()
            .with_context(|| "failed to load configuration")?;
        let cfg: CoordinatorConfig = settings
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_seconds)
    }

    pub fn status_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.status_host, self.status_port);
        addr.to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("unable to resolve status address for {addr}"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_finishing_concurrency == 0 {
            anyhow::bail!("max_finishing_concurrency must be at least 1");
        }
        if self.idle_check_interval_seconds == 0 {
            anyhow::bail!("idle_check_interval_seconds must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.idle_check_interval(), Duration::from_secs(60));
    }

    #[test]
    fn zero_finishing_concurrency_is_rejected() {
        let config = CoordinatorConfig {
            max_finishing_concurrency: 0,
            ..CoordinatorConfig::default()
        };
        let err = config.validate().err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("max_finishing_concurrency must be at least 1")
        );
    }

    #[test]
    fn zero_check_interval_is_rejected() {
        let config = CoordinatorConfig {
            idle_check_interval_seconds: 0,
            ..CoordinatorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn status_addr_resolves_loopback() -> anyhow::Result<()> {
        let config = CoordinatorConfig {
            status_host: "127.0.0.1".to_string(),
            status_port: 9000,
            ..CoordinatorConfig::default()
        };
        assert_eq!(config.status_addr()?.port(), 9000);
        Ok(())
    }
}
