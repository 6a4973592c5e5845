//! Agent configuration

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sync_lib::source::{SourceConfig, DEFAULT_LOCAL_API};
use sync_lib::sync::{RemoteConfig, SyncConfig};
use url::Url;

/// Prefix of environment overrides, e.g. `ACTIVITY_SYNC_SERVER__REMOTE_URL`
pub const ENV_PREFIX: &str = "ACTIVITY_SYNC";

/// Agent configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server: ServerSection,
    pub sync: SyncSection,
    pub local: LocalSection,
    pub storage: StorageSection,
    pub observability: ObservabilitySection,
}

/// Remote ingestion service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Base URL; empty disables forwarding
    pub remote_url: String,
    /// Bearer token; empty sends no credential
    pub api_token: String,
}

/// Loop timing, all durations in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub interval: u64,
    pub batch_size: usize,
    pub backoff_max: u64,
    pub jitter_ratio: f64,
    pub heartbeat_interval: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            interval: 60,
            batch_size: 500,
            backoff_max: 900,
            jitter_ratio: 0.2,
            heartbeat_interval: 600,
        }
    }
}

/// Local activity service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalSection {
    pub api_url: String,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_LOCAL_API.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Checkpoint database; defaults to the user data directory
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObservabilitySection {
    /// Port for `/healthz`, `/readyz` and `/metrics`; disabled when unset
    pub metrics_port: Option<u16>,
}

/// `<data dir>/activity-sync`, falling back to the working directory
pub fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("activity-sync")
}

impl AgentConfig {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// Without an explicit file, `<data dir>/activity-sync/config.toml` is
    /// read if it exists.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);
        Self::load_from(file, environment)
    }

    fn load_from(file: Option<&Path>, environment: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        builder = match file {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(
                config::File::from(default_data_dir().join("config.toml")).required(false),
            ),
        };

        let loaded: Self = builder
            .add_source(environment)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 {
            bail!("sync.batch_size must be at least 1");
        }
        if self.sync.interval == 0 {
            bail!("sync.interval must be at least 1 second");
        }
        if let Some(url) = self.remote_url() {
            let parsed = Url::parse(url)
                .with_context(|| format!("server.remote_url is not a valid URL: {}", url))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                bail!("server.remote_url must use http or https, got {}", parsed.scheme());
            }
        }
        Ok(())
    }

    /// Remote base URL, `None` when forwarding is disabled
    pub fn remote_url(&self) -> Option<&str> {
        let url = self.server.remote_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("sync.db"))
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_secs(self.sync.interval),
            batch_size: self.sync.batch_size,
            backoff_max: Duration::from_secs(self.sync.backoff_max),
            jitter_ratio: self.sync.jitter_ratio,
            heartbeat_interval: Duration::from_secs(self.sync.heartbeat_interval),
            ..Default::default()
        }
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            base_url: self.local.api_url.clone(),
            ..Default::default()
        }
    }

    pub fn remote_config(&self) -> Option<RemoteConfig> {
        let endpoint = self.remote_url()?;
        let token = self.server.api_token.trim();
        Some(RemoteConfig {
            endpoint: endpoint.to_string(),
            api_token: (!token.is_empty()).then(|| token.to_string()),
            ..Default::default()
        })
    }
}
