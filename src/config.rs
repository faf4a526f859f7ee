use crate::constants::{DEFAULT_API_URL, DEFAULT_DATA_DIR, DEFAULT_EXPECTED_STATUS, DEFAULT_LOG_DIR};
use crate::error::{RelayError, Result};
use crate::pipeline::CommitMode;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

// Environment variable names
pub const ENV_ADMIN_TOKEN: &str = "GH_LOGS_ENTERPRISE_ADMIN_TOKEN";
pub const ENV_ENTERPRISE_ID: &str = "GH_LOGS_ENTERPRISE_ID";
pub const ENV_API_URL: &str = "GH_LOGS_API_URL";
pub const ENV_FORWARD_URL: &str = "GH_LOGS_FORWARD_ENDPOINT_URL";
pub const ENV_FORWARD_TOKEN: &str = "GH_LOGS_FORWARD_ENDPOINT_AUTH_TOKEN";
pub const ENV_FORWARD_EXPECTED_STATUS: &str = "GH_LOGS_FORWARD_EXPECTED_STATUS";
pub const ENV_POLL_INTERVAL_SECS: &str = "GH_LOGS_POLL_INTERVAL_SECS";
pub const ENV_DATA_DIR: &str = "GH_LOGS_DATA_DIR";
pub const ENV_LOG_DIR: &str = "GH_LOGS_LOG_DIR";
pub const ENV_METRICS_ADDR: &str = "GH_LOGS_METRICS_ADDR";
pub const ENV_CURSOR_COMMIT: &str = "GH_LOGS_CURSOR_COMMIT";

/// Token that never shows up in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Optional TOML config file; every key mirrors an environment variable.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub admin_token: Option<String>,
    pub enterprise_id: Option<String>,
    pub forward_endpoint_url: Option<String>,
    pub forward_auth_token: Option<String>,
    pub forward_expected_status: Option<u16>,
    pub poll_interval_secs: Option<u64>,
    pub data_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub cursor_commit: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            RelayError::Config(format!("Failed to parse config file '{}': {}", path.display(), e))
        })
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub api_url: String,
    pub admin_token: Secret,
    pub enterprise_id: String,
}

#[derive(Debug, Clone)]
pub struct ForwardConfig {
    pub endpoint_url: String,
    pub auth_token: Secret,
    pub expected_status: u16,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub source: SourceConfig,
    /// `None` when the downstream endpoint is not configured.
    pub forward: Option<ForwardConfig>,
    pub poll_interval: Option<Duration>,
    pub data_dir: PathBuf,
    pub metrics_addr: Option<SocketAddr>,
    pub commit_mode: CommitMode,
}

/// File values overlaid by environment values; blank environment values count as unset.
pub struct Layers<'a> {
    file: &'a FileConfig,
    env: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> Layers<'a> {
    pub fn new(file: &'a FileConfig, env: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { file, env }
    }

    fn get(&self, key: &str, from_file: Option<String>) -> Option<String> {
        (self.env)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or(from_file)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, from_file: Option<T>) -> Result<Option<T>>
    where
        T::Err: fmt::Display,
    {
        match (self.env)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| RelayError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
            None => Ok(from_file),
        }
    }

    fn require(&self, key: &str, from_file: Option<String>) -> Result<String> {
        self.get(key, from_file)
            .ok_or_else(|| RelayError::Config(format!("Please set {}", key)))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.get(ENV_DATA_DIR, self.file.data_dir.as_ref().map(|p| p.display().to_string()))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.get(ENV_LOG_DIR, self.file.log_dir.as_ref().map(|p| p.display().to_string()))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
    }

    pub fn relay_config(&self) -> Result<RelayConfig> {
        let file = self.file;

        let source = SourceConfig {
            api_url: self
                .get(ENV_API_URL, file.api_url.clone())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            admin_token: Secret(self.require(ENV_ADMIN_TOKEN, file.admin_token.clone())?),
            enterprise_id: self.require(ENV_ENTERPRISE_ID, file.enterprise_id.clone())?,
        };

        let expected_status = self
            .parse::<u16>(ENV_FORWARD_EXPECTED_STATUS, file.forward_expected_status)?
            .unwrap_or(DEFAULT_EXPECTED_STATUS);
        let forward = match (
            self.get(ENV_FORWARD_URL, file.forward_endpoint_url.clone()),
            self.get(ENV_FORWARD_TOKEN, file.forward_auth_token.clone()),
        ) {
            (Some(endpoint_url), Some(token)) => Some(ForwardConfig {
                endpoint_url,
                auth_token: Secret(token),
                expected_status,
            }),
            _ => None,
        };

        let poll_interval = self
            .parse::<u64>(ENV_POLL_INTERVAL_SECS, file.poll_interval_secs)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let metrics_addr = self.parse::<SocketAddr>(
            ENV_METRICS_ADDR,
            match &file.metrics_addr {
                Some(raw) => Some(raw.parse().map_err(|e| {
                    RelayError::Config(format!("metrics_addr has invalid value '{}': {}", raw, e))
                })?),
                None => None,
            },
        )?;

        let commit_mode = match self.get(ENV_CURSOR_COMMIT, file.cursor_commit.clone()) {
            Some(raw) => CommitMode::parse(&raw).ok_or_else(|| {
                RelayError::Config(format!(
                    "{} must be 'after-forward' or 'before-forward', got '{}'",
                    ENV_CURSOR_COMMIT, raw
                ))
            })?,
            None => CommitMode::default(),
        };

        Ok(RelayConfig {
            source,
            forward,
            poll_interval,
            data_dir: self.data_dir(),
            metrics_addr,
            commit_mode,
        })
    }
}

/// Reads the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
