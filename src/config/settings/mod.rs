
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::mcp::protocol::{Implementation, MCP_VERSION};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub probes: ProbeConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// How to launch the server under test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TargetConfig {
    pub interpreter: String,
    pub script: PathBuf,
    /// Environment variable that gets the working directory prepended
    pub search_path_var: String,
    pub working_dir: Option<PathBuf>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            script: PathBuf::from("server.py"),
            search_path_var: "PYTHONPATH".to_string(),
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
    pub latency_threshold_ms: u64,
    pub protocol_version: String,
    pub expected_server_name: String,
    pub client_name: String,
    pub client_version: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            latency_threshold_ms: 1000,
            protocol_version: MCP_VERSION.to_string(),
            expected_server_name: "crypto-trading".to_string(),
            client_name: "test-client".to_string(),
            client_version: "1.0.0".to_string(),
        }
    }
}

/// Optional HTTP transport wrapper in front of the server
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub endpoint: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid interpreter: {0:?} (cannot be empty)")]
    InvalidInterpreter(String),
    #[error("Invalid script path: {0} (cannot be empty)")]
    InvalidScript(String),
    #[error("Invalid search path variable: {0:?}")]
    InvalidSearchPathVar(String),
    #[error("Invalid timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid latency threshold: {0} (must be between 1 and 60000 milliseconds)")]
    InvalidLatencyThreshold(u64),
    #[error("Invalid protocol version: {0:?} (expected YYYY-MM-DD)")]
    InvalidProtocolVersion(String),
    #[error("Invalid expected server name: {0:?} (cannot be empty)")]
    InvalidServerName(String),
    #[error("Invalid client identity: {0:?} (name and version cannot be empty)")]
    InvalidClientIdentity(String),
    #[error("Invalid HTTP endpoint: {0} (must be an http or https URL)")]
    InvalidEndpoint(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".mcp-compliance"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("mcp-compliance"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the configuration from `path`, or from the default location
    ///
    /// A missing file yields the defaults.
    #[inline]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_file_path().context("Failed to determine config file path")?,
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to load config file: {}", config_path.display()))
    }

    #[inline]
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::from)?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target.validate()?;
        self.probes.validate()?;
        self.http.validate()?;
        Ok(())
    }
}

impl TargetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interpreter.trim().is_empty() {
            return Err(ConfigError::InvalidInterpreter(self.interpreter.clone()));
        }

        if self.script.as_os_str().is_empty() {
            return Err(ConfigError::InvalidScript(
                self.script.display().to_string(),
            ));
        }

        let var = &self.search_path_var;
        if var.is_empty() || var.contains('=') || var.contains('\0') {
            return Err(ConfigError::InvalidSearchPathVar(var.clone()));
        }

        Ok(())
    }

    /// Value of the search path variable with `cwd` prepended
    #[inline]
    pub fn search_path_value(&self, cwd: &Path, existing: Option<OsString>) -> OsString {
        let mut paths = vec![cwd.to_path_buf()];
        if let Some(existing) = existing.filter(|value| !value.is_empty()) {
            paths.extend(std::env::split_paths(&existing));
        }
        // split_paths output never contains the separator, so joining cannot fail
        std::env::join_paths(&paths).unwrap_or_else(|_| cwd.as_os_str().to_os_string())
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=300).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if !(1..=60_000).contains(&self.latency_threshold_ms) {
            return Err(ConfigError::InvalidLatencyThreshold(
                self.latency_threshold_ms,
            ));
        }

        if !is_protocol_version(&self.protocol_version) {
            return Err(ConfigError::InvalidProtocolVersion(
                self.protocol_version.clone(),
            ));
        }

        if self.expected_server_name.trim().is_empty() {
            return Err(ConfigError::InvalidServerName(
                self.expected_server_name.clone(),
            ));
        }

        if self.client_name.trim().is_empty() || self.client_version.trim().is_empty() {
            return Err(ConfigError::InvalidClientIdentity(format!(
                "{}/{}",
                self.client_name, self.client_version
            )));
        }

        Ok(())
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[inline]
    pub fn latency_threshold(&self) -> Duration {
        Duration::from_millis(self.latency_threshold_ms)
    }

    #[inline]
    pub fn client_info(&self) -> Implementation {
        Implementation {
            name: self.client_name.clone(),
            version: self.client_version.clone(),
        }
    }

    pub fn set_timeout_secs(&mut self, timeout_secs: u64) -> Result<(), ConfigError> {
        if !(1..=300).contains(&timeout_secs) {
            return Err(ConfigError::InvalidTimeout(timeout_secs));
        }
        self.timeout_secs = timeout_secs;
        Ok(())
    }

    pub fn set_expected_server_name(&mut self, name: String) -> Result<(), ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidServerName(name));
        }
        self.expected_server_name = name;
        Ok(())
    }
}

impl HttpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url().map(|_| ())
    }

    /// Parsed endpoint, `None` when no wrapper is configured
    pub fn endpoint_url(&self) -> Result<Option<Url>, ConfigError> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(None);
        };

        let url =
            Url::parse(endpoint).map_err(|_| ConfigError::InvalidEndpoint(endpoint.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidEndpoint(endpoint.clone()));
        }

        Ok(Some(url))
    }

    pub fn set_endpoint(&mut self, endpoint: String) -> Result<(), ConfigError> {
        let candidate = HttpConfig {
            endpoint: Some(endpoint),
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }
}

/// Protocol versions are dates of the form `YYYY-MM-DD`
fn is_protocol_version(version: &str) -> bool {
    chrono::NaiveDate::parse_from_str(version, "%Y-%m-%d").is_ok() && version.len() == 10
}
