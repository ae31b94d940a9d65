//! Configuration module for Rustible CloudStack
//!
//! Handles loading and merging CloudStack API configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/cloudstack/cloudstack.toml)
//! - User configuration (~/.cloudstack.toml)
//! - Project configuration (./cloudstack.toml)
//! - Environment variables
//! - Module parameters (applied by the module itself)
//!
//! A configuration file holds one section per region. The default region is
//! `cloudstack`:
//!
//! ```toml
//! [cloudstack]
//! endpoint = "https://cloud.example.com/client/api"
//! key = "api key"
//! secret = "api secret"
//!
//! [lab]
//! endpoint = "http://lab.local:8080/client/api"
//! key = "..."
//! secret = "..."
//! method = "post"
//! timeout = 30
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the region used when none is requested
pub const DEFAULT_REGION: &str = "cloudstack";

/// Default HTTP timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default delay between async job polls in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// HTTP method used to send API requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    /// Parse a method name as accepted by `api_http_method`
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "get"),
            HttpMethod::Post => write!(f, "post"),
        }
    }
}

/// Connection settings for one CloudStack region
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API endpoint, e.g. `https://cloud.example.com/client/api`
    pub endpoint: Option<String>,

    /// API key
    pub key: Option<String>,

    /// API secret used to sign requests
    pub secret: Option<String>,

    /// HTTP method for API requests
    pub method: HttpMethod,

    /// HTTP timeout in seconds
    pub timeout: u64,

    /// Seconds between async job polls
    pub poll_interval: u64,

    /// Give up waiting for an async job after this many seconds
    pub job_timeout: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            key: None,
            secret: None,
            method: HttpMethod::Get,
            timeout: DEFAULT_TIMEOUT_SECS,
            poll_interval: DEFAULT_POLL_INTERVAL_SECS,
            job_timeout: None,
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &self.key)
            .field("secret", &self.secret.as_ref().map(|_| "********"))
            .field("method", &self.method)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("job_timeout", &self.job_timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // CLOUDSTACK_ENDPOINT
        if let Ok(endpoint) = std::env::var("CLOUDSTACK_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }

        // CLOUDSTACK_KEY
        if let Ok(key) = std::env::var("CLOUDSTACK_KEY") {
            self.key = Some(key);
        }

        // CLOUDSTACK_SECRET
        if let Ok(secret) = std::env::var("CLOUDSTACK_SECRET") {
            self.secret = Some(secret);
        }

        // CLOUDSTACK_METHOD
        if let Ok(method) = std::env::var("CLOUDSTACK_METHOD") {
            match HttpMethod::parse(&method) {
                Some(m) => self.method = m,
                None => tracing::warn!("Ignoring invalid CLOUDSTACK_METHOD '{}'", method),
            }
        }

        // CLOUDSTACK_TIMEOUT
        if let Ok(timeout) = std::env::var("CLOUDSTACK_TIMEOUT") {
            if let Ok(n) = timeout.parse() {
                self.timeout = n;
            }
        }
    }
}

/// Main configuration structure: API settings keyed by region name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub regions: HashMap<String, ApiConfig>,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        Ok(config)
    }

    /// Get the list of configuration file paths to check, lowest priority first
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Explicit path takes priority
        if let Some(path) = explicit_path {
            paths.push(path.clone());
            return paths;
        }

        // System-wide config
        paths.push(PathBuf::from("/etc/cloudstack/cloudstack.toml"));

        // User config
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".cloudstack.toml"));
        }

        // Project config (current directory)
        paths.push(PathBuf::from("cloudstack.toml"));

        // Environment variable
        if let Ok(env_config) = std::env::var("CLOUDSTACK_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let file_config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .map_err(|e| Error::config_parse(path, e.to_string()))?,
            "json" => serde_json::from_str(&content)
                .map_err(|e| Error::config_parse(path, e.to_string()))?,
            "toml" => {
                toml::from_str(&content).map_err(|e| Error::config_parse(path, e.to_string()))?
            }
            _ => {
                // Try TOML first, then YAML
                toml::from_str(&content)
                    .or_else(|_| serde_yaml::from_str(&content))
                    .map_err(|e| Error::config_parse(path, e.to_string()))?
            }
        };

        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; sections in `other` replace ours
    fn merge(&self, other: Config) -> Config {
        let mut regions = self.regions.clone();
        regions.extend(other.regions);
        Config { regions }
    }

    /// Load from a specific file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Config::default().merge_from_file(path.as_ref())
    }

    /// Resolve the effective API settings for a region.
    ///
    /// `region` falls back to `CLOUDSTACK_REGION`, then [`DEFAULT_REGION`]. A
    /// missing default section is not an error; an explicitly requested one is.
    pub fn api_config(&self, region: Option<&str>) -> Result<ApiConfig> {
        let env_region = std::env::var("CLOUDSTACK_REGION").ok();
        let name = region
            .map(str::to_string)
            .or(env_region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut api = match self.regions.get(&name) {
            Some(section) => section.clone(),
            None if name == DEFAULT_REGION || self.regions.is_empty() => ApiConfig::default(),
            None => return Err(Error::RegionNotFound(name)),
        };

        api.apply_env_overrides();
        Ok(api)
    }
}
