//! Apache CloudStack support for cloud modules.
//!
//! CloudStack modules share a small amount of machinery:
//!
//! - [`CloudStackApi`]: the narrow capability modules are written against
//!   (`call` a command, `poll_job` until an async job is done). The HTTP
//!   implementation is [`CloudStackClient`]; tests inject fakes.
//! - [`EntityResolver`]: turns human-friendly names (account, domain, project,
//!   network, zone, VPC) into platform identifiers.
//! - [`ResultBuilder`]: maps fields of an API record onto the documented
//!   return values of a module.
//! - Common `api_*` parameters shared by every CloudStack module.
//!
//! ## Common Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `api_key` | No | API key (required together with `api_secret`) |
//! | `api_secret` | No | API secret (required together with `api_key`) |
//! | `api_url` | No | API endpoint URL |
//! | `api_http_method` | No | `get` or `post` (default: get) |
//! | `api_timeout` | No | HTTP timeout in seconds (default: 10) |
//! | `api_job_timeout` | No | Seconds to wait for an async job (default: no limit) |
//! | `api_region` | No | Configuration section to use (default: cloudstack) |

pub mod client;
pub mod ip_address;
pub mod resolver;

pub use client::CloudStackClient;
pub use ip_address::CsIpAddressModule;
pub use resolver::{EntityKind, EntityResolver};

use crate::config::{ApiConfig, Config, HttpMethod, DEFAULT_POLL_INTERVAL_SECS};
use crate::modules::{ModuleError, ModuleOutput, ModuleParams, ModuleResult, ParamExt};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Async job is still running
pub const JOB_PENDING: i64 = 0;

/// Async job failed
pub const JOB_FAILED: i64 = 2;

/// Parameters every CloudStack module accepts
pub const API_PARAMS: &[&str] = &[
    "api_key",
    "api_secret",
    "api_url",
    "api_http_method",
    "api_timeout",
    "api_job_timeout",
    "api_region",
];

/// Record fields every CloudStack module returns, as `(record key, return key)`
pub const COMMON_RETURNS: &[(&str, &str)] = &[
    ("id", "id"),
    ("name", "name"),
    ("displaytext", "display_text"),
    ("zonename", "zone"),
    ("project", "project"),
    ("account", "account"),
    ("domain", "domain"),
];

/// Arguments of a single API command.
///
/// Kept sorted by key, which is the order CloudStack signs them in. Unset
/// optional values are never inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiArgs(BTreeMap<String, String>);

impl ApiArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Add an argument only when a value is present
    pub fn with_opt(mut self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        if let Some(value) = value {
            self.0.insert(key.into(), value.to_string());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Capability a CloudStack module needs from the platform
#[async_trait]
pub trait CloudStackApi: Send + Sync {
    /// Issue an API command and return the unwrapped `<command>response` object
    async fn call(&self, command: &str, args: &ApiArgs) -> ModuleResult<Value>;

    /// Delay between two `queryAsyncJobResult` calls
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
    }

    /// Maximum time to wait for an async job; `None` waits until it finishes
    fn job_timeout(&self) -> Option<Duration> {
        None
    }

    /// Wait for the async job referenced by `job` to finish.
    ///
    /// Responses without a `jobid` are returned unchanged. On success the job
    /// result is returned, narrowed to `key` when given.
    async fn poll_job(&self, job: &Value, key: Option<&str>) -> ModuleResult<Option<Value>> {
        let Some(job_id) = job.get("jobid").and_then(value_to_string) else {
            return Ok(Some(job.clone()));
        };

        let started = Instant::now();
        let args = ApiArgs::new().with("jobid", &job_id);

        loop {
            let res = self.call("queryAsyncJobResult", &args).await?;
            let status = res
                .get("jobstatus")
                .and_then(Value::as_i64)
                .unwrap_or(JOB_PENDING);

            if status != JOB_PENDING {
                let result = res.get("jobresult").cloned().unwrap_or(Value::Null);
                if let Some(text) = result.get("errortext").and_then(value_to_string) {
                    return Err(ModuleError::JobFailed(text));
                }
                if status == JOB_FAILED {
                    return Err(ModuleError::JobFailed(format!("async job {} failed", job_id)));
                }

                tracing::debug!("Async job {} finished", job_id);
                return Ok(match key {
                    Some(k) => result.get(k).cloned(),
                    None => Some(result),
                });
            }

            if let Some(timeout) = self.job_timeout() {
                if started.elapsed() >= timeout {
                    return Err(ModuleError::Timeout {
                        job_id,
                        timeout_secs: timeout.as_secs(),
                    });
                }
            }

            tokio::time::sleep(self.poll_interval()).await;
        }
    }
}

/// Render a scalar record field as a string
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Items of a list response, e.g. `zone` of `listZones`.
///
/// CloudStack answers an empty list with `{}`, so a missing key is empty.
pub fn list_items(response: &Value, key: &str) -> Vec<Value> {
    response
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Maps record fields onto module return values
#[derive(Debug, Clone)]
pub struct ResultBuilder {
    returns: Vec<(&'static str, &'static str)>,
}

impl Default for ResultBuilder {
    fn default() -> Self {
        Self {
            returns: COMMON_RETURNS.to_vec(),
        }
    }
}

impl ResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also return `search_key` of the record as `return_key`
    pub fn with_return(mut self, search_key: &'static str, return_key: &'static str) -> Self {
        self.returns.push((search_key, return_key));
        self
    }

    /// Copy mapped fields of `record` into the output data
    pub fn apply(&self, mut output: ModuleOutput, record: Option<&Value>) -> ModuleOutput {
        if let Some(record) = record {
            for (search_key, return_key) in &self.returns {
                match record.get(*search_key) {
                    Some(Value::Null) | None => {}
                    Some(value) => {
                        output.data.insert((*return_key).to_string(), value.clone());
                    }
                }
            }
        }
        output
    }
}

/// Validate the common `api_*` parameters
pub fn validate_api_params(params: &ModuleParams) -> ModuleResult<()> {
    let key = params.get_string("api_key")?;
    let secret = params.get_string("api_secret")?;
    if key.is_some() != secret.is_some() {
        return Err(ModuleError::InvalidParameter(
            "parameters are required together: api_key, api_secret".to_string(),
        ));
    }

    if let Some(method) = params.get_string("api_http_method")? {
        if HttpMethod::parse(&method).is_none() {
            return Err(ModuleError::InvalidParameter(format!(
                "Invalid api_http_method '{}'. Valid values: get, post",
                method
            )));
        }
    }

    params.get_u64("api_timeout")?;
    params.get_u64("api_job_timeout")?;
    Ok(())
}

/// Effective API settings: module parameters over environment over config file
pub fn api_config_from_params(params: &ModuleParams, config: &Config) -> ModuleResult<ApiConfig> {
    let region = params.get_string("api_region")?;
    let mut api = config.api_config(region.as_deref())?;

    if let Some(url) = params.get_string("api_url")? {
        api.endpoint = Some(url);
    }
    if let Some(key) = params.get_string("api_key")? {
        api.key = Some(key);
    }
    if let Some(secret) = params.get_string("api_secret")? {
        api.secret = Some(secret);
    }
    if let Some(method) = params.get_string("api_http_method")? {
        api.method = HttpMethod::parse(&method).ok_or_else(|| {
            ModuleError::InvalidParameter(format!("Invalid api_http_method '{}'", method))
        })?;
    }
    if let Some(timeout) = params.get_u64("api_timeout")? {
        api.timeout = timeout;
    }
    if let Some(timeout) = params.get_u64("api_job_timeout")? {
        api.job_timeout = Some(timeout);
    }

    Ok(api)
}
