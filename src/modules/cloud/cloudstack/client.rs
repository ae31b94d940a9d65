//! HTTP client for the CloudStack API.
//!
//! Every request carries `command`, `response=json` and `apiKey` next to the
//! command arguments, and is signed:
//!
//! 1. sort the parameters by name and join them as `key=value` pairs, values
//!    percent-encoded;
//! 2. lower-case the whole string;
//! 3. HMAC-SHA1 it with the API secret and base64 the digest;
//! 4. append the result as `signature`.
//!
//! GET requests carry the signed query in the URL, POST requests send it as
//! a form-encoded body.

use super::{value_to_string, ApiArgs, CloudStackApi};
use crate::config::{ApiConfig, HttpMethod};
use crate::modules::{ModuleError, ModuleResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{header, Client};
use serde_json::Value;
use sha1::Sha1;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// Longest slice of an unexpected response body quoted in errors
const MAX_BODY_EXCERPT: usize = 200;

/// CloudStack API client backed by reqwest
pub struct CloudStackClient {
    http: Client,
    endpoint: String,
    api_key: String,
    secret: String,
    method: HttpMethod,
    poll_interval: Duration,
    job_timeout: Option<Duration>,
}

impl CloudStackClient {
    /// Build a client from resolved API settings
    pub fn new(config: &ApiConfig) -> ModuleResult<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ModuleError::MissingParameter("api_url".to_string()))?;
        Url::parse(&endpoint).map_err(|e| {
            ModuleError::InvalidParameter(format!("Invalid api_url '{}': {}", endpoint, e))
        })?;

        let api_key = config
            .key
            .clone()
            .ok_or_else(|| ModuleError::MissingParameter("api_key".to_string()))?;
        let secret = config
            .secret
            .clone()
            .ok_or_else(|| ModuleError::MissingParameter("api_secret".to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| {
                ModuleError::ExecutionFailed(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            secret,
            method: config.method,
            poll_interval: Duration::from_secs(config.poll_interval),
            job_timeout: config.job_timeout.map(Duration::from_secs),
        })
    }

    /// Unsigned, sorted query string for a command
    pub fn query_string(&self, command: &str, args: &ApiArgs) -> String {
        let mut params: BTreeMap<&str, &str> = args.iter().collect();
        params.insert("command", command);
        params.insert("response", "json");
        params.insert("apiKey", &self.api_key);

        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Signature of an unsigned query string
    pub fn sign(secret: &str, query: &str) -> ModuleResult<String> {
        let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).map_err(|e| {
            ModuleError::ExecutionFailed(format!("Failed to initialize request signing: {}", e))
        })?;
        mac.update(query.to_lowercase().as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    fn signed_query(&self, command: &str, args: &ApiArgs) -> ModuleResult<String> {
        let query = self.query_string(command, args);
        let signature = Self::sign(&self.secret, &query)?;
        Ok(format!("{}&signature={}", query, encode(&signature)))
    }
}

/// Percent-encode a value the way CloudStack expects (`*` stays literal)
fn encode(value: &str) -> String {
    urlencoding::encode(value).replace("%2A", "*")
}

fn excerpt(body: &str) -> String {
    body.chars().take(MAX_BODY_EXCERPT).collect()
}

/// Unwrap the `<command>response` object of an API answer
pub(crate) fn parse_response(command: &str, status: u16, body: &str) -> ModuleResult<Value> {
    let success = (200..300).contains(&status);

    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) if !success => {
            return Err(ModuleError::Http(format!(
                "HTTP {} from CloudStack: {}",
                status,
                excerpt(body)
            )))
        }
        Err(e) => {
            return Err(ModuleError::Http(format!(
                "Invalid JSON in {} response: {}",
                command, e
            )))
        }
    };

    let key = format!("{}response", command.to_lowercase());
    let inner = json.get(&key).cloned().or_else(|| {
        // errors sometimes come back as `errorresponse`
        json.as_object()
            .filter(|o| o.len() == 1)
            .and_then(|o| o.values().next().cloned())
    });

    if let Some(text) = inner
        .as_ref()
        .and_then(|i| i.get("errortext"))
        .and_then(value_to_string)
    {
        let code = inner
            .as_ref()
            .and_then(|i| i.get("errorcode"))
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(u32::from(status));
        return Err(ModuleError::Api {
            code,
            message: text,
        });
    }

    if !success {
        return Err(ModuleError::Api {
            code: u32::from(status),
            message: format!("HTTP {} for {}", status, command),
        });
    }

    inner.ok_or_else(|| {
        ModuleError::ExecutionFailed(format!(
            "Unexpected response to {}: {}",
            command,
            excerpt(body)
        ))
    })
}

#[async_trait]
impl CloudStackApi for CloudStackClient {
    async fn call(&self, command: &str, args: &ApiArgs) -> ModuleResult<Value> {
        let query = self.signed_query(command, args)?;
        tracing::debug!("CloudStack API call: {} ({} args)", command, args.len());

        let request = match self.method {
            HttpMethod::Get => self.http.get(format!("{}?{}", self.endpoint, query)),
            HttpMethod::Post => self
                .http
                .post(&self.endpoint)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(query),
        };

        let response = request
            .send()
            .await
            .map_err(|e| ModuleError::Http(format!("{} request failed: {}", command, e)))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            ModuleError::Http(format!("Failed to read {} response: {}", command, e))
        })?;

        parse_response(command, status, &body)
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout
    }
}
