//! Shared test utilities and fixtures for the CloudStack module tests.
//!
//! This module provides:
//! - An in-memory CloudStack API that serves canned responses
//! - Scripted async job results and failure injection
//! - Call recording for asserting which commands were issued
//! - Parameter builders
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};

use rustible_cloudstack::modules::cloud::cloudstack::{ApiArgs, CloudStackApi};
use rustible_cloudstack::modules::{ModuleError, ModuleParams, ModuleResult};

/// Commands that change platform state
pub const MUTATING_COMMANDS: &[&str] = &["associateIpAddress", "disassociateIpAddress"];

// ============================================================================
// Fake CloudStack API
// ============================================================================

/// In-memory CloudStack API.
///
/// Each command answers with the response registered for it, or `{}`.
/// `queryAsyncJobResult` pops scripted job states and reports success once
/// the script runs out.
///
/// # Example
///
/// ```rust,ignore
/// let api = FakeCloudStack::with_directory();
/// api.set_response("associateIpAddress", json!({"id": "ip-1", "jobid": "job-1"}));
///
/// let module = CsIpAddressModule::with_api(api.clone());
/// // ...
/// assert_eq!(api.count("associateIpAddress"), 1);
/// ```
#[derive(Debug, Default)]
pub struct FakeCloudStack {
    responses: RwLock<HashMap<String, Value>>,
    jobs: RwLock<VecDeque<Value>>,
    final_job: RwLock<Option<Value>>,
    failures: RwLock<HashMap<String, (u32, String)>>,
    calls: RwLock<Vec<(String, ApiArgs)>>,
}

impl FakeCloudStack {
    /// Create an empty fake
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a fake that knows one zone, one network and one VPC
    pub fn with_directory() -> Arc<Self> {
        let api = Self::new();
        api.set_response(
            "listZones",
            json!({"count": 1, "zone": [{"id": "zone-1", "name": "ch-gva-2"}]}),
        );
        api.set_response(
            "listNetworks",
            json!({"count": 1, "network": [
                {"id": "net-1", "name": "my-network", "displaytext": "My Network"}
            ]}),
        );
        api.set_response(
            "listVPCs",
            json!({"count": 1, "vpc": [
                {"id": "vpc-1", "name": "prod-vpc", "displaytext": "Production VPC"}
            ]}),
        );
        api.set_response(
            "listDomains",
            json!({"count": 2, "domain": [
                {"id": "dom-root", "name": "ROOT", "path": "ROOT"},
                {"id": "dom-cust", "name": "customers", "path": "ROOT/customers"}
            ]}),
        );
        api.set_response(
            "listAccounts",
            json!({"count": 1, "account": [{"id": "acc-1", "name": "acme"}]}),
        );
        api
    }

    /// Register the response for a command
    pub fn set_response(&self, command: &str, response: Value) {
        self.responses.write().insert(command.to_string(), response);
    }

    /// Make `listPublicIpAddresses` return the given records
    pub fn set_public_ips(&self, records: Vec<Value>) {
        self.set_response(
            "listPublicIpAddresses",
            json!({"count": records.len(), "publicipaddress": records}),
        );
    }

    /// Queue one `queryAsyncJobResult` answer
    pub fn push_job_state(&self, state: Value) {
        self.jobs.write().push_back(state);
    }

    /// Answer once pending, then successfully with `result`
    pub fn job_succeeds_with(&self, result: Value) {
        self.push_job_state(json!({"jobstatus": 0}));
        *self.final_job.write() = Some(json!({"jobstatus": 1, "jobresult": result}));
    }

    /// Make a command fail with a CloudStack API error
    pub fn fail_command(&self, command: &str, code: u32, message: &str) {
        self.failures
            .write()
            .insert(command.to_string(), (code, message.to_string()));
    }

    /// All commands issued, in order
    pub fn commands(&self) -> Vec<String> {
        self.calls.read().iter().map(|(c, _)| c.clone()).collect()
    }

    /// Number of times `command` was issued
    pub fn count(&self, command: &str) -> usize {
        self.calls.read().iter().filter(|(c, _)| c == command).count()
    }

    /// Arguments of the first call to `command`
    pub fn args_of(&self, command: &str) -> Option<ApiArgs> {
        self.calls
            .read()
            .iter()
            .find(|(c, _)| c == command)
            .map(|(_, a)| a.clone())
    }

    /// Whether any state-changing command was issued
    pub fn mutated(&self) -> bool {
        MUTATING_COMMANDS.iter().any(|c| self.count(c) > 0)
    }
}

#[async_trait]
impl CloudStackApi for FakeCloudStack {
    async fn call(&self, command: &str, args: &ApiArgs) -> ModuleResult<Value> {
        self.calls.write().push((command.to_string(), args.clone()));

        if let Some((code, message)) = self.failures.read().get(command).cloned() {
            return Err(ModuleError::Api { code, message });
        }

        if command == "queryAsyncJobResult" {
            if let Some(state) = self.jobs.write().pop_front() {
                return Ok(state);
            }
            return Ok(self
                .final_job
                .read()
                .clone()
                .unwrap_or_else(|| json!({"jobstatus": 1, "jobresult": {}})));
        }

        Ok(self
            .responses
            .read()
            .get(command)
            .cloned()
            .unwrap_or_else(|| json!({})))
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(1)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Build module parameters from a JSON object
pub fn params(value: Value) -> ModuleParams {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// A public IP record as `listPublicIpAddresses` returns it
pub fn public_ip(id: &str, address: &str, static_nat: bool) -> Value {
    json!({
        "id": id,
        "ipaddress": address,
        "isstaticnat": static_nat,
        "zonename": "ch-gva-2",
        "account": "acme",
        "domain": "ROOT",
        "state": "Allocated"
    })
}
