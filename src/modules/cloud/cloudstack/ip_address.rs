//! CloudStack public IP address module.
//!
//! ## CsIpAddressModule
//!
//! Acquires and associates a public IP to an account, project, network or VPC,
//! or releases one. Due to API limitations associating is not idempotent: every
//! run with `state: present` allocates a new address, so only call it
//! conditionally.
//!
//! ### Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `ip_address` | No* | Public IP address (*required when `state: absent`) |
//! | `domain` | No | Domain the IP address is related to |
//! | `network` | No | Network the IP address is related to |
//! | `vpc` | No | VPC the IP address is related to |
//! | `account` | No | Account the IP address is related to |
//! | `project` | No | Name of the project the IP address is related to |
//! | `zone` | No | Name of the zone; the first zone is used if unset |
//! | `state` | No | Desired state: present, absent (default: present) |
//! | `poll_async` | No | Poll async jobs until they finish (default: true) |
//!
//! The common `api_*` parameters are accepted as well.
//!
//! ### Return Values
//!
//! | Key | Description |
//! |-----|-------------|
//! | `id` | UUID of the public IP address |
//! | `ip_address` | Public IP address |
//! | `zone` | Name of zone the IP address is related to |
//! | `project` | Name of project the IP address is related to |
//! | `account` | Account the IP address is related to |
//! | `domain` | Domain the IP address is related to |
//! | `jobid` | Async job id, when `poll_async: false` |
//!
//! ### Example
//!
//! ```yaml
//! - name: Associate an IP address conditionally
//!   cs_ip_address:
//!     network: My Network
//!   register: ip_address
//!   when: instance.public_ip is undefined
//!
//! - name: Disassociate an IP address
//!   cs_ip_address:
//!     ip_address: 1.2.3.4
//!     state: absent
//! ```

use super::{
    api_config_from_params, list_items, validate_api_params, value_to_string, ApiArgs,
    CloudStackApi, CloudStackClient, EntityKind, EntityResolver, ResultBuilder, API_PARAMS,
};
use crate::config::Config;
use crate::modules::{
    Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult, ParamExt,
};
use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Parameters specific to this module
const MODULE_PARAMS: &[&str] = &[
    "ip_address",
    "domain",
    "network",
    "vpc",
    "account",
    "project",
    "zone",
    "state",
    "poll_async",
];

/// Desired state of a public IP address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpAddressState {
    /// A new address should be associated
    #[default]
    Present,
    /// The given address should be released
    Absent,
}

impl IpAddressState {
    fn from_str(s: &str) -> ModuleResult<Self> {
        match s.to_lowercase().as_str() {
            "present" => Ok(IpAddressState::Present),
            "absent" => Ok(IpAddressState::Absent),
            _ => Err(ModuleError::InvalidParameter(format!(
                "Invalid state '{}'. Valid states: present, absent",
                s
            ))),
        }
    }
}

/// Module parameters that drive the operation
#[derive(Debug, Clone)]
struct IpAddressConfig {
    ip_address: Option<String>,
    state: IpAddressState,
    poll_async: bool,
}

impl IpAddressConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let state = match params.get_string("state")? {
            Some(s) => IpAddressState::from_str(&s)?,
            None => IpAddressState::default(),
        };

        Ok(Self {
            ip_address: params.get_string("ip_address")?,
            state,
            poll_async: params.get_bool("poll_async")?.unwrap_or(true),
        })
    }
}

/// State of one module invocation
pub struct IpAddressRequest {
    api: Arc<dyn CloudStackApi>,
    resolver: EntityResolver,
    config: IpAddressConfig,
    check_mode: bool,
    ip_address: Option<Value>,
    changed: bool,
}

impl IpAddressRequest {
    pub fn new(
        api: Arc<dyn CloudStackApi>,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<Self> {
        Ok(Self {
            resolver: EntityResolver::new(api.clone(), params)?,
            api,
            config: IpAddressConfig::from_params(params)?,
            check_mode: context.check_mode,
            ip_address: None,
            changed: false,
        })
    }

    /// Whether the invocation changed (or in check mode, would change) anything
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Record of the `ip_address` parameter, narrowed to `key` when given.
    ///
    /// The first lookup is cached for the rest of the invocation.
    pub async fn get_ip_address(&mut self, key: Option<&str>) -> ModuleResult<Option<Value>> {
        if self.ip_address.is_none() {
            let Some(address) = self.config.ip_address.clone() else {
                return Ok(None);
            };

            let args = ApiArgs::new()
                .with("ipaddress", &address)
                .with_opt(
                    "account",
                    self.resolver.field(EntityKind::Account, "name").await?,
                )
                .with_opt("domainid", self.resolver.id(EntityKind::Domain).await?)
                .with_opt("projectid", self.resolver.id(EntityKind::Project).await?)
                .with_opt("vpcid", self.resolver.id(EntityKind::Vpc).await?);

            let res = self.api.call("listPublicIpAddresses", &args).await?;
            self.ip_address = list_items(&res, "publicipaddress").into_iter().find(|ip| {
                ip.get("ipaddress").and_then(value_to_string).as_deref() == Some(address.as_str())
            });
        }

        Ok(match (self.ip_address.as_ref(), key) {
            (Some(record), Some(key)) => record.get(key).cloned(),
            (record, None) => record.cloned(),
            (None, Some(_)) => None,
        })
    }

    /// Allocate a new public IP address.
    ///
    /// Always reports a change: the platform hands out a new address on every
    /// call. Returns the job result when polling, the immediate response
    /// otherwise, and nothing in check mode.
    pub async fn associate_ip_address(&mut self) -> ModuleResult<Option<Value>> {
        self.changed = true;

        let args = ApiArgs::new()
            .with_opt(
                "account",
                self.resolver.field(EntityKind::Account, "name").await?,
            )
            .with_opt("domainid", self.resolver.id(EntityKind::Domain).await?)
            .with_opt("projectid", self.resolver.id(EntityKind::Project).await?)
            .with_opt("networkid", self.resolver.id(EntityKind::Network).await?)
            .with_opt("zoneid", self.resolver.id(EntityKind::Zone).await?)
            .with_opt("vpcid", self.resolver.id(EntityKind::Vpc).await?);

        if self.check_mode {
            return Ok(None);
        }

        let res = self.api.call("associateIpAddress", &args).await?;
        if self.config.poll_async {
            return self.api.poll_job(&res, Some("ipaddress")).await;
        }
        Ok(Some(res))
    }

    /// Release the address named by `ip_address`.
    ///
    /// An address that cannot be found is treated as already released.
    pub async fn disassociate_ip_address(&mut self) -> ModuleResult<Option<Value>> {
        let Some(record) = self.get_ip_address(None).await? else {
            return Ok(None);
        };

        let static_nat = record
            .get("isstaticnat")
            .and_then(value_to_string)
            .is_some_and(|v| v == "true");
        if static_nat {
            return Err(ModuleError::ExecutionFailed(
                "IP address is allocated via static nat".to_string(),
            ));
        }

        self.changed = true;
        if !self.check_mode {
            let id = record.get("id").and_then(value_to_string).ok_or_else(|| {
                ModuleError::ExecutionFailed("IP address record has no id".to_string())
            })?;

            let res = self
                .api
                .call("disassociateIpAddress", &ApiArgs::new().with("id", id))
                .await?;
            if self.config.poll_async {
                self.api.poll_job(&res, Some("ipaddress")).await?;
            }
        }
        Ok(Some(record))
    }

    /// Dispatch on `state` and build the module output
    pub async fn run(mut self) -> ModuleResult<ModuleOutput> {
        let record = match self.config.state {
            IpAddressState::Present => self.associate_ip_address().await?,
            IpAddressState::Absent => self.disassociate_ip_address().await?,
        };

        let address = record
            .as_ref()
            .and_then(|r| r.get("ipaddress"))
            .and_then(value_to_string)
            .or_else(|| self.config.ip_address.clone());

        let msg = match (self.config.state, self.changed, self.check_mode) {
            (IpAddressState::Present, _, true) => "Would associate a new IP address".to_string(),
            (IpAddressState::Present, _, false) => match address {
                Some(ip) => format!("Associated IP address {}", ip),
                None => "Requested association of a new IP address".to_string(),
            },
            (IpAddressState::Absent, false, _) => format!(
                "IP address {} is not associated",
                address.unwrap_or_default()
            ),
            (IpAddressState::Absent, true, true) => format!(
                "Would disassociate IP address {}",
                address.unwrap_or_default()
            ),
            (IpAddressState::Absent, true, false) => format!(
                "Disassociated IP address {}",
                address.unwrap_or_default()
            ),
        };

        if self.changed {
            tracing::info!("cs_ip_address: {}", msg);
        }

        let output = if self.changed {
            ModuleOutput::changed(msg)
        } else {
            ModuleOutput::ok(msg)
        };

        Ok(ResultBuilder::new()
            .with_return("ipaddress", "ip_address")
            .with_return("jobid", "jobid")
            .apply(output, record.as_ref()))
    }
}

/// Module for associating and disassociating CloudStack public IP addresses
#[derive(Default)]
pub struct CsIpAddressModule {
    api: Option<Arc<dyn CloudStackApi>>,
    config: Config,
}

impl CsIpAddressModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use API settings from `config` instead of an empty configuration
    pub fn with_config(config: Config) -> Self {
        Self { api: None, config }
    }

    /// Talk to the platform through `api` instead of building an HTTP client
    pub fn with_api(api: Arc<dyn CloudStackApi>) -> Self {
        Self {
            api: Some(api),
            config: Config::default(),
        }
    }

    fn api_for(&self, params: &ModuleParams) -> ModuleResult<Arc<dyn CloudStackApi>> {
        if let Some(api) = &self.api {
            return Ok(api.clone());
        }
        let api_config = api_config_from_params(params, &self.config)?;
        Ok(Arc::new(CloudStackClient::new(&api_config)?))
    }

    /// Drive `execute_async` on a private current-thread runtime
    fn execute_on_own_runtime(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.execute_async(params, context))
    }

    /// Execute the module
    pub async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        self.validate_params(params)?;

        let api = self.api_for(params)?;
        IpAddressRequest::new(api, params, context)?.run().await
    }
}

impl Module for CsIpAddressModule {
    fn name(&self) -> &'static str {
        "cs_ip_address"
    }

    fn description(&self) -> &'static str {
        "Manages public IP address associations on Apache CloudStack based clouds"
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let Ok(handle) = Handle::try_current() else {
            return self.execute_on_own_runtime(params, context);
        };

        std::thread::scope(|s| {
            s.spawn(|| match handle.runtime_flavor() {
                RuntimeFlavor::MultiThread => handle.block_on(self.execute_async(params, context)),
                // the caller's only thread is parked in join() and cannot drive IO or timers
                _ => self.execute_on_own_runtime(params, context),
            })
            .join()
            .map_err(|_| {
                ModuleError::ExecutionFailed("cs_ip_address worker thread panicked".to_string())
            })?
        })
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        let mut unsupported: Vec<&str> = params
            .keys()
            .map(String::as_str)
            .filter(|k| !MODULE_PARAMS.contains(k) && !API_PARAMS.contains(k))
            .collect();
        if !unsupported.is_empty() {
            unsupported.sort_unstable();
            return Err(ModuleError::UnsupportedParameter(unsupported.join(", ")));
        }

        let config = IpAddressConfig::from_params(params)?;

        if config.state == IpAddressState::Absent && config.ip_address.is_none() {
            return Err(ModuleError::MissingParameter("ip_address".to_string()));
        }

        if let Some(ip) = &config.ip_address {
            if ip.parse::<Ipv4Addr>().is_err() {
                return Err(ModuleError::InvalidParameter(format!(
                    "ip_address '{}' is not a valid IPv4 address",
                    ip
                )));
            }
        }

        validate_api_params(params)
    }
}
