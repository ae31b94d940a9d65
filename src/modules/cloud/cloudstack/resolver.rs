//! Name to identifier resolution for CloudStack entities.
//!
//! Modules accept human-friendly names for the account, domain, project,
//! network, zone and VPC they act on. The resolver looks each one up through
//! the API the first time it is needed and keeps the record for the rest of
//! the invocation.
//!
//! Lookups depend on each other: an account lives in a domain, projects are
//! listed per account, networks per zone and VPC, and so on.

use super::{list_items, value_to_string, ApiArgs, CloudStackApi};
use crate::modules::{ModuleError, ModuleParams, ModuleResult, ParamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Entity kinds that can be referenced by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Account,
    Domain,
    Project,
    Network,
    Zone,
    Vpc,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Account,
        EntityKind::Domain,
        EntityKind::Project,
        EntityKind::Network,
        EntityKind::Zone,
        EntityKind::Vpc,
    ];

    /// Module parameter carrying the entity name
    pub fn param(&self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Domain => "domain",
            EntityKind::Project => "project",
            EntityKind::Network => "network",
            EntityKind::Zone => "zone",
            EntityKind::Vpc => "vpc",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Account => write!(f, "Account"),
            EntityKind::Domain => write!(f, "Domain"),
            EntityKind::Project => write!(f, "Project"),
            EntityKind::Network => write!(f, "Network"),
            EntityKind::Zone => write!(f, "zone"),
            EntityKind::Vpc => write!(f, "VPC"),
        }
    }
}

/// Per-invocation entity resolver
pub struct EntityResolver {
    api: Arc<dyn CloudStackApi>,
    names: HashMap<EntityKind, String>,
    resolved: HashMap<EntityKind, Option<Value>>,
}

impl EntityResolver {
    /// Create a resolver for the entity names found in `params`
    pub fn new(api: Arc<dyn CloudStackApi>, params: &ModuleParams) -> ModuleResult<Self> {
        let mut names = HashMap::new();
        for kind in EntityKind::ALL {
            if let Some(name) = params.get_string(kind.param())? {
                names.insert(kind, name);
            }
        }

        Ok(Self {
            api,
            names,
            resolved: HashMap::new(),
        })
    }

    /// Full record of the entity, `None` when it was not requested
    pub async fn resolve(&mut self, kind: EntityKind) -> ModuleResult<Option<Value>> {
        match kind {
            EntityKind::Account => self.account().await,
            EntityKind::Domain => self.domain().await,
            EntityKind::Project => self.project().await,
            EntityKind::Network => self.network().await,
            EntityKind::Zone => self.zone().await,
            EntityKind::Vpc => self.vpc().await,
        }
    }

    /// One field of the entity record
    pub async fn field(&mut self, kind: EntityKind, key: &str) -> ModuleResult<Option<String>> {
        Ok(self
            .resolve(kind)
            .await?
            .as_ref()
            .and_then(|record| record.get(key))
            .and_then(value_to_string))
    }

    /// Platform identifier of the entity
    pub async fn id(&mut self, kind: EntityKind) -> ModuleResult<Option<String>> {
        self.field(kind, "id").await
    }

    fn cached(&self, kind: EntityKind) -> Option<Option<Value>> {
        self.resolved.get(&kind).cloned()
    }

    fn remember(&mut self, kind: EntityKind, record: Option<Value>) -> Option<Value> {
        self.resolved.insert(kind, record.clone());
        record
    }

    fn not_found(kind: EntityKind, name: &str) -> ModuleError {
        ModuleError::EntityNotFound(format!("{} '{}' not found", kind, name))
    }

    fn record_id(record: &Option<Value>) -> Option<String> {
        record
            .as_ref()
            .and_then(|r| r.get("id"))
            .and_then(value_to_string)
    }

    fn record_str(record: &Value, key: &str) -> String {
        record
            .get(key)
            .and_then(value_to_string)
            .unwrap_or_default()
    }

    async fn domain(&mut self) -> ModuleResult<Option<Value>> {
        let kind = EntityKind::Domain;
        if let Some(hit) = self.cached(kind) {
            return Ok(hit);
        }
        let Some(name) = self.names.get(&kind).cloned() else {
            return Ok(self.remember(kind, None));
        };

        let args = ApiArgs::new().with("listall", true);
        let res = self.api.call("listDomains", &args).await?;

        let wanted = name.to_lowercase();
        let candidates = [
            wanted.clone(),
            format!("root/{}", wanted),
            format!("root{}", wanted),
        ];
        let found = list_items(&res, "domain").into_iter().find(|d| {
            let path = Self::record_str(d, "path").to_lowercase();
            candidates.contains(&path)
        });

        match found {
            Some(domain) => Ok(self.remember(kind, Some(domain))),
            None => Err(Self::not_found(kind, &name)),
        }
    }

    async fn account(&mut self) -> ModuleResult<Option<Value>> {
        let kind = EntityKind::Account;
        if let Some(hit) = self.cached(kind) {
            return Ok(hit);
        }
        let Some(name) = self.names.get(&kind).cloned() else {
            return Ok(self.remember(kind, None));
        };

        let domain = self.domain().await?;
        let Some(domain_id) = Self::record_id(&domain) else {
            return Err(ModuleError::InvalidParameter(
                "Account must be specified with Domain".to_string(),
            ));
        };

        let args = ApiArgs::new()
            .with("name", &name)
            .with("domainid", domain_id);
        let res = self.api.call("listAccounts", &args).await?;

        let wanted = name.to_lowercase();
        let found = list_items(&res, "account")
            .into_iter()
            .find(|a| Self::record_str(a, "name").to_lowercase() == wanted);

        match found {
            Some(account) => Ok(self.remember(kind, Some(account))),
            None => Err(Self::not_found(kind, &name)),
        }
    }

    async fn project(&mut self) -> ModuleResult<Option<Value>> {
        let kind = EntityKind::Project;
        if let Some(hit) = self.cached(kind) {
            return Ok(hit);
        }
        let Some(name) = self.names.get(&kind).cloned() else {
            return Ok(self.remember(kind, None));
        };

        let account = self.account().await?;
        let domain = self.domain().await?;
        let args = ApiArgs::new()
            .with_opt(
                "account",
                account
                    .as_ref()
                    .and_then(|a| a.get("name"))
                    .and_then(value_to_string),
            )
            .with_opt("domainid", Self::record_id(&domain));
        let res = self.api.call("listProjects", &args).await?;

        let wanted = name.to_lowercase();
        let found = list_items(&res, "project").into_iter().find(|p| {
            Self::record_str(p, "name").to_lowercase() == wanted
                || Self::record_str(p, "id") == name
        });

        match found {
            Some(project) => Ok(self.remember(kind, Some(project))),
            None => Err(Self::not_found(kind, &name)),
        }
    }

    /// Zone named by the `zone` parameter, or the first zone when unset
    async fn zone(&mut self) -> ModuleResult<Option<Value>> {
        let kind = EntityKind::Zone;
        if let Some(hit) = self.cached(kind) {
            return Ok(hit);
        }

        let res = self.api.call("listZones", &ApiArgs::new()).await?;
        let zones = list_items(&res, "zone");

        let Some(name) = self.names.get(&kind).cloned() else {
            let default = zones.into_iter().next().ok_or_else(|| {
                ModuleError::EntityNotFound(
                    "No zones available. Please create a zone first".to_string(),
                )
            })?;
            tracing::debug!("Using default zone '{}'", Self::record_str(&default, "name"));
            return Ok(self.remember(kind, Some(default)));
        };

        let wanted = name.to_lowercase();
        let found = zones.into_iter().find(|z| {
            Self::record_str(z, "name").to_lowercase() == wanted
                || Self::record_str(z, "id") == name
        });

        match found {
            Some(zone) => Ok(self.remember(kind, Some(zone))),
            None => Err(Self::not_found(kind, &name)),
        }
    }

    async fn vpc(&mut self) -> ModuleResult<Option<Value>> {
        let kind = EntityKind::Vpc;
        if let Some(hit) = self.cached(kind) {
            return Ok(hit);
        }
        let Some(name) = self.names.get(&kind).cloned() else {
            return Ok(self.remember(kind, None));
        };

        let args = self.scoped_args(true).await?;
        let res = self.api.call("listVPCs", &args).await?;

        let found = list_items(&res, "vpc").into_iter().find(|v| {
            [
                Self::record_str(v, "name"),
                Self::record_str(v, "displaytext"),
                Self::record_str(v, "id"),
            ]
            .contains(&name)
        });

        match found {
            Some(vpc) => Ok(self.remember(kind, Some(vpc))),
            None => Err(Self::not_found(kind, &name)),
        }
    }

    async fn network(&mut self) -> ModuleResult<Option<Value>> {
        let kind = EntityKind::Network;
        if let Some(hit) = self.cached(kind) {
            return Ok(hit);
        }
        let Some(name) = self.names.get(&kind).cloned() else {
            return Ok(self.remember(kind, None));
        };

        let vpc = self.vpc().await?;
        let args = self
            .scoped_args(true)
            .await?
            .with_opt("vpcid", Self::record_id(&vpc));
        let res = self.api.call("listNetworks", &args).await?;

        let wanted = name.to_lowercase();
        let found = list_items(&res, "network").into_iter().find(|n| {
            Self::record_str(n, "name").to_lowercase() == wanted
                || Self::record_str(n, "displaytext").to_lowercase() == wanted
                || Self::record_str(n, "id") == name
        });

        match found {
            Some(network) => Ok(self.remember(kind, Some(network))),
            None => Err(Self::not_found(kind, &name)),
        }
    }

    /// `account`, `domainid`, `projectid` and optionally `zoneid` of this invocation
    async fn scoped_args(&mut self, with_zone: bool) -> ModuleResult<ApiArgs> {
        let account = self.account().await?;
        let domain = self.domain().await?;
        let project = self.project().await?;

        let mut args = ApiArgs::new()
            .with_opt(
                "account",
                account
                    .as_ref()
                    .and_then(|a| a.get("name"))
                    .and_then(value_to_string),
            )
            .with_opt("domainid", Self::record_id(&domain))
            .with_opt("projectid", Self::record_id(&project));

        if with_zone {
            let zone = self.zone().await?;
            args = args.with_opt("zoneid", Self::record_id(&zone));
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::cloud::cloudstack::ApiArgs;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Serves canned list responses and records every command
    struct Directory {
        calls: Mutex<Vec<(String, ApiArgs)>>,
    }

    impl Directory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<String> {
            self.calls.lock().iter().map(|(c, _)| c.clone()).collect()
        }

        fn args_of(&self, command: &str) -> ApiArgs {
            self.calls
                .lock()
                .iter()
                .find(|(c, _)| c == command)
                .map(|(_, a)| a.clone())
                .unwrap()
        }
    }

    #[async_trait]
    impl CloudStackApi for Directory {
        async fn call(&self, command: &str, args: &ApiArgs) -> ModuleResult<Value> {
            self.calls.lock().push((command.to_string(), args.clone()));
            Ok(match command {
                "listDomains" => json!({"domain": [
                    {"id": "d-root", "name": "ROOT", "path": "ROOT"},
                    {"id": "d-cust", "name": "customers", "path": "ROOT/customers"},
                ]}),
                "listAccounts" => json!({"account": [{"id": "a-1", "name": "Acme"}]}),
                "listProjects" => json!({"project": [{"id": "p-1", "name": "Production"}]}),
                "listZones" => json!({"zone": [
                    {"id": "z-1", "name": "ch-gva-2"},
                    {"id": "z-2", "name": "ch-dk-2"},
                ]}),
                "listVPCs" => json!({"vpc": [{"id": "v-1", "name": "prod-vpc", "displaytext": "Prod VPC"}]}),
                "listNetworks" => json!({"network": [{"id": "n-1", "name": "my-net", "displaytext": "My Network"}]}),
                _ => json!({}),
            })
        }
    }

    fn params(pairs: &[(&str, &str)]) -> ModuleParams {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn test_entity_kind_params() {
        assert_eq!(EntityKind::Vpc.param(), "vpc");
        assert_eq!(EntityKind::Zone.to_string(), "zone");
        assert_eq!(EntityKind::ALL.len(), 6);
    }

    #[tokio::test]
    async fn test_unset_entities_resolve_to_none_without_calls() {
        let api = Directory::new();
        let mut resolver = EntityResolver::new(api.clone(), &ModuleParams::new()).unwrap();

        for kind in [
            EntityKind::Account,
            EntityKind::Domain,
            EntityKind::Project,
            EntityKind::Vpc,
            EntityKind::Network,
        ] {
            assert!(resolver.id(kind).await.unwrap().is_none());
        }
        assert!(api.commands().is_empty());
    }

    #[tokio::test]
    async fn test_zone_defaults_to_first() {
        let api = Directory::new();
        let mut resolver = EntityResolver::new(api.clone(), &ModuleParams::new()).unwrap();

        assert_eq!(resolver.id(EntityKind::Zone).await.unwrap().as_deref(), Some("z-1"));
        // memoized
        assert_eq!(resolver.id(EntityKind::Zone).await.unwrap().as_deref(), Some("z-1"));
        assert_eq!(api.commands(), vec!["listZones"]);
    }

    #[tokio::test]
    async fn test_zone_by_name_or_id() {
        let api = Directory::new();
        let mut resolver =
            EntityResolver::new(api.clone(), &params(&[("zone", "CH-DK-2")])).unwrap();
        assert_eq!(resolver.id(EntityKind::Zone).await.unwrap().as_deref(), Some("z-2"));

        let mut resolver = EntityResolver::new(api.clone(), &params(&[("zone", "z-1")])).unwrap();
        assert_eq!(resolver.id(EntityKind::Zone).await.unwrap().as_deref(), Some("z-1"));

        let mut resolver = EntityResolver::new(api, &params(&[("zone", "nowhere")])).unwrap();
        let err = resolver.id(EntityKind::Zone).await.unwrap_err();
        assert_eq!(err.to_string(), "zone 'nowhere' not found");
    }

    #[tokio::test]
    async fn test_domain_matches_path() {
        let api = Directory::new();
        let mut resolver =
            EntityResolver::new(api.clone(), &params(&[("domain", "customers")])).unwrap();
        assert_eq!(
            resolver.id(EntityKind::Domain).await.unwrap().as_deref(),
            Some("d-cust")
        );
        assert_eq!(api.args_of("listDomains").get("listall"), Some("true"));

        let mut resolver = EntityResolver::new(api, &params(&[("domain", "ROOT")])).unwrap();
        assert_eq!(
            resolver.id(EntityKind::Domain).await.unwrap().as_deref(),
            Some("d-root")
        );
    }

    #[tokio::test]
    async fn test_account_requires_domain() {
        let api = Directory::new();
        let mut resolver = EntityResolver::new(api, &params(&[("account", "Acme")])).unwrap();
        let err = resolver.id(EntityKind::Account).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid parameter: Account must be specified with Domain"
        );
    }

    #[tokio::test]
    async fn test_account_and_project() {
        let api = Directory::new();
        let mut resolver = EntityResolver::new(
            api.clone(),
            &params(&[
                ("account", "acme"),
                ("domain", "customers"),
                ("project", "production"),
            ]),
        )
        .unwrap();

        assert_eq!(
            resolver.field(EntityKind::Account, "name").await.unwrap().as_deref(),
            Some("Acme")
        );
        assert_eq!(resolver.id(EntityKind::Project).await.unwrap().as_deref(), Some("p-1"));

        let args = api.args_of("listAccounts");
        assert_eq!(args.get("name"), Some("acme"));
        assert_eq!(args.get("domainid"), Some("d-cust"));

        let args = api.args_of("listProjects");
        assert_eq!(args.get("account"), Some("Acme"));
        assert_eq!(args.get("domainid"), Some("d-cust"));

        // domain resolved once and reused
        assert_eq!(
            api.commands(),
            vec!["listDomains", "listAccounts", "listProjects"]
        );
    }

    #[tokio::test]
    async fn test_network_in_vpc() {
        let api = Directory::new();
        let mut resolver = EntityResolver::new(
            api.clone(),
            &params(&[("network", "My Network"), ("vpc", "Prod VPC")]),
        )
        .unwrap();

        assert_eq!(resolver.id(EntityKind::Network).await.unwrap().as_deref(), Some("n-1"));

        let args = api.args_of("listNetworks");
        assert_eq!(args.get("vpcid"), Some("v-1"));
        assert_eq!(args.get("zoneid"), Some("z-1"));
        assert_eq!(args.get("account"), None);
    }

    #[tokio::test]
    async fn test_unknown_network() {
        let api = Directory::new();
        let mut resolver =
            EntityResolver::new(api, &params(&[("network", "other")])).unwrap();
        let err = resolver.id(EntityKind::Network).await.unwrap_err();
        assert!(matches!(err, ModuleError::EntityNotFound(_)));
        assert_eq!(err.to_string(), "Network 'other' not found");
    }
}
