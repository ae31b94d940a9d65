//! # Rustible CloudStack - public IP address management for Apache CloudStack
//!
//! Ansible-compatible modules that drive the CloudStack API. The crate ships
//! the `cs_ip_address` module, which associates a new public IP address with
//! an account, project, network or VPC, or releases one.
//!
//! ## Core Concepts
//!
//! - **Modules**: Units of work invoked with a parameter map, reporting
//!   `changed`, a message and return values
//! - **API client**: Signed HTTP requests against a CloudStack endpoint, with
//!   async job polling
//! - **Resolver**: Turns account, domain, project, network, zone and VPC names
//!   into platform ids
//! - **Configuration**: API credentials from module parameters, environment
//!   variables or region sections of a config file
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 cs_ip_address binary                      │
//! │          (clap args, JSON or human output)                │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Module Registry                        │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │     CsIpAddressModule  ──►  EntityResolver                │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │        CloudStackApi (CloudStackClient over reqwest)      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use rustible_cloudstack::prelude::*;
//! use serde_json::json;
//!
//! let registry = ModuleRegistry::with_builtins();
//!
//! let mut params = ModuleParams::new();
//! params.insert("network".to_string(), json!("My Network"));
//!
//! let output = registry.execute("cs_ip_address", &params, &ModuleContext::new())?;
//! println!("{}", output.data_str("ip_address").unwrap_or_default());
//! ```

pub mod config;
pub mod error;
pub mod modules;

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Configuration
    pub use crate::config::{ApiConfig, Config, HttpMethod};

    // Error handling
    pub use crate::error::{Error, Result};

    // Module system
    pub use crate::modules::{
        Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleRegistry,
        ModuleResult, ModuleStatus, ParamExt,
    };

    // CloudStack
    pub use crate::modules::cloud::cloudstack::{
        ApiArgs, CloudStackApi, CloudStackClient, CsIpAddressModule, EntityKind, EntityResolver,
    };
}
