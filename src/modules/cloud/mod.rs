//! Cloud provider modules for infrastructure provisioning.
//!
//! This module provides integrations with cloud platforms for
//! infrastructure-as-code workflows. Supported providers include:
//!
//! - **CloudStack**: Apache CloudStack based clouds (public IP addresses)
//!
//! ## Example
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

pub mod cloudstack;

pub use cloudstack::CsIpAddressModule;
