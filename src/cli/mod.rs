//! CLI module for the `cs_ip_address` binary
//!
//! Follows the Ansible binary-module convention: parameters come from a JSON
//! or YAML args file, optionally wrapped in `ANSIBLE_MODULE_ARGS`, and the
//! result is printed as JSON on stdout. `-a key=value` pairs are applied on
//! top of the file.

use clap::{Parser, ValueEnum};
use rustible_cloudstack::error::{Error, Result};
use rustible_cloudstack::modules::ModuleParams;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Key wrapping the parameters in files written by Ansible
const ANSIBLE_ARGS_KEY: &str = "ANSIBLE_MODULE_ARGS";

/// Internal key carrying check mode in Ansible args files
const ANSIBLE_CHECK_MODE_KEY: &str = "_ansible_check_mode";

/// Manage public IP addresses on Apache CloudStack based clouds
#[derive(Parser, Debug, Clone)]
#[command(name = "cs_ip_address")]
#[command(author = "Rustible Contributors")]
#[command(version)]
#[command(about = "Associate or disassociate CloudStack public IP addresses", long_about = None)]
pub struct Cli {
    /// JSON or YAML file holding the module arguments
    pub args_file: Option<PathBuf>,

    /// Module argument (key=value), may be repeated
    #[arg(short = 'a', long = "arg", action = clap::ArgAction::Append)]
    pub args: Vec<String>,

    /// Run in check mode (report what would change, make no changes)
    #[arg(long = "check")]
    pub check_mode: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, env = "CLOUDSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "json")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object, as Ansible expects from a module
    #[default]
    Json,
    /// Human-readable output with colors
    Human,
}

/// Parameters and flags gathered from the command line
#[derive(Debug, Clone, Default)]
pub struct ModuleArgs {
    pub params: ModuleParams,
    pub check_mode: bool,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }

    /// Collect module parameters from the args file and `-a` pairs
    pub fn module_args(&self) -> Result<ModuleArgs> {
        let mut args = match &self.args_file {
            Some(path) => load_args_file(path)?,
            None => ModuleArgs::default(),
        };

        for pair in &self.args {
            let (key, value) = parse_pair(pair)?;
            args.params.insert(key, value);
        }

        args.check_mode |= self.check_mode;
        Ok(args)
    }
}

/// Read an args file, unwrapping the Ansible envelope when present
pub fn load_args_file(path: &Path) -> Result<ModuleArgs> {
    let content = std::fs::read_to_string(path)?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    );
    let value: Value = if is_yaml {
        serde_yaml::from_str(&content)?
    } else {
        match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(_) => serde_yaml::from_str(&content)?,
        }
    };

    args_from_value(value)
}

/// Turn a parsed args document into module parameters
pub fn args_from_value(value: Value) -> Result<ModuleArgs> {
    let Value::Object(mut map) = value else {
        return Err(Error::InvalidArgs(
            "module arguments must be a mapping".to_string(),
        ));
    };

    if let Some(inner) = map.remove(ANSIBLE_ARGS_KEY) {
        let Value::Object(inner) = inner else {
            return Err(Error::InvalidArgs(format!(
                "{} must be a mapping",
                ANSIBLE_ARGS_KEY
            )));
        };
        map = inner;
    }

    let check_mode = match map.get(ANSIBLE_CHECK_MODE_KEY) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    };

    let params = map
        .into_iter()
        .filter(|(k, _)| !k.starts_with("_ansible_"))
        .collect();

    Ok(ModuleArgs { params, check_mode })
}

/// Parse a `key=value` argument; the value is read as a YAML scalar
pub fn parse_pair(pair: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        return Err(Error::InvalidArgs(format!(
            "expected key=value, got '{}'",
            pair
        )));
    };

    let key = key.trim();
    if key.is_empty() {
        return Err(Error::InvalidArgs(format!("empty key in '{}'", pair)));
    }

    if raw.is_empty() {
        return Ok((key.to_string(), Value::Null));
    }

    let value = match serde_yaml::from_str::<Value>(raw) {
        Ok(v @ (Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Null)) => v,
        _ => Value::String(raw.to_string()),
    };

    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["cs_ip_address", "args.json"]).unwrap();
        assert_eq!(cli.args_file, Some(PathBuf::from("args.json")));
        assert!(cli.is_json());
        assert!(!cli.check_mode);
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::try_parse_from(["cs_ip_address", "-vvvvv"]).unwrap();
        assert_eq!(cli.verbosity(), 3);
    }

    #[test]
    fn test_arg_pairs() {
        let cli = Cli::try_parse_from([
            "cs_ip_address",
            "-a",
            "network=My Network",
            "-a",
            "poll_async=false",
            "--check",
        ])
        .unwrap();

        let args = cli.module_args().unwrap();
        assert!(args.check_mode);
        assert_eq!(args.params["network"], json!("My Network"));
        assert_eq!(args.params["poll_async"], json!(false));
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            parse_pair("ip_address=10.0.0.1").unwrap(),
            ("ip_address".to_string(), json!("10.0.0.1"))
        );
        assert_eq!(
            parse_pair("api_timeout=30").unwrap(),
            ("api_timeout".to_string(), json!(30))
        );
        assert_eq!(
            parse_pair("zone=").unwrap(),
            ("zone".to_string(), Value::Null)
        );
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn test_args_from_value_unwraps_ansible_envelope() {
        let args = args_from_value(json!({
            "ANSIBLE_MODULE_ARGS": {
                "ip_address": "1.2.3.4",
                "state": "absent",
                "_ansible_check_mode": true,
                "_ansible_verbosity": 0
            }
        }))
        .unwrap();

        assert!(args.check_mode);
        assert_eq!(args.params.len(), 2);
        assert_eq!(args.params["state"], json!("absent"));
    }

    #[test]
    fn test_args_from_value_rejects_non_mapping() {
        assert!(matches!(
            args_from_value(json!(["a"])),
            Err(Error::InvalidArgs(_))
        ));
        assert!(args_from_value(json!({"ANSIBLE_MODULE_ARGS": 1})).is_err());
    }

    #[test]
    fn test_load_yaml_args_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "network: My Network\nzone: ch-gva-2").unwrap();

        let args = load_args_file(file.path()).unwrap();
        assert_eq!(args.params["zone"], json!("ch-gva-2"));
        assert!(!args.check_mode);
    }

    #[test]
    fn test_pairs_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"network": "A", "zone": "z1"}}"#).unwrap();

        let cli = Cli::try_parse_from([
            "cs_ip_address".to_string(),
            file.path().display().to_string(),
            "-a".to_string(),
            "network=B".to_string(),
        ])
        .unwrap();

        let args = cli.module_args().unwrap();
        assert_eq!(args.params["network"], json!("B"));
        assert_eq!(args.params["zone"], json!("z1"));
    }
}
