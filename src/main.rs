//! cs_ip_address - CloudStack public IP address module
//!
//! Associates a new public IP address with an account, project, network or
//! VPC, or releases one, and reports the result the way an Ansible module does.
//!
//! This is the main entry point for the `cs_ip_address` binary.

mod cli;
mod output;

use anyhow::{Context, Result};
use cli::Cli;
use rustible_cloudstack::config::Config;
use rustible_cloudstack::modules::{ModuleContext, ModuleRegistry};
use rustible_cloudstack::prelude::CsIpAddressModule;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name the module is registered under
const MODULE: &str = "cs_ip_address";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    if cli.no_color {
        colored::control::set_override(false);
    }

    if cli.verbosity() >= 2 {
        tracing::debug!("cs_ip_address v{}", VERSION);
    }

    // Load configuration
    let config = Config::load(cli.config.as_ref()).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}", e);
        Config::default()
    });

    let exit_code = run(&cli, config).await?;
    std::process::exit(exit_code);
}

/// Execute the module and print its result, returning the exit code
async fn run(cli: &Cli, config: Config) -> Result<i32> {
    let args = match cli.module_args() {
        Ok(args) => args,
        Err(e) => return Ok(report_failure(cli, &e.to_string())),
    };

    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(CsIpAddressModule::with_config(config)));

    let context = ModuleContext::new().with_check_mode(args.check_mode);
    if !cli.is_json() {
        output::task_header(context.check_mode);
    }

    let params = args.params;
    let result = tokio::task::spawn_blocking(move || registry.execute(MODULE, &params, &context))
        .await
        .context("module task did not complete")?;

    match result {
        Ok(out) => {
            if cli.is_json() {
                output::json_result(&out);
            } else {
                output::human_result(&out);
            }
            Ok(0)
        }
        Err(e) => {
            tracing::debug!("{} failed: {:?}", MODULE, e);
            Ok(report_failure(cli, &e.to_string()))
        }
    }
}

fn report_failure(cli: &Cli, msg: &str) -> i32 {
    if cli.is_json() {
        output::json_failure(msg);
    } else {
        output::failed(msg);
    }
    1
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // stdout carries the module result
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity >= 3),
        )
        .with(env_filter)
        .init();
}
