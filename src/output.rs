//! Output and reporting for the `cs_ip_address` binary

use colored::Colorize;
use rustible_cloudstack::modules::ModuleOutput;
use serde_json::{json, Value};

/// Module name shown in human output
const TASK: &str = "cs_ip_address";

/// Print the module result as a single JSON object
pub fn json_result(output: &ModuleOutput) {
    let mut value = serde_json::to_value(output).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut value {
        map.remove("status");
    }
    println!("{}", value);
}

/// Print a failure as a single JSON object
pub fn json_failure(msg: &str) {
    println!("{}", json!({ "failed": true, "changed": false, "msg": msg }));
}

/// Print a task header
pub fn task_header(check_mode: bool) {
    let header = if check_mode {
        format!("TASK [{}] (check mode)", TASK)
    } else {
        format!("TASK [{}]", TASK)
    };
    let stars = "*".repeat(80_usize.saturating_sub(header.len()));
    println!("\n{} {}", header.bright_white().bold(), stars.bright_black());
}

/// Print an ok or changed result with its return values
pub fn human_result(output: &ModuleOutput) {
    if output.changed {
        println!("{}: {}", "changed".yellow(), output.msg);
    } else {
        println!("{}: {}", "ok".green(), output.msg);
    }

    let mut keys: Vec<&String> = output.data.keys().collect();
    keys.sort();
    for key in keys {
        let value = match &output.data[key] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("    {}: {}", key.bright_white(), value);
    }
}

/// Print a failed result
pub fn failed(msg: &str) {
    println!("{}: {}", "failed".red().bold(), msg);
}
