//! Unit file serialization
//!
//! Converts a [`Normalized`] configuration into systemd unit file text and
//! maps unit options (parsed from a file or read back from the backend) into
//! a [`Configuration`] for comparison.

use std::fmt::Write as _;

use super::conf::{ConfError, Configuration, Normalized};
use super::parser::{parse_environment, UnitOption};

/// Suffix shared by every service unit name
pub const SERVICE_SUFFIX: &str = ".service";

/// Ordering dependencies every generated unit carries
const AFTER: &[&str] = &["syslog.target", "network.target", "systemd-journald.socket"];

const WANTED_BY: &str = "multi-user.target";

/// Unit name for a service name (`foo` -> `foo.service`)
pub fn unit_name(name: &str) -> String {
    format!("{}{}", name, SERVICE_SUFFIX)
}

/// Render the unit file for `conf`
///
/// Output is a pure function of the input: environment and limits are
/// emitted in key order.
pub fn serialize(unit_name: &str, conf: &Normalized) -> Vec<u8> {
    let mut out = format!("# {} (generated by svcman)\n", unit_name);
    let mut current: Option<&str> = None;

    let options = unit_options(conf);
    for opt in &options {
        if current != Some(opt.section.as_str()) {
            if current.is_some() {
                out.push('\n');
            }
            let _ = writeln!(out, "[{}]", opt.section);
            current = Some(opt.section.as_str());
        }
        let _ = writeln!(out, "{}={}", opt.name, opt.value);
    }

    out.into_bytes()
}

/// The options `serialize` writes, grouped by section
pub fn unit_options(conf: &Configuration) -> Vec<UnitOption> {
    let mut options = Vec::new();

    // [Unit]
    if let Some(desc) = &conf.description {
        options.push(UnitOption::new("Unit", "Description", desc.as_str()));
    }
    for target in AFTER {
        options.push(UnitOption::new("Unit", "After", *target));
    }

    // [Service]
    for (key, value) in &conf.env {
        options.push(UnitOption::new(
            "Service",
            "Environment",
            quote_env(key, value),
        ));
    }
    for (key, value) in &conf.limit {
        options.push(UnitOption::new(
            "Service",
            format!("Limit{}", key.to_uppercase()),
            value.as_str(),
        ));
    }
    if let Some(timeout) = conf.timeout {
        options.push(UnitOption::new("Service", "TimeoutSec", timeout.to_string()));
    }
    if !conf.exec_start.is_empty() {
        options.push(UnitOption::new("Service", "ExecStart", conf.exec_start.as_str()));
    }
    if let Some(output) = &conf.output {
        options.push(UnitOption::new("Service", "StandardOutput", output.as_str()));
        options.push(UnitOption::new("Service", "StandardError", output.as_str()));
    }
    if let Some(cmd) = &conf.exec_stop_post {
        options.push(UnitOption::new("Service", "ExecStopPost", cmd.as_str()));
    }
    let restart = if conf.transient { "no" } else { "always" };
    options.push(UnitOption::new("Service", "Restart", restart));

    // [Install]
    options.push(UnitOption::new("Install", "WantedBy", WANTED_BY));

    options
}

/// Quote an environment assignment as `"KEY=VALUE"`
pub fn quote_env(key: &str, value: &str) -> String {
    let raw = format!("{}={}", key, value);
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Build a configuration from unit options
///
/// Accepts every directive [`serialize`] emits, plus a few the backend adds
/// on its own that carry no configuration. Anything else is rejected so an
/// unexpected unit never compares equal by accident.
pub fn deserialize(options: &[UnitOption]) -> Result<Configuration, ConfError> {
    let mut conf = Configuration::default();

    for opt in options {
        match opt.section.as_str() {
            "Unit" => match opt.name.as_str() {
                "Description" => conf.description = Some(opt.value.clone()),
                "After" => {}
                _ => return Err(unsupported(opt)),
            },
            "Service" => match opt.name.as_str() {
                "ExecStart" => conf.exec_start = opt.value.clone(),
                "ExecStopPost" => conf.exec_stop_post = Some(opt.value.clone()),
                "Environment" => {
                    let pairs = parse_environment(&opt.value).ok_or_else(|| bad_value(opt))?;
                    conf.env.extend(pairs);
                }
                "TimeoutSec" => {
                    conf.timeout = Some(opt.value.parse().map_err(|_| bad_value(opt))?);
                }
                "StandardOutput" => conf.output = Some(opt.value.clone()),
                "Restart" => conf.transient = opt.value == "no",
                "StandardError" | "Type" | "RemainAfterExit" => {}
                name => match name.strip_prefix("Limit") {
                    Some(key) if !key.is_empty() => {
                        conf.limit.insert(key.to_lowercase(), opt.value.clone());
                    }
                    _ => return Err(unsupported(opt)),
                },
            },
            "Install" => match opt.name.as_str() {
                "WantedBy" => {}
                _ => return Err(unsupported(opt)),
            },
            _ => return Err(unsupported(opt)),
        }
    }

    Ok(conf)
}

fn unsupported(opt: &UnitOption) -> ConfError {
    ConfError::Unsupported {
        section: opt.section.clone(),
        name: opt.name.clone(),
    }
}

fn bad_value(opt: &UnitOption) -> ConfError {
    ConfError::BadValue {
        name: opt.name.clone(),
        value: opt.value.clone(),
    }
}
