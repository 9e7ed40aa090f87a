//! Install a service

use std::path::PathBuf;

use clap::Args;
use svcman::config::Settings;
use svcman::service::{Service, ServiceDescriptor};
use svcman::units::Configuration;

/// Service configuration given on the command line
#[derive(Args)]
pub struct ConfArgs {
    /// Command line to run (absolute program path)
    #[arg(long, required_unless_present = "script")]
    exec_start: Option<String>,

    /// Read the service's shell script from this file instead
    #[arg(long, conflicts_with = "exec_start")]
    script: Option<PathBuf>,

    /// Human-readable description
    #[arg(long)]
    description: Option<String>,

    /// Environment variable (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_pair)]
    env: Vec<(String, String)>,

    /// Resource limit, e.g. nofile=4096 (repeatable)
    #[arg(long = "limit", value_name = "KEY=VALUE", value_parser = parse_pair)]
    limit: Vec<(String, String)>,

    /// TimeoutSec= for the unit
    #[arg(long)]
    timeout_sec: Option<u64>,

    /// Run once instead of restarting on exit
    #[arg(long)]
    transient: bool,

    /// Command to run after the service stops
    #[arg(long)]
    exec_stop_post: Option<String>,

    /// Send output to syslog
    #[arg(long)]
    syslog: bool,

    /// Shell prelude run before the command
    #[arg(long)]
    extra_script: Option<String>,
}

impl ConfArgs {
    fn into_conf(self) -> Result<Configuration, Box<dyn std::error::Error>> {
        let exec_start = match (self.exec_start, self.script) {
            (Some(cmd), _) => cmd,
            (None, Some(path)) => std::fs::read_to_string(&path)
                .map_err(|e| format!("{}: {}", path.display(), e))?,
            (None, None) => return Err("one of --exec-start or --script is required".into()),
        };

        Ok(Configuration {
            description: self.description,
            transient: self.transient,
            env: self.env.into_iter().collect(),
            limit: self
                .limit
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            timeout: self.timeout_sec,
            exec_start,
            exec_stop_post: self.exec_stop_post,
            output: self.syslog.then(|| svcman::units::OUTPUT_SYSLOG.to_string()),
            extra_script: self.extra_script,
        })
    }
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", s))
}

pub async fn install(
    settings: &Settings,
    name: &str,
    conf: ConfArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let descriptor = ServiceDescriptor::new(name, conf.into_conf()?);
    let service = Service::new(descriptor, settings, super::connector(settings))?;

    service.install().await?;
    println!("● {} - installed ({})", service.unit_name(), service.unit_path().display());
    Ok(())
}

pub fn install_commands(
    settings: &Settings,
    name: &str,
    conf: ConfArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let descriptor = ServiceDescriptor::new(name, conf.into_conf()?);
    let service = Service::new(descriptor, settings, super::connector(settings))?;

    for command in service.install_commands() {
        println!("{}", command);
    }
    Ok(())
}
