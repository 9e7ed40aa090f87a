mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use svcman::config::Settings;

use commands::ConfArgs;

#[derive(Parser)]
#[command(name = "svcman")]
#[command(about = "Install and control services through systemd")]
struct Args {
    /// Manage user services instead of system services
    #[arg(long, global = true)]
    user: bool,

    /// Root directory for generated service files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Seconds to wait for a start/stop job
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List installed services
    List,

    /// Print a shell command that lists services without D-Bus access
    ListCommand,

    /// Install (or replace) a service without starting it
    Install {
        /// Service name (e.g., "foo", not "foo.service")
        name: String,

        #[command(flatten)]
        conf: ConfArgs,
    },

    /// Print shell commands that install and start a service remotely
    InstallCommands {
        /// Service name
        name: String,

        #[command(flatten)]
        conf: ConfArgs,
    },

    /// Start an installed service
    Start {
        /// Service name
        name: String,
    },

    /// Stop a service
    Stop {
        /// Service name
        name: String,
    },

    /// Stop a service and remove its unit
    Remove {
        /// Service name
        name: String,
    },

    /// Show service status
    Status {
        /// Service name
        name: String,
    },

    /// Parse a unit file and display its configuration
    Parse {
        /// Path to the .service file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut settings = Settings::from_env(args.user);
    if let Some(dir) = args.data_dir {
        settings = settings.with_data_dir(dir);
    }
    if let Some(secs) = args.timeout {
        settings = settings.with_job_timeout(Duration::from_secs(secs));
    }

    match args.command {
        Command::List => commands::list(&settings).await?,
        Command::ListCommand => commands::list_command(),
        Command::Install { name, conf } => commands::install(&settings, &name, conf).await?,
        Command::InstallCommands { name, conf } => {
            commands::install_commands(&settings, &name, conf)?
        }
        Command::Start { name } => commands::start(&settings, &name).await?,
        Command::Stop { name } => commands::stop(&settings, &name).await?,
        Command::Remove { name } => commands::remove(&settings, &name).await?,
        Command::Status { name } => commands::status(&settings, &name).await?,
        Command::Parse { path } => commands::parse(&path).await?,
    }

    Ok(())
}
