//! Service controller
//!
//! Makes one named service "be installed with configuration C" against a
//! backend. Nothing about live state is cached: every query goes back to the
//! backend and the filesystem, so repeating an operation is harmless.
//!
//! Operations on one service name are not atomic. Callers serialize them,
//! e.g. one controller per name driven from a single task.

mod list;

pub use list::{list_command, list_services, service_names};

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::backend::{Backend, BackendError, Connect, UnitStatus, JOB_DONE};
use crate::config::{script_path_in, Settings};
use crate::fs::{Filesystem, HostFs, SCRIPT_MODE, UNIT_MODE};
use crate::units::{
    self, equivalent, normalize, options_from_properties, validate, ConfError, Configuration,
    Normalized,
};

/// Job mode passed with start/stop requests
const JOB_MODE: &str = "fail";

/// A managed service: its name and desired configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub conf: Configuration,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, conf: Configuration) -> Self {
        Self {
            name: name.into(),
            conf,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service {service}: invalid configuration: {source}")]
    Invalid {
        service: String,
        #[source]
        source: ConfError,
    },

    #[error("service {service}: {op} failed: {source}")]
    Backend {
        service: String,
        op: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("service {0} not found")]
    NotFound(String),

    #[error("failed to {op} service {service}: job result {result:?}")]
    Failed {
        service: String,
        op: &'static str,
        result: String,
    },

    #[error("timed out after {after:?} waiting to {op} service {service}")]
    Timeout {
        service: String,
        op: &'static str,
        after: Duration,
    },

    #[error("service {service}: {op} failed on {}: {source}", .path.display())]
    Io {
        service: String,
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("service {service}: cannot read live configuration: {source}")]
    Deserialize {
        service: String,
        #[source]
        source: ConfError,
    },

    #[error("service {service}: could not remove old unit: {source}")]
    Supersede {
        service: String,
        #[source]
        source: Box<ServiceError>,
    },
}

impl ServiceError {
    /// Name of the service the error is about
    pub fn service(&self) -> &str {
        match self {
            Self::NotFound(service)
            | Self::Invalid { service, .. }
            | Self::Backend { service, .. }
            | Self::Failed { service, .. }
            | Self::Timeout { service, .. }
            | Self::Io { service, .. }
            | Self::Deserialize { service, .. }
            | Self::Supersede { service, .. } => service,
        }
    }
}

/// Controller for one systemd service
pub struct Service<C, F = HostFs> {
    name: String,
    unit_name: String,
    dirname: PathBuf,
    conf: Normalized,
    script: Option<Vec<u8>>,
    script_path: PathBuf,
    connector: C,
    fs: F,
    job_timeout: Duration,
}

impl<C: Connect> Service<C> {
    pub fn new(
        descriptor: ServiceDescriptor,
        settings: &Settings,
        connector: C,
    ) -> Result<Self, ServiceError> {
        Self::with_fs(descriptor, settings, connector, HostFs)
    }
}

impl<C: Connect, F: Filesystem> Service<C, F> {
    pub fn with_fs(
        descriptor: ServiceDescriptor,
        settings: &Settings,
        connector: C,
        fs: F,
    ) -> Result<Self, ServiceError> {
        let ServiceDescriptor { name, conf } = descriptor;
        let dirname = settings.service_dir(&name);
        let script_path = script_path_in(&dirname);
        let (conf, script) = prepare(&name, &script_path, &conf)?;

        Ok(Self {
            unit_name: units::unit_name(&name),
            name,
            dirname,
            conf,
            script,
            script_path,
            connector,
            fs,
            job_timeout: settings.job_timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Directory holding this service's unit file and script
    pub fn dirname(&self) -> &Path {
        &self.dirname
    }

    pub fn unit_path(&self) -> PathBuf {
        self.dirname.join(&self.unit_name)
    }

    /// The desired configuration, normalized
    pub fn conf(&self) -> &Normalized {
        &self.conf
    }

    pub fn script(&self) -> Option<&[u8]> {
        self.script.as_deref()
    }

    /// Where the script goes when the configuration carries one
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Replace the desired configuration
    ///
    /// Live state is untouched until the next [`install`](Self::install). On
    /// error the previous configuration stays in place.
    pub fn update_conf(&mut self, conf: Configuration) -> Result<(), ServiceError> {
        let (conf, script) = prepare(&self.name, &self.script_path, &conf)?;
        self.conf = conf;
        self.script = script;
        Ok(())
    }

    /// Whether the backend lists this service
    pub async fn installed(&self) -> Result<bool, ServiceError> {
        let names = list_services(&self.connector)
            .await
            .map_err(|e| self.backend_err("list", e))?;
        Ok(names.contains(&self.name))
    }

    /// Whether the service is installed with exactly the desired configuration
    pub async fn exists(&self) -> Result<bool, ServiceError> {
        if !self.installed().await? {
            return Ok(false);
        }
        self.check().await
    }

    /// Whether the unit is loaded and active
    pub async fn running(&self) -> Result<bool, ServiceError> {
        Ok(self.status().await?.is_some_and(|unit| unit.is_running()))
    }

    /// The backend's listing entry for this unit, if any
    pub async fn status(&self) -> Result<Option<UnitStatus>, ServiceError> {
        let conn = self.connect("status").await?;
        let units = conn
            .list_units()
            .await
            .map_err(|e| self.backend_err("status", e))?;
        Ok(units.into_iter().find(|unit| unit.name == self.unit_name))
    }

    /// Install the unit and enable it, without starting it
    ///
    /// A unit that already matches is left alone. One that differs is stopped
    /// and removed first. If writing or enabling the new unit fails after
    /// that, the service stays uninstalled: there is no rollback.
    pub async fn install(&self) -> Result<(), ServiceError> {
        if self.installed().await? {
            if self.check().await? {
                log::info!("{} already installed with this configuration", self.unit_name);
                return Ok(());
            }
            log::info!("{} configuration changed, replacing old unit", self.unit_name);
            self.stop_and_remove()
                .await
                .map_err(|e| ServiceError::Supersede {
                    service: self.name.clone(),
                    source: Box::new(e),
                })?;
        }

        validate(&self.name, &self.conf).map_err(|e| self.invalid(e))?;
        let filename = self.write_conf()?;

        let conn = self.connect("install").await?;
        let file = filename.to_string_lossy().into_owned();
        conn.enable_unit_files(&[file], false, true)
            .await
            .map_err(|e| self.backend_err("enable", e))?;

        log::info!("Installed {} from {}", self.unit_name, filename.display());
        Ok(())
    }

    /// Start the unit and wait for its job to finish
    pub async fn start(&self) -> Result<(), ServiceError> {
        if !self.installed().await? {
            return Err(ServiceError::NotFound(self.name.clone()));
        }
        if self.running().await? {
            log::debug!("{} already running", self.unit_name);
            return Ok(());
        }

        log::info!("Starting {}", self.unit_name);
        let conn = self.connect("start").await?;
        let (tx, rx) = oneshot::channel();
        let job = conn
            .start_unit(&self.unit_name, JOB_MODE, tx)
            .await
            .map_err(|e| self.backend_err("start", e))?;
        log::debug!("{} start job {}", self.unit_name, job);

        self.wait_for_job("start", rx).await
    }

    /// Stop the unit if it is running and wait for its job to finish
    pub async fn stop(&self) -> Result<(), ServiceError> {
        if !self.running().await? {
            log::debug!("{} not running", self.unit_name);
            return Ok(());
        }

        log::info!("Stopping {}", self.unit_name);
        let conn = self.connect("stop").await?;
        let (tx, rx) = oneshot::channel();
        let job = conn
            .stop_unit(&self.unit_name, JOB_MODE, tx)
            .await
            .map_err(|e| self.backend_err("stop", e))?;
        log::debug!("{} stop job {}", self.unit_name, job);

        self.wait_for_job("stop", rx).await
    }

    pub async fn stop_and_remove(&self) -> Result<(), ServiceError> {
        self.stop().await?;
        self.remove().await
    }

    /// Disable the unit, then delete its directory
    ///
    /// Deleting first would leave the backend pointing at a unit whose files
    /// are gone.
    pub async fn remove(&self) -> Result<(), ServiceError> {
        if !self.installed().await? {
            log::debug!("{} not installed", self.unit_name);
            return Ok(());
        }

        {
            let conn = self.connect("remove").await?;
            conn.disable_unit_files(&[self.unit_name.clone()], false)
                .await
                .map_err(|e| self.backend_err("disable", e))?;
        }

        self.fs
            .remove_dir_all(&self.dirname)
            .map_err(|e| self.io_err("remove", &self.dirname, e))?;

        log::info!("Removed {}", self.unit_name);
        Ok(())
    }

    /// Shell commands that install and start the unit on a host without
    /// backend API access
    pub fn install_commands(&self) -> Vec<String> {
        let unit = String::from_utf8_lossy(&units::serialize(&self.unit_name, &self.conf))
            .into_owned();
        let remote_unit = format!("/tmp/{}", self.unit_name);

        let mut commands = Vec::new();
        if let Some(script) = &self.script {
            let script = String::from_utf8_lossy(script);
            let path = self.script_path.to_string_lossy();
            let dir = self.dirname.to_string_lossy();
            commands.push(format!("mkdir -p {}", shell_quote(&dir)));
            commands.push(heredoc(&path, &script));
            commands.push(format!("chmod {:o} {}", SCRIPT_MODE, shell_quote(&path)));
        }
        commands.push(heredoc(&remote_unit, &unit));
        commands.push(format!("systemctl link {}", shell_quote(&remote_unit)));
        commands.push(format!("systemctl start {}", shell_quote(&self.unit_name)));
        commands
    }

    /// Compare the live unit against the desired configuration
    async fn check(&self) -> Result<bool, ServiceError> {
        let live = self.read_conf().await?;
        if !equivalent(&self.conf, &live) {
            log::debug!("{} live configuration differs: {:?}", self.unit_name, live);
            return Ok(false);
        }

        // The script path is derived from the name, so compare the contents
        let Some(want) = &self.script else {
            return Ok(true);
        };
        match self.fs.read_file(&self.script_path) {
            Ok(have) => Ok(&have == want),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_err("read", &self.script_path, e)),
        }
    }

    async fn read_conf(&self) -> Result<Configuration, ServiceError> {
        let conn = self.connect("read").await?;
        let unit = conn
            .get_unit_properties(&self.unit_name)
            .await
            .map_err(|e| self.backend_err("read", e))?;
        let service = conn
            .get_unit_type_properties(&self.unit_name, "Service")
            .await
            .map_err(|e| self.backend_err("read", e))?;

        units::deserialize(&options_from_properties(&unit, &service, "Service")).map_err(
            |source| ServiceError::Deserialize {
                service: self.name.clone(),
                source,
            },
        )
    }

    /// Write the script (if any) and unit file; returns the unit file path
    fn write_conf(&self) -> Result<PathBuf, ServiceError> {
        let data = units::serialize(&self.unit_name, &self.conf);

        self.fs
            .create_dir_all(&self.dirname)
            .map_err(|e| self.io_err("install", &self.dirname, e))?;

        if let Some(script) = &self.script {
            self.fs
                .write_file(&self.script_path, script, SCRIPT_MODE)
                .map_err(|e| self.io_err("install", &self.script_path, e))?;
        }

        let filename = self.unit_path();
        self.fs
            .write_file(&filename, &data, UNIT_MODE)
            .map_err(|e| self.io_err("install", &filename, e))?;
        log::debug!("Wrote {}", filename.display());

        Ok(filename)
    }

    async fn wait_for_job(
        &self,
        op: &'static str,
        rx: oneshot::Receiver<String>,
    ) -> Result<(), ServiceError> {
        let result = match tokio::time::timeout(self.job_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                return Err(self.backend_err(
                    op,
                    BackendError::JobAbandoned(self.unit_name.clone()),
                ))
            }
            Err(_) => {
                log::warn!(
                    "{} {} job still pending after {:?}",
                    self.unit_name,
                    op,
                    self.job_timeout
                );
                return Err(ServiceError::Timeout {
                    service: self.name.clone(),
                    op,
                    after: self.job_timeout,
                });
            }
        };

        if result != JOB_DONE {
            log::warn!("{} {} job finished with {}", self.unit_name, op, result);
            return Err(ServiceError::Failed {
                service: self.name.clone(),
                op,
                result,
            });
        }
        log::info!("{} {} done", self.unit_name, op);
        Ok(())
    }

    async fn connect(&self, op: &'static str) -> Result<C::Conn, ServiceError> {
        self.connector
            .connect()
            .await
            .map_err(|e| self.backend_err(op, e))
    }

    fn backend_err(&self, op: &'static str, source: BackendError) -> ServiceError {
        ServiceError::Backend {
            service: self.name.clone(),
            op,
            source,
        }
    }

    fn io_err(&self, op: &'static str, path: &Path, source: io::Error) -> ServiceError {
        ServiceError::Io {
            service: self.name.clone(),
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    fn invalid(&self, source: ConfError) -> ServiceError {
        ServiceError::Invalid {
            service: self.name.clone(),
            source,
        }
    }
}

/// Normalize against the service's script path and validate
fn prepare(
    name: &str,
    script_path: &Path,
    conf: &Configuration,
) -> Result<(Normalized, Option<Vec<u8>>), ServiceError> {
    let (conf, script) = normalize(conf, &script_path.to_string_lossy());
    validate(name, &conf).map_err(|source| ServiceError::Invalid {
        service: name.to_string(),
        source,
    })?;
    Ok((conf, script))
}

/// Quote `word` for a POSIX shell, leaving plain words as they are
fn shell_quote(word: &str) -> String {
    shlex::try_quote(word)
        .map(|quoted| quoted.into_owned())
        .unwrap_or_else(|_| format!("'{}'", word.replace('\'', r"'\''")))
}

/// `cat > path << 'DELIM'` with a delimiter that does not occur in `body`
fn heredoc(path: &str, body: &str) -> String {
    let mut delim = String::from("EOF");
    while body.lines().any(|line| line == delim) {
        delim.push('_');
    }
    let newline = if body.ends_with('\n') { "" } else { "\n" };
    format!(
        "cat > {} << '{}'\n{}{}{}\n",
        shell_quote(path),
        delim,
        body,
        newline,
        delim
    )
}
