//! Controller settings
//!
//! Where service directories live, which systemd manager to talk to, and
//! how long to wait for a start/stop job.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "SVCMAN_DATA_DIR";

/// systemd's own default start timeout
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(90);

const SYSTEM_DATA_DIR: &str = "/var/lib/svcman";

/// Name of the generated script inside a service directory
pub const SCRIPT_NAME: &str = "exec-start.sh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root for `init/<name>/` service directories
    pub data_dir: PathBuf,
    /// Upper bound on waiting for a start/stop job to finish
    pub job_timeout: Duration,
    /// Talk to the user manager instead of the system manager
    pub user: bool,
}

impl Settings {
    pub fn system() -> Self {
        Self {
            data_dir: PathBuf::from(SYSTEM_DATA_DIR),
            job_timeout: DEFAULT_JOB_TIMEOUT,
            user: false,
        }
    }

    pub fn user() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
            .unwrap_or_else(std::env::temp_dir)
            .join("svcman");
        Self {
            data_dir,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            user: true,
        }
    }

    /// System or user defaults, with `SVCMAN_DATA_DIR` applied
    pub fn from_env(user: bool) -> Self {
        let settings = if user { Self::user() } else { Self::system() };
        match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => settings.with_data_dir(dir),
            _ => settings,
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn init_dir(&self) -> PathBuf {
        self.data_dir.join("init")
    }

    /// Directory owning the files of service `name`
    pub fn service_dir(&self, name: &str) -> PathBuf {
        self.init_dir().join(name)
    }

    pub fn script_path(&self, name: &str) -> PathBuf {
        script_path_in(&self.service_dir(name))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::system()
    }
}

pub(crate) fn script_path_in(dir: &Path) -> PathBuf {
    dir.join(SCRIPT_NAME)
}
