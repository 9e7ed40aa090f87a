//! Init system backend capability
//!
//! The controller only talks to an init system through these traits. The
//! systemd implementation lives in [`systemd`]; tests substitute their own.
//!
//! A connection is opened per operation and closed when it is dropped.

pub mod systemd;

use std::collections::HashMap;

use tokio::sync::oneshot;

pub use systemd::SystemdConnector;

/// Job result reported for a start/stop that completed successfully
pub const JOB_DONE: &str = "done";

/// One entry of the backend's unit listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: String,
    pub description: String,
    /// "loaded", "not-found", "error", ...
    pub load_state: String,
    /// "active", "inactive", "failed", ...
    pub active_state: String,
    pub sub_state: String,
    /// Unit kind ("service", "socket", ...) when the backend reports one
    pub kind: Option<String>,
}

impl UnitStatus {
    pub fn is_running(&self) -> bool {
        self.load_state == "loaded" && self.active_state == "active"
    }
}

/// A unit property value, flattened from the backend's wire types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Str(String),
    Strs(Vec<String>),
    U64(u64),
    Bool(bool),
    /// Exec command lists, one argv per command
    Commands(Vec<Vec<String>>),
    /// Anything the controller has no use for
    Other,
}

pub type Properties = HashMap<String, PropertyValue>;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("D-Bus error: {0}")]
    Fdo(#[from] zbus::fdo::Error),

    #[error("invalid D-Bus name: {0}")]
    Name(#[from] zbus::names::Error),

    #[error("job for {0} was dropped before it completed")]
    JobAbandoned(String),

    #[error("{0}")]
    Other(String),
}

/// Opens backend connections
#[allow(async_fn_in_trait)]
pub trait Connect {
    type Conn: Backend;

    async fn connect(&self) -> Result<Self::Conn, BackendError>;
}

/// Operations the controller needs from a live backend connection
#[allow(async_fn_in_trait)]
pub trait Backend {
    /// All units the backend currently knows about
    async fn list_units(&self) -> Result<Vec<UnitStatus>, BackendError>;

    /// Queue a start job; the job result is sent on `done` when it finishes
    async fn start_unit(
        &self,
        name: &str,
        mode: &str,
        done: oneshot::Sender<String>,
    ) -> Result<u32, BackendError>;

    /// Queue a stop job; the job result is sent on `done` when it finishes
    async fn stop_unit(
        &self,
        name: &str,
        mode: &str,
        done: oneshot::Sender<String>,
    ) -> Result<u32, BackendError>;

    /// Link and enable unit files given by absolute path
    ///
    /// Returns whether the unit files carried install information.
    async fn enable_unit_files(
        &self,
        files: &[String],
        runtime: bool,
        force: bool,
    ) -> Result<bool, BackendError>;

    /// Disable unit files given by unit name
    async fn disable_unit_files(&self, names: &[String], runtime: bool)
        -> Result<(), BackendError>;

    /// Generic unit properties (description, states, ...)
    async fn get_unit_properties(&self, name: &str) -> Result<Properties, BackendError>;

    /// Properties of a unit type group, e.g. "Service"
    async fn get_unit_type_properties(
        &self,
        name: &str,
        unit_type: &str,
    ) -> Result<Properties, BackendError>;
}
