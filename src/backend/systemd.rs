//! systemd backend over D-Bus
//!
//! Talks to org.freedesktop.systemd1.Manager on the system bus (or the
//! session bus for user managers). Job completion is tracked through the
//! JobRemoved signal.

use std::sync::Mutex;

use futures_lite::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use zbus::{
    fdo::PropertiesProxy,
    names::InterfaceName,
    proxy,
    zvariant::{ObjectPath, OwnedObjectPath, Value},
    Connection,
};

use super::{Backend, BackendError, Connect, Properties, PropertyValue, UnitStatus};

const DESTINATION: &str = "org.freedesktop.systemd1";

type RawUnit = (
    String,
    String,
    String,
    String,
    String,
    String,
    OwnedObjectPath,
    u32,
    String,
    OwnedObjectPath,
);

#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
trait Manager {
    fn list_units(&self) -> zbus::Result<Vec<RawUnit>>;

    fn start_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn stop_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn enable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
        force: bool,
    ) -> zbus::Result<(bool, Vec<(String, String, String)>)>;

    fn disable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
    ) -> zbus::Result<Vec<(String, String, String)>>;

    fn load_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;

    fn subscribe(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn job_removed(&self, id: u32, job: ObjectPath<'_>, unit: &str, result: &str)
        -> zbus::Result<()>;
}

/// Opens connections to the system or user systemd manager
#[derive(Debug, Clone, Default)]
pub struct SystemdConnector {
    user: bool,
}

impl SystemdConnector {
    pub fn system() -> Self {
        Self { user: false }
    }

    pub fn user() -> Self {
        Self { user: true }
    }
}

impl Connect for SystemdConnector {
    type Conn = SystemdConnection;

    async fn connect(&self) -> Result<SystemdConnection, BackendError> {
        let conn = if self.user {
            Connection::session().await?
        } else {
            Connection::system().await?
        };
        let manager = ManagerProxy::new(&conn).await?;
        // JobRemoved is only emitted to subscribed clients
        manager.subscribe().await?;
        log::debug!("Connected to systemd ({})", if self.user { "user" } else { "system" });

        Ok(SystemdConnection {
            conn,
            manager,
            watchers: Mutex::new(Vec::new()),
        })
    }
}

/// A live systemd manager connection
///
/// Dropping it stops any job watchers it spawned.
pub struct SystemdConnection {
    conn: Connection,
    manager: ManagerProxy<'static>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl SystemdConnection {
    async fn queue_job(
        &self,
        name: &str,
        mode: &str,
        stop: bool,
        done: oneshot::Sender<String>,
    ) -> Result<u32, BackendError> {
        // Listen before queueing so a fast job cannot finish unseen
        let mut removed = self.manager.receive_job_removed().await?;
        let job = if stop {
            self.manager.stop_unit(name, mode).await?
        } else {
            self.manager.start_unit(name, mode).await?
        };
        let id = job_id(job.as_str());
        log::debug!("Queued job {} ({}) for {}", id, job.as_str(), name);

        let watcher = tokio::spawn(async move {
            while let Some(signal) = removed.next().await {
                let Ok(args) = signal.args() else {
                    continue;
                };
                if args.job().as_str() == job.as_str() {
                    let _ = done.send(args.result().to_string());
                    return;
                }
            }
        });
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.push(watcher);
        }

        Ok(id)
    }

    async fn properties(
        &self,
        name: &str,
        interface: &'static str,
    ) -> Result<Properties, BackendError> {
        let path = self.manager.load_unit(name).await?;
        let proxy = PropertiesProxy::builder(&self.conn)
            .destination(DESTINATION)?
            .path(path)?
            .build()
            .await?;
        let iface = InterfaceName::from_static_str(interface)?;
        let all = proxy.get_all(iface).await?;

        Ok(all
            .iter()
            .map(|(key, value)| (key.clone(), property_value(value)))
            .collect())
    }
}

impl Drop for SystemdConnection {
    fn drop(&mut self) {
        if let Ok(watchers) = self.watchers.get_mut() {
            for watcher in watchers.drain(..) {
                watcher.abort();
            }
        }
    }
}

impl Backend for SystemdConnection {
    async fn list_units(&self) -> Result<Vec<UnitStatus>, BackendError> {
        let units = self.manager.list_units().await?;
        Ok(units
            .into_iter()
            // ListUnits carries no unit type; the lister falls back to the name suffix
            .map(
                |(name, description, load_state, active_state, sub_state, ..)| UnitStatus {
                    name,
                    description,
                    load_state,
                    active_state,
                    sub_state,
                    kind: None,
                },
            )
            .collect())
    }

    async fn start_unit(
        &self,
        name: &str,
        mode: &str,
        done: oneshot::Sender<String>,
    ) -> Result<u32, BackendError> {
        self.queue_job(name, mode, false, done).await
    }

    async fn stop_unit(
        &self,
        name: &str,
        mode: &str,
        done: oneshot::Sender<String>,
    ) -> Result<u32, BackendError> {
        self.queue_job(name, mode, true, done).await
    }

    async fn enable_unit_files(
        &self,
        files: &[String],
        runtime: bool,
        force: bool,
    ) -> Result<bool, BackendError> {
        let files: Vec<&str> = files.iter().map(String::as_str).collect();
        let (carries_install_info, changes) =
            self.manager.enable_unit_files(&files, runtime, force).await?;
        for (kind, link, target) in changes {
            log::debug!("enable: {} {} -> {}", kind, link, target);
        }
        Ok(carries_install_info)
    }

    async fn disable_unit_files(
        &self,
        names: &[String],
        runtime: bool,
    ) -> Result<(), BackendError> {
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let changes = self.manager.disable_unit_files(&names, runtime).await?;
        for (kind, link, _) in changes {
            log::debug!("disable: {} {}", kind, link);
        }
        Ok(())
    }

    async fn get_unit_properties(&self, name: &str) -> Result<Properties, BackendError> {
        self.properties(name, "org.freedesktop.systemd1.Unit").await
    }

    async fn get_unit_type_properties(
        &self,
        name: &str,
        unit_type: &str,
    ) -> Result<Properties, BackendError> {
        let interface = match unit_type {
            "Service" => "org.freedesktop.systemd1.Service",
            "Socket" => "org.freedesktop.systemd1.Socket",
            "Timer" => "org.freedesktop.systemd1.Timer",
            other => {
                return Err(BackendError::Other(format!(
                    "unsupported unit type: {}",
                    other
                )))
            }
        };
        self.properties(name, interface).await
    }
}

/// Job id from a job object path (".../job/42" -> 42)
fn job_id(path: &str) -> u32 {
    path.rsplit('/')
        .next()
        .and_then(|id| id.parse().ok())
        .unwrap_or_default()
}

/// Flatten a D-Bus value into the few shapes the controller reads
fn property_value(value: &Value<'_>) -> PropertyValue {
    match value {
        Value::Str(s) => PropertyValue::Str(s.to_string()),
        Value::Bool(b) => PropertyValue::Bool(*b),
        Value::U64(n) => PropertyValue::U64(*n),
        Value::U32(n) => PropertyValue::U64(u64::from(*n)),
        Value::Value(inner) => property_value(inner),
        Value::Array(arr) => {
            let mut strs = Vec::new();
            let mut commands = Vec::new();
            for item in arr.iter() {
                match item {
                    Value::Str(s) => strs.push(s.to_string()),
                    // ExecStart & co: a(sasbttttuii), argv is the second field
                    Value::Structure(st) => match st.fields().get(1) {
                        Some(Value::Array(argv)) => commands.push(
                            argv.iter()
                                .filter_map(|arg| match arg {
                                    Value::Str(s) => Some(s.to_string()),
                                    _ => None,
                                })
                                .collect(),
                        ),
                        _ => return PropertyValue::Other,
                    },
                    _ => return PropertyValue::Other,
                }
            }
            if commands.is_empty() {
                PropertyValue::Strs(strs)
            } else {
                PropertyValue::Commands(commands)
            }
        }
        _ => PropertyValue::Other,
    }
}
