//! In-memory systemd stand-in for controller tests
//!
//! Enabling a unit file parses it from disk and exposes its directives as
//! live properties, with the same defaults real systemd fills in.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use svcman::backend::{Backend, BackendError, Connect, Properties, PropertyValue, UnitStatus};
use svcman::fs::{Filesystem, HostFs};
use svcman::units::{parse_environment, parse_file, UnitOption};
use svcman::Settings;
use tokio::sync::oneshot;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_test_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/svcman-test-{}-{}", std::process::id(), id));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn test_settings() -> Settings {
    Settings::system()
        .with_data_dir(unique_test_dir())
        .with_job_timeout(Duration::from_secs(5))
}

#[derive(Debug, Clone)]
pub struct FakeUnit {
    pub status: UnitStatus,
    pub options: Vec<UnitOption>,
}

pub struct FakeState {
    pub units: BTreeMap<String, FakeUnit>,
    /// Every backend and filesystem call, in order
    pub calls: Vec<String>,
    pub opened: usize,
    pub closed: usize,
    /// Result sent for start/stop jobs; `None` leaves them pending
    pub job_result: Option<String>,
    pub pending: Vec<oneshot::Sender<String>>,
    pub fail_connect: bool,
    pub fail_writes: bool,
    next_job: u32,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            units: BTreeMap::new(),
            calls: Vec::new(),
            opened: 0,
            closed: 0,
            job_result: Some("done".into()),
            pending: Vec::new(),
            fail_connect: false,
            fail_writes: false,
            next_job: 1,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeSystemd {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSystemd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// A unit svcman did not install
    pub fn add_unit(&self, name: &str, active_state: &str) {
        self.state().units.insert(
            name.to_string(),
            FakeUnit {
                status: status(name, active_state),
                options: Vec::new(),
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of recorded calls starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Index of the first call starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.state().calls.iter().position(|c| c.starts_with(prefix))
    }

    pub fn is_active(&self, unit: &str) -> bool {
        self.state()
            .units
            .get(unit)
            .is_some_and(|u| u.status.active_state == "active")
    }

    pub fn fs(&self) -> RecordingFs {
        RecordingFs {
            state: self.state.clone(),
        }
    }
}

fn status(name: &str, active_state: &str) -> UnitStatus {
    UnitStatus {
        name: name.to_string(),
        description: String::new(),
        load_state: "loaded".into(),
        active_state: active_state.into(),
        sub_state: if active_state == "active" { "running" } else { "dead" }.into(),
        kind: None,
    }
}

impl Connect for FakeSystemd {
    type Conn = FakeConn;

    async fn connect(&self) -> Result<FakeConn, BackendError> {
        let mut state = self.state();
        if state.fail_connect {
            return Err(BackendError::Other("connection refused".into()));
        }
        state.opened += 1;
        Ok(FakeConn {
            state: self.state.clone(),
        })
    }
}

pub struct FakeConn {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConn {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn job(
        &self,
        verb: &str,
        name: &str,
        active_state: &str,
        done: oneshot::Sender<String>,
    ) -> Result<u32, BackendError> {
        let mut state = self.state();
        state.calls.push(format!("{} {}", verb, name));
        if !state.units.contains_key(name) {
            return Err(BackendError::Other(format!("Unit {} not loaded.", name)));
        }

        let id = state.next_job;
        state.next_job += 1;
        match state.job_result.clone() {
            Some(result) => {
                if result == "done" {
                    if let Some(unit) = state.units.get_mut(name) {
                        unit.status = status(name, active_state);
                    }
                }
                let _ = done.send(result);
            }
            None => state.pending.push(done),
        }
        Ok(id)
    }
}

impl Drop for FakeConn {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed += 1;
        }
    }
}

impl Backend for FakeConn {
    async fn list_units(&self) -> Result<Vec<UnitStatus>, BackendError> {
        let mut state = self.state();
        state.calls.push("list".into());
        Ok(state.units.values().map(|u| u.status.clone()).collect())
    }

    async fn start_unit(
        &self,
        name: &str,
        _mode: &str,
        done: oneshot::Sender<String>,
    ) -> Result<u32, BackendError> {
        self.job("start", name, "active", done)
    }

    async fn stop_unit(
        &self,
        name: &str,
        _mode: &str,
        done: oneshot::Sender<String>,
    ) -> Result<u32, BackendError> {
        self.job("stop", name, "inactive", done)
    }

    async fn enable_unit_files(
        &self,
        files: &[String],
        _runtime: bool,
        _force: bool,
    ) -> Result<bool, BackendError> {
        let mut state = self.state();
        for file in files {
            state.calls.push(format!("enable {}", file));
            let text = std::fs::read_to_string(file)
                .map_err(|e| BackendError::Other(format!("{}: {}", file, e)))?;
            let options =
                parse_file(&text).map_err(|e| BackendError::Other(e.to_string()))?;
            let name = Path::new(file)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            state.units.insert(
                name.clone(),
                FakeUnit {
                    status: status(&name, "inactive"),
                    options,
                },
            );
        }
        Ok(true)
    }

    async fn disable_unit_files(
        &self,
        names: &[String],
        _runtime: bool,
    ) -> Result<(), BackendError> {
        let mut state = self.state();
        for name in names {
            state.calls.push(format!("disable {}", name));
            state.units.remove(name);
        }
        Ok(())
    }

    async fn get_unit_properties(&self, name: &str) -> Result<Properties, BackendError> {
        let state = self.state();
        let unit = state
            .units
            .get(name)
            .ok_or_else(|| BackendError::Other(format!("Unit {} not loaded.", name)))?;

        // systemd falls back to the unit name for a missing description
        let description = find(&unit.options, "Description")
            .next()
            .unwrap_or(name)
            .to_string();
        let mut props = Properties::new();
        props.insert("Description".into(), PropertyValue::Str(description));
        props.insert(
            "ActiveState".into(),
            PropertyValue::Str(unit.status.active_state.clone()),
        );
        props.insert("Names".into(), PropertyValue::Strs(vec![name.to_string()]));
        Ok(props)
    }

    async fn get_unit_type_properties(
        &self,
        name: &str,
        unit_type: &str,
    ) -> Result<Properties, BackendError> {
        let state = self.state();
        let unit = state
            .units
            .get(name)
            .ok_or_else(|| BackendError::Other(format!("Unit {} not loaded.", name)))?;
        if unit_type != "Service" {
            return Err(BackendError::Other(format!("unsupported unit type {}", unit_type)));
        }
        Ok(service_properties(&unit.options))
    }
}

fn find<'a>(options: &'a [UnitOption], name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    options
        .iter()
        .filter(move |o| o.name == name)
        .map(|o| o.value.as_str())
}

/// Exec argv as systemd reports it: prefix flags are not part of the program
fn commands(options: &[UnitOption], name: &str) -> PropertyValue {
    let argvs: Vec<Vec<String>> = find(options, name)
        .filter_map(|line| shlex::split(line))
        .map(|mut argv| {
            if let Some(program) = argv.first_mut() {
                *program = program.trim_start_matches(['-', '@', ':', '+', '!']).to_string();
            }
            argv
        })
        .collect();
    if argvs.is_empty() {
        PropertyValue::Strs(Vec::new())
    } else {
        PropertyValue::Commands(argvs)
    }
}

/// What systemd reports on org.freedesktop.systemd1.Service for a unit file
fn service_properties(options: &[UnitOption]) -> Properties {
    let mut props = Properties::new();

    props.insert("ExecStart".into(), commands(options, "ExecStart"));
    props.insert("ExecStopPost".into(), commands(options, "ExecStopPost"));

    let env: Vec<String> = find(options, "Environment")
        .filter_map(parse_environment)
        .flatten()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    props.insert("Environment".into(), PropertyValue::Strs(env));

    // Defaults for every rlimit, overridden by the unit file
    for limit in ["LimitCORE", "LimitCPU", "LimitNOFILE", "LimitNPROC"] {
        props.insert(limit.into(), PropertyValue::U64(u64::MAX));
        props.insert(format!("{}Soft", limit), PropertyValue::U64(1024));
    }
    for opt in options.iter().filter(|o| o.name.starts_with("Limit")) {
        let value = match opt.value.as_str() {
            "infinity" => u64::MAX,
            n => n.parse().unwrap_or_default(),
        };
        props.insert(opt.name.clone(), PropertyValue::U64(value));
    }

    // TimeoutSec=0 means no timeout
    let timeout = match find(options, "TimeoutSec").next().map(str::parse::<u64>) {
        Some(Ok(0)) => u64::MAX,
        Some(Ok(secs)) => secs * 1_000_000,
        _ => 90 * 1_000_000,
    };
    props.insert("TimeoutStartUSec".into(), PropertyValue::U64(timeout));

    let restart = find(options, "Restart").next().unwrap_or("no");
    props.insert("Restart".into(), PropertyValue::Str(restart.into()));

    // systemd 246+ reports syslog output as the journal
    let output = match find(options, "StandardOutput").next() {
        None | Some("syslog") => "journal",
        Some(other) => other,
    };
    props.insert("StandardOutput".into(), PropertyValue::Str(output.into()));

    props.insert("MainPID".into(), PropertyValue::U64(0));
    props.insert("Type".into(), PropertyValue::Str("simple".into()));
    props
}

/// Host filesystem that records calls alongside the fake backend
#[derive(Clone)]
pub struct RecordingFs {
    state: Arc<Mutex<FakeState>>,
}

impl RecordingFs {
    fn record(&self, call: String) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state.fail_writes
    }
}

impl Filesystem for RecordingFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.record(format!("mkdir {}", path.display()));
        HostFs.create_dir_all(path)
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        if self.record(format!("write {}", path.display())) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        HostFs.write_file(path, data, mode)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        HostFs.read_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.record(format!("rmdir {}", path.display()));
        HostFs.remove_dir_all(path)
    }
}
