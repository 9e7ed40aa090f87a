//! Logical service configuration
//!
//! A [`Configuration`] describes what a service runs, independent of any
//! init system. [`normalize`] turns it into the [`Normalized`] form the unit
//! file serializer accepts, and [`validate`] rejects shapes the backend
//! cannot store.

use std::collections::BTreeMap;
use std::ops::Deref;

/// Shebang prepended to script bodies that do not carry their own
const SCRIPT_SHEBANG: &str = "#!/usr/bin/env bash\n\n";

/// Output target accepted for StandardOutput=/StandardError=
pub const OUTPUT_SYSLOG: &str = "syslog";

/// Backend-agnostic definition of a service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    /// Human-readable description
    pub description: Option<String>,
    /// Run once; the backend must not restart it when it exits
    pub transient: bool,
    /// Environment variables, kept sorted for stable output
    pub env: BTreeMap<String, String>,
    /// Resource limits keyed by lower-case rlimit name (e.g. "nofile")
    pub limit: BTreeMap<String, String>,
    /// Start/stop timeout in seconds
    pub timeout: Option<u64>,
    /// Command line, or a multi-line shell script body
    pub exec_start: String,
    /// Command run after the service stops
    pub exec_stop_post: Option<String>,
    /// Where stdout/stderr go; only "syslog" is supported
    pub output: Option<String>,
    /// Shell prelude run before `exec_start`
    pub extra_script: Option<String>,
}

impl Configuration {
    pub fn new(exec_start: impl Into<String>) -> Self {
        Self {
            exec_start: exec_start.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_limit(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.limit.insert(key.into().to_lowercase(), value.into());
        self
    }
}

/// A configuration with any inline script replaced by its on-disk path
///
/// Only [`normalize`] builds one, so the serializer never sees a script body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized(Configuration);

impl Normalized {
    pub fn into_inner(self) -> Configuration {
        self.0
    }
}

impl Deref for Normalized {
    type Target = Configuration;

    fn deref(&self) -> &Configuration {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfError {
    #[error("invalid service name {0:?}")]
    InvalidName(String),

    #[error("missing ExecStart")]
    MissingExecStart,

    #[error("relative path in {directive} not valid: {value}")]
    RelativePath {
        directive: &'static str,
        value: String,
    },

    #[error("unbalanced quoting in {directive}: {value}")]
    Quoting {
        directive: &'static str,
        value: String,
    },

    #[error("unexpected extra script")]
    ExtraScript,

    #[error("output {0:?} not supported (options are syslog)")]
    Output(String),

    #[error("{field} may not span lines: {value:?}")]
    Multiline { field: String, value: String },

    #[error("{section} directive {name:?} not supported")]
    Unsupported { section: String, name: String },

    #[error("invalid value for {name}: {value:?}")]
    BadValue { name: String, value: String },
}

/// Replace an inline script with `script_path`
///
/// An extra script is folded into ExecStart first. If the result spans more
/// than one line it becomes the script body and ExecStart points at
/// `script_path`; the body is returned for the caller to write out.
pub fn normalize(conf: &Configuration, script_path: &str) -> (Normalized, Option<Vec<u8>>) {
    let mut conf = conf.clone();

    if let Some(extra) = conf.extra_script.take().filter(|s| !s.is_empty()) {
        conf.exec_start = format!("{}\n{}", extra, conf.exec_start);
    }

    let mut script = None;
    if conf.exec_start.contains('\n') {
        script = Some(script_body(&conf.exec_start));
        conf.exec_start = quote_word(script_path);
    }

    // The unit file parser trims values, so trimmed is what comes back
    conf.description = conf
        .description
        .take()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    for value in conf.limit.values_mut() {
        *value = value.trim().to_string();
    }
    if conf.exec_stop_post.as_deref() == Some("") {
        conf.exec_stop_post = None;
    }
    if conf.output.as_deref() == Some("") {
        conf.output = None;
    }

    (Normalized(conf), script)
}

/// Quote a single command word so the backend splits it back out whole
fn quote_word(word: &str) -> String {
    shlex::try_quote(word)
        .map(|quoted| quoted.into_owned())
        .unwrap_or_else(|_| word.to_string())
}

fn script_body(exec_start: &str) -> Vec<u8> {
    let mut body = String::new();
    if !exec_start.starts_with("#!") {
        body.push_str(SCRIPT_SHEBANG);
    }
    body.push_str(exec_start);
    if !body.ends_with('\n') {
        body.push('\n');
    }
    body.into_bytes()
}

/// Check a normalized configuration before it is written to disk
pub fn validate(name: &str, conf: &Normalized) -> Result<(), ConfError> {
    if !is_valid_name(name) {
        return Err(ConfError::InvalidName(name.to_string()));
    }

    if conf.exec_start.trim().is_empty() {
        return Err(ConfError::MissingExecStart);
    }
    check_command("ExecStart", &conf.exec_start)?;
    if let Some(cmd) = &conf.exec_stop_post {
        check_command("ExecStopPost", cmd)?;
    }

    if conf.extra_script.is_some() {
        return Err(ConfError::ExtraScript);
    }
    if let Some(output) = &conf.output {
        if output != OUTPUT_SYSLOG {
            return Err(ConfError::Output(output.clone()));
        }
    }

    if let Some(desc) = &conf.description {
        raw_value("Description", desc)?;
    }
    for (key, value) in &conf.env {
        if key.is_empty() || key.contains('=') {
            return Err(ConfError::BadValue {
                name: "Environment".into(),
                value: key.clone(),
            });
        }
        single_line(key, value)?;
    }
    for (key, value) in &conf.limit {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfError::BadValue {
                name: "Limit".into(),
                value: key.clone(),
            });
        }
        raw_value(key, value)?;
    }

    Ok(())
}

/// Service names follow `^\w[-\w]*$`, the pattern the list command matches
pub fn is_valid_name(name: &str) -> bool {
    let word = |c: char| c.is_alphanumeric() || c == '_';
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if word(first) => chars.all(|c| word(c) || c == '-'),
        _ => false,
    }
}

fn single_line(field: &str, value: &str) -> Result<(), ConfError> {
    if value.contains('\n') || value.contains('\r') {
        return Err(ConfError::Multiline {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// An unquoted unit file value; a trailing `\` would continue the line
fn raw_value(field: &str, value: &str) -> Result<(), ConfError> {
    single_line(field, value)?;
    if value.ends_with('\\') {
        return Err(ConfError::BadValue {
            name: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// The program of a command line must be an absolute path
fn check_command(directive: &'static str, cmd: &str) -> Result<(), ConfError> {
    raw_value(directive, cmd)?;
    let args = shlex::split(cmd).ok_or_else(|| ConfError::Quoting {
        directive,
        value: cmd.to_string(),
    })?;
    let program = args.first().map(|p| strip_exec_prefix(p)).unwrap_or_default();
    if !program.starts_with('/') {
        return Err(ConfError::RelativePath {
            directive,
            value: cmd.to_string(),
        });
    }
    Ok(())
}

/// `-`, `@`, `:`, `+` and `!` flags in front of an ExecStart program
fn strip_exec_prefix(program: &str) -> &str {
    program.trim_start_matches(['-', '@', ':', '+', '!'])
}

/// Compare the desired configuration against one read back from the backend
///
/// Rules:
/// - ExecStart, ExecStopPost and environment must match. Command lines are
///   compared word by word after shell splitting, without the program's
///   prefix flags (the backend reports those apart from the argv).
/// - The restart policy (`transient`) must match.
/// - Description, timeout and output only count when the desired value is
///   set, since the backend reports defaults for them. Output "syslog" and
///   "journal" are the same target on current systemd.
/// - Limits only count for keys the desired configuration names; the backend
///   reports every rlimit.
/// - `extra_script` never reaches the backend and is ignored.
pub fn equivalent(desired: &Configuration, live: &Configuration) -> bool {
    if !same_command(&desired.exec_start, &live.exec_start) {
        return false;
    }
    match (&desired.exec_stop_post, &live.exec_stop_post) {
        (None, None) => {}
        (Some(a), Some(b)) if same_command(a, b) => {}
        _ => return false,
    }
    if desired.env != live.env || desired.transient != live.transient {
        return false;
    }

    let optional_matches = |want: &Option<String>, got: &Option<String>| {
        want.is_none() || want == got
    };
    let output = |o: &Option<String>| o.as_deref().map(canonical_output);
    if !optional_matches(&desired.description, &live.description)
        || !optional_matches(&output(&desired.output), &output(&live.output))
    {
        return false;
    }
    if desired.timeout.is_some() && desired.timeout != live.timeout {
        return false;
    }

    desired
        .limit
        .iter()
        .all(|(key, value)| live.limit.get(key) == Some(value))
}

/// systemd 246+ folds syslog output into the journal
fn canonical_output(output: &str) -> String {
    match output {
        OUTPUT_SYSLOG => "journal".to_string(),
        other => other.to_string(),
    }
}

fn same_command(a: &str, b: &str) -> bool {
    let argv = |cmd: &str| {
        shlex::split(cmd).map(|mut args| {
            if let Some(program) = args.first_mut() {
                *program = strip_exec_prefix(program).to_string();
            }
            args
        })
    };
    match (argv(a), argv(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a.trim() == b.trim(),
    }
}
