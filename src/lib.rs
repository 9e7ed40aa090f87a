//! svcman - declarative service installation on top of systemd
//!
//! Makes a named daemon "be installed and running with configuration C":
//! - Normalizes and validates a logical service configuration
//! - Renders it as a systemd unit file under `<data-dir>/init/<name>/`
//! - Reconciles it against what systemd reports over D-Bus, replacing the
//!   unit only when the live configuration differs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                Service controller                │
//! ├─────────────────────────────────────────────────┤
//! │  Conf / Validate │  Unit file I/O  │   Lister    │
//! ├─────────────────────────────────────────────────┤
//! │        Backend (systemd D-Bus)  │  Filesystem    │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod fs;
pub mod service;
pub mod units;

pub use config::Settings;
pub use service::{Service, ServiceDescriptor, ServiceError};
pub use units::{Configuration, Normalized};
