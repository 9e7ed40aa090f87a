//! Filesystem access for service directories
//!
//! The controller writes unit and script files through [`Filesystem`] so
//! tests can observe or fail individual writes.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Mode for generated script files
pub const SCRIPT_MODE: u32 = 0o755;
/// Mode for generated unit files
pub const UNIT_MODE: u32 = 0o644;

pub trait Filesystem {
    /// Create a directory and any missing parents
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Write `data` to `path`, replacing it, and set its permission bits
    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()>;

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Remove a directory tree; a missing directory is not an error
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// The host filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFs;

impl Filesystem for HostFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        std::fs::write(path, data)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        match std::fs::remove_dir_all(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!("/tmp/svcman-fs-{}-{}", std::process::id(), tag));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_write_sets_mode() {
        let dir = test_dir("mode");
        HostFs.create_dir_all(&dir).unwrap();

        let script = dir.join("exec-start.sh");
        HostFs.write_file(&script, b"#!/bin/sh\n", SCRIPT_MODE).unwrap();
        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, SCRIPT_MODE);
        assert_eq!(HostFs.read_file(&script).unwrap(), b"#!/bin/sh\n");

        HostFs.remove_dir_all(&dir).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_remove_missing_dir_is_ok() {
        let dir = test_dir("missing");
        assert!(HostFs.remove_dir_all(&dir).is_ok());
    }
}
