//! OS control plane
//!
//! The configurators never touch the host directly. They drive a narrow set
//! of verbs on a [`ControlPlane`], so they can be exercised against a fake.
//!
//! Implementations:
//! - [`netsh::Netsh`] - Windows (`netsh`, `net user`)
//! - [`linux::Linux`] - iproute2, resolvectl, shadow-utils
//! - [`recording::RecordingControlPlane`] - in-memory fake for tests
//! - [`dry_run::DryRun`] - forwards queries, logs mutations instead of running them

pub mod dry_run;
pub mod linux;
pub mod netsh;
pub mod recording;

use crate::error::ControlPlaneError;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// Link state of one network interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceStatus {
    pub name: String,
    pub connected: bool,
}

impl InterfaceStatus {
    pub fn new(name: impl Into<String>, connected: bool) -> Self {
        Self {
            name: name.into(),
            connected,
        }
    }
}

/// Primitive verbs for mutating and querying live host state
///
/// Every mutating verb must be safe to repeat with the same arguments.
pub trait ControlPlane {
    /// Name of this control plane (e.g., "netsh", "linux")
    fn name(&self) -> &'static str;

    /// Give `interface` a static IPv4 address
    fn set_static_address(
        &self,
        interface: &str,
        address: &str,
        netmask: &str,
    ) -> Result<(), ControlPlaneError>;

    /// Route default traffic on `interface` through `gateway`
    fn set_gateway(
        &self,
        interface: &str,
        gateway: &str,
        metric: u32,
    ) -> Result<(), ControlPlaneError>;

    /// All interfaces with their link state
    fn list_interfaces(&self) -> Result<Vec<InterfaceStatus>, ControlPlaneError>;

    /// Replace the interface's DNS servers with `server`
    fn set_primary_dns(&self, interface: &str, server: &str) -> Result<(), ControlPlaneError>;

    /// Append `server` to the interface's DNS servers
    fn add_secondary_dns(&self, interface: &str, server: &str) -> Result<(), ControlPlaneError>;

    fn account_exists(&self, name: &str) -> Result<bool, ControlPlaneError>;

    /// Create a local account; an empty password leaves it passwordless
    fn create_account(&self, name: &str, password: &str) -> Result<(), ControlPlaneError>;

    fn set_password(&self, name: &str, password: &str) -> Result<(), ControlPlaneError>;

    /// Home directory of an account
    fn account_home(&self, name: &str) -> Result<PathBuf, ControlPlaneError>;

    /// Create `path` if absent and restrict it to `mode`
    fn ensure_directory(&self, path: &Path, mode: u32) -> Result<(), ControlPlaneError>;

    /// Replace the contents of `path` and restrict it to `mode`
    fn write_file(
        &self,
        path: &Path,
        contents: &[u8],
        mode: u32,
    ) -> Result<(), ControlPlaneError>;

    /// Hand `path` over to `account`
    fn set_owner(&self, _path: &Path, _account: &str) -> Result<(), ControlPlaneError> {
        Ok(())
    }
}

/// Run a command and return its stdout.
///
/// `secret`, if given, is masked in logs and error output.
pub(crate) fn run(
    program: &str,
    args: &[&str],
    secret: Option<&str>,
) -> Result<String, ControlPlaneError> {
    run_accepting(program, args, secret, &[])
}

/// Like [`run`], but also treat the exit codes in `accepted` as success
pub(crate) fn run_accepting(
    program: &str,
    args: &[&str],
    secret: Option<&str>,
    accepted: &[i32],
) -> Result<String, ControlPlaneError> {
    trace!("Running {} {}", program, mask(&args.join(" "), secret));

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ControlPlaneError::Spawn {
            program: program.to_string(),
            source,
        })?;

    check_output(program, output, secret, accepted)
}

/// Run a command with `input` on stdin and return its stdout
pub(crate) fn run_with_stdin(
    program: &str,
    args: &[&str],
    input: &str,
    secret: Option<&str>,
) -> Result<String, ControlPlaneError> {
    trace!("Running {} {} with stdin", program, args.join(" "));

    let spawn_err = |source: std::io::Error| ControlPlaneError::Spawn {
        program: program.to_string(),
        source,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).map_err(spawn_err)?;
    }

    let output = child.wait_with_output().map_err(spawn_err)?;
    check_output(program, output, secret, &[])
}

fn check_output(
    program: &str,
    output: std::process::Output,
    secret: Option<&str>,
    accepted: &[i32],
) -> Result<String, ControlPlaneError> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let tolerated = output.status.code().is_some_and(|c| accepted.contains(&c));

    if !output.status.success() && !tolerated {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{} {}", stdout.trim(), stderr.trim());
        return Err(ControlPlaneError::Command {
            program: program.to_string(),
            status: output.status.to_string(),
            output: mask(combined.trim(), secret),
        });
    }

    Ok(stdout)
}

fn mask(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(s) if !s.is_empty() => text.replace(s, "****"),
        _ => text.to_string(),
    }
}

/// Create a directory on the local filesystem with owner-only permissions
pub fn ensure_directory_on_disk(path: &Path, mode: u32) -> Result<(), ControlPlaneError> {
    let io_err = |source: std::io::Error| ControlPlaneError::Io {
        path: path.to_path_buf(),
        source,
    };

    if !path.is_dir() {
        debug!("Creating directory: {:?}", path);
        fs::create_dir_all(path).map_err(io_err)?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(io_err)?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

/// Replace a file on the local filesystem and restrict its permissions
pub fn write_file_on_disk(
    path: &Path,
    contents: &[u8],
    mode: u32,
) -> Result<(), ControlPlaneError> {
    let io_err = |source: std::io::Error| ControlPlaneError::Io {
        path: path.to_path_buf(),
        source,
    };

    fs::write(path, contents).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(io_err)?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}
