//! Windows control plane
//!
//! Network settings go through `netsh interface ipv4`, accounts through
//! `net user`. SSH keys live under the account's profile directory, where
//! Win32-OpenSSH looks for them.

use super::{
    ControlPlane, InterfaceStatus, ensure_directory_on_disk, run, write_file_on_disk,
};
use crate::error::ControlPlaneError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default root of user profiles
pub const PROFILES_DIR: &str = "C:\\Users";

/// Control plane driving `netsh` and `net user`
#[derive(Debug, Clone)]
pub struct Netsh {
    profiles_dir: PathBuf,
}

impl Default for Netsh {
    fn default() -> Self {
        Self::new()
    }
}

impl Netsh {
    pub fn new() -> Self {
        Self {
            profiles_dir: PathBuf::from(PROFILES_DIR),
        }
    }

    /// Use a different profiles root
    pub fn with_profiles_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profiles_dir = dir.into();
        self
    }
}

impl ControlPlane for Netsh {
    fn name(&self) -> &'static str {
        "netsh"
    }

    fn set_static_address(
        &self,
        interface: &str,
        address: &str,
        netmask: &str,
    ) -> Result<(), ControlPlaneError> {
        run(
            "netsh",
            &[
                "interface",
                "ipv4",
                "set",
                "address",
                &format!("name={}", interface),
                "source=static",
                &format!("addr={}", address),
                &format!("mask={}", netmask),
            ],
            None,
        )?;
        Ok(())
    }

    fn set_gateway(
        &self,
        interface: &str,
        gateway: &str,
        metric: u32,
    ) -> Result<(), ControlPlaneError> {
        let interface_arg = format!("interface={}", interface);

        // Delete then add keeps reapplication from failing on "object exists"
        if let Err(e) = run(
            "netsh",
            &[
                "interface",
                "ipv4",
                "delete",
                "route",
                "prefix=0.0.0.0/0",
                &interface_arg,
            ],
            None,
        ) {
            debug!("No default route to remove on {}: {}", interface, e);
        }

        run(
            "netsh",
            &[
                "interface",
                "ipv4",
                "add",
                "route",
                "prefix=0.0.0.0/0",
                &interface_arg,
                &format!("nexthop={}", gateway),
                &format!("metric={}", metric),
            ],
            None,
        )?;
        Ok(())
    }

    fn list_interfaces(&self) -> Result<Vec<InterfaceStatus>, ControlPlaneError> {
        let output = run("netsh", &["interface", "show", "interface"], None)?;
        Ok(parse_show_interface(&output))
    }

    fn set_primary_dns(&self, interface: &str, server: &str) -> Result<(), ControlPlaneError> {
        run(
            "netsh",
            &[
                "interface",
                "ipv4",
                "set",
                "dnsservers",
                &format!("name={}", interface),
                "source=static",
                &format!("address={}", server),
                "register=primary",
                "validate=no",
            ],
            None,
        )?;
        Ok(())
    }

    fn add_secondary_dns(&self, interface: &str, server: &str) -> Result<(), ControlPlaneError> {
        // No index: netsh appends, which keeps list order
        run(
            "netsh",
            &[
                "interface",
                "ipv4",
                "add",
                "dnsservers",
                &format!("name={}", interface),
                &format!("address={}", server),
                "validate=no",
            ],
            None,
        )?;
        Ok(())
    }

    fn account_exists(&self, name: &str) -> Result<bool, ControlPlaneError> {
        match run("net", &["user", name], None) {
            Ok(_) => Ok(true),
            Err(ControlPlaneError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_account(&self, name: &str, password: &str) -> Result<(), ControlPlaneError> {
        let mut args = vec!["user", name];
        if !password.is_empty() {
            args.push(password);
        }
        args.push("/add");
        run("net", &args, Some(password))?;
        Ok(())
    }

    fn set_password(&self, name: &str, password: &str) -> Result<(), ControlPlaneError> {
        run("net", &["user", name, password], Some(password))?;
        Ok(())
    }

    fn account_home(&self, name: &str) -> Result<PathBuf, ControlPlaneError> {
        Ok(self.profiles_dir.join(name))
    }

    fn ensure_directory(&self, path: &Path, mode: u32) -> Result<(), ControlPlaneError> {
        ensure_directory_on_disk(path, mode)
    }

    fn write_file(
        &self,
        path: &Path,
        contents: &[u8],
        mode: u32,
    ) -> Result<(), ControlPlaneError> {
        write_file_on_disk(path, contents, mode)
    }
}

/// Parse `netsh interface show interface` output
///
/// ```text
/// Admin State    State          Type             Interface Name
/// -------------------------------------------------------------------------
/// Enabled        Connected      Dedicated        Ethernet 2
/// Disabled       Disconnected   Dedicated        Wi-Fi
/// ```
///
/// The state column is compared whole, so `Disconnected` never counts as
/// connected.
pub fn parse_show_interface(output: &str) -> Vec<InterfaceStatus> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 || fields[0] == "Admin" || fields[0].starts_with('-') {
                return None;
            }
            Some(InterfaceStatus {
                name: fields[3..].join(" "),
                connected: fields[1].eq_ignore_ascii_case("Connected"),
            })
        })
        .collect()
}
