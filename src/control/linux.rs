//! Linux control plane
//!
//! Uses iproute2 for addresses and routes, `resolvectl` for per-link DNS and
//! shadow-utils for accounts.

use super::{
    ControlPlane, InterfaceStatus, ensure_directory_on_disk, run, run_accepting, run_with_stdin,
    write_file_on_disk,
};
use crate::error::ControlPlaneError;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Account database consulted for home directories
pub const PASSWD_FILE: &str = "/etc/passwd";

/// `useradd` exit status when the account already exists
const USERADD_EXISTS: i32 = 9;

/// Control plane driving iproute2, resolvectl and shadow-utils
#[derive(Debug, Clone)]
pub struct Linux {
    passwd_file: PathBuf,
}

impl Default for Linux {
    fn default() -> Self {
        Self::new()
    }
}

impl Linux {
    pub fn new() -> Self {
        Self {
            passwd_file: PathBuf::from(PASSWD_FILE),
        }
    }

    /// Read home directories from a different passwd file (useful for testing)
    pub fn with_passwd_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.passwd_file = path.into();
        self
    }

    fn current_dns(&self, interface: &str) -> Result<Vec<String>, ControlPlaneError> {
        let output = run("resolvectl", &["dns", interface], None)?;
        Ok(parse_resolvectl_dns(&output))
    }
}

impl ControlPlane for Linux {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn set_static_address(
        &self,
        interface: &str,
        address: &str,
        netmask: &str,
    ) -> Result<(), ControlPlaneError> {
        let cidr = address_cidr(address, netmask)?;

        run("ip", &["addr", "replace", &cidr, "dev", interface], None)?;
        run("ip", &["link", "set", interface, "up"], None)?;
        Ok(())
    }

    fn set_gateway(
        &self,
        interface: &str,
        gateway: &str,
        metric: u32,
    ) -> Result<(), ControlPlaneError> {
        run(
            "ip",
            &[
                "route",
                "replace",
                "default",
                "via",
                gateway,
                "dev",
                interface,
                "metric",
                &metric.to_string(),
            ],
            None,
        )?;
        Ok(())
    }

    fn list_interfaces(&self) -> Result<Vec<InterfaceStatus>, ControlPlaneError> {
        let output = run("ip", &["-o", "link", "show"], None)?;
        Ok(parse_ip_link(&output))
    }

    fn set_primary_dns(&self, interface: &str, server: &str) -> Result<(), ControlPlaneError> {
        run("resolvectl", &["dns", interface, server], None)?;
        Ok(())
    }

    fn add_secondary_dns(&self, interface: &str, server: &str) -> Result<(), ControlPlaneError> {
        // resolvectl only sets the whole list, so append to what is there
        let mut servers = self.current_dns(interface)?;
        if servers.iter().any(|s| s == server) {
            debug!("{} already has DNS server {}", interface, server);
            return Ok(());
        }
        servers.push(server.to_string());

        let mut args = vec!["dns", interface];
        args.extend(servers.iter().map(String::as_str));
        run("resolvectl", &args, None)?;
        Ok(())
    }

    fn account_exists(&self, name: &str) -> Result<bool, ControlPlaneError> {
        match run("id", &["-u", name], None) {
            Ok(_) => Ok(true),
            Err(ControlPlaneError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_account(&self, name: &str, password: &str) -> Result<(), ControlPlaneError> {
        run_accepting("useradd", &["--create-home", name], None, &[USERADD_EXISTS])?;
        if !password.is_empty() {
            self.set_password(name, password)?;
        }
        Ok(())
    }

    fn set_password(&self, name: &str, password: &str) -> Result<(), ControlPlaneError> {
        let input = format!("{}:{}", name, password);
        // Crypt hashes start with "$id$"
        let args: &[&str] = if password.starts_with('$') {
            &["-e"]
        } else {
            &[]
        };
        run_with_stdin("chpasswd", args, &input, Some(password))?;
        Ok(())
    }

    fn account_home(&self, name: &str) -> Result<PathBuf, ControlPlaneError> {
        let passwd = fs::read_to_string(&self.passwd_file).map_err(|source| {
            ControlPlaneError::Io {
                path: self.passwd_file.clone(),
                source,
            }
        })?;

        Ok(passwd_home(&passwd, name).unwrap_or_else(|| PathBuf::from("/home").join(name)))
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

    fn set_owner(&self, path: &Path, account: &str) -> Result<(), ControlPlaneError> {
        let owner = format!("{}:", account);
        let path = path.to_string_lossy();
        run("chown", &[owner.as_str(), path.as_ref()], None)?;
        Ok(())
    }
}

/// `address/prefix` for `ip addr`. An address already in CIDR form is
/// used as given and the netmask is ignored.
pub fn address_cidr(address: &str, netmask: &str) -> Result<String, ControlPlaneError> {
    let address = address.trim();
    if address.contains('/') {
        return Ok(address.to_string());
    }
    Ok(format!("{}/{}", address, netmask_to_prefix(netmask)?))
}

/// Convert a dotted netmask, or a bare prefix length, to a prefix length
pub fn netmask_to_prefix(netmask: &str) -> Result<u32, ControlPlaneError> {
    let netmask = netmask.trim();
    if let Ok(prefix) = netmask.parse::<u8>() {
        return match prefix {
            0..=32 => Ok(u32::from(prefix)),
            _ => Err(ControlPlaneError::Rejected(format!(
                "prefix length out of range: {}",
                netmask
            ))),
        };
    }

    let mask: Ipv4Addr = netmask
        .parse()
        .map_err(|_| ControlPlaneError::Rejected(format!("invalid netmask: {}", netmask)))?;

    let bits = u32::from(mask);
    if bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(ControlPlaneError::Rejected(format!(
            "non-contiguous netmask: {}",
            netmask
        )));
    }

    Ok(bits.leading_ones())
}

/// Parse `ip -o link show` output
///
/// ```text
/// 1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT
/// 2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP mode DEFAULT
/// ```
pub fn parse_ip_link(output: &str) -> Vec<InterfaceStatus> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ": ");
            parts.next()?;
            let name = parts.next()?.trim();
            let rest = parts.next()?;

            // Strip "@parent" from vlan and veth names
            let name = name.split('@').next().unwrap_or(name);

            let mut words = rest.split_whitespace();
            let connected = words.any(|w| w == "state") && words.next() == Some("UP");

            Some(InterfaceStatus::new(name, connected))
        })
        .collect()
}

/// Parse `resolvectl dns <link>` output
///
/// ```text
/// Link 2 (eth0): 8.8.8.8 1.1.1.1
/// ```
pub fn parse_resolvectl_dns(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_once("):").map(|(_, servers)| servers))
        .flat_map(|servers| servers.split_whitespace())
        .map(str::to_string)
        .collect()
}

/// Look up a home directory in passwd-format text
pub fn passwd_home(passwd: &str, name: &str) -> Option<PathBuf> {
    passwd.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(':').collect();
        (fields.len() >= 6 && fields[0] == name).then(|| PathBuf::from(fields[5]))
    })
}
