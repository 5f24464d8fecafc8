//! Document role classification
//!
//! Roles are decided by file name alone, against two vocabularies:
//! - cloud-init NoCloud names (`meta-data`, `user-data`, ...), exact lowercase,
//!   optionally suffixed with `.yaml`, `.yml` or `.json`
//! - OpenStack config-drive names (`META_DATA.JSON`, `USER_DATA`, ...),
//!   compared without regard to case since ISO readers differ on it

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Role a configuration document plays in the merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Instance metadata (hostname, instance id, public keys)
    #[serde(rename = "meta-data")]
    Metadata,
    /// Operator user-data
    UserData,
    /// Network configuration or vendor-data
    NetworkConfig,
    /// Not a recognized marker file
    Unknown,
}

/// cloud-init names and the role each carries
const CLOUD_INIT_NAMES: &[(&str, Role)] = &[
    ("meta-data", Role::Metadata),
    ("user-data", Role::UserData),
    ("network-config", Role::NetworkConfig),
    ("vendor-data", Role::NetworkConfig),
];

/// Extensions accepted after a cloud-init name
const CLOUD_INIT_SUFFIXES: &[&str] = &["", ".yaml", ".yml", ".json"];

/// OpenStack config-drive names and the role each carries
const OPENSTACK_NAMES: &[(&str, Role)] = &[
    ("META_DATA.JSON", Role::Metadata),
    ("USER_DATA", Role::UserData),
    ("VENDOR_DATA.JSON", Role::NetworkConfig),
];

impl Role {
    /// Classify a file by its name. Directory components are ignored.
    pub fn classify(name: &str) -> Self {
        let base = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name);

        for (stem, role) in CLOUD_INIT_NAMES {
            if let Some(rest) = base.strip_prefix(stem) {
                if CLOUD_INIT_SUFFIXES.contains(&rest) {
                    return *role;
                }
            }
        }

        OPENSTACK_NAMES
            .iter()
            .find(|(marker, _)| base.eq_ignore_ascii_case(marker))
            .map(|(_, role)| *role)
            .unwrap_or(Role::Unknown)
    }

    pub fn is_known(&self) -> bool {
        *self != Role::Unknown
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Metadata => write!(f, "meta-data"),
            Role::UserData => write!(f, "user-data"),
            Role::NetworkConfig => write!(f, "network-config"),
            Role::Unknown => write!(f, "unknown"),
        }
    }
}
