//! Canonical configuration schema
//!
//! One set of types serves both YAML and JSON documents. Every top-level
//! field is optional so that a key that was never supplied can be told apart
//! from one that was supplied empty.

pub mod merge;
mod scalar;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unified configuration built from the documents on a config drive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalConfig {
    /// Hostname (`local-hostname` in NoCloud meta-data)
    #[serde(
        alias = "local-hostname",
        deserialize_with = "scalar::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub hostname: Option<String>,

    /// Instance identifier (`instance-id` in NoCloud, `uuid` in OpenStack)
    #[serde(
        alias = "instance-id",
        alias = "uuid",
        deserialize_with = "scalar::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub instance_id: Option<String>,

    /// Local accounts to create or update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<UserConfig>>,

    /// Static network settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,

    /// Top-level SSH keys, not tied to a listed user
    #[serde(
        deserialize_with = "scalar::opt_string_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub ssh_authorized_keys: Option<Vec<String>>,

    /// OpenStack meta_data `public_keys` map; folded into `ssh_authorized_keys`
    #[serde(skip_serializing)]
    pub public_keys: Option<BTreeMap<String, String>>,

    /// Remote desktop settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdp: Option<RdpSettings>,
}

/// Network configuration section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Schema version marker; zero is a legitimate value, not "absent"
    pub version: i64,

    /// Devices to configure, in order
    pub config: Vec<NetDevice>,

    /// DNS servers; the first one is primary
    #[serde(deserialize_with = "scalar::string_list")]
    pub nameservers: Vec<String>,

    /// DNS search domain
    #[serde(deserialize_with = "scalar::string")]
    pub domain: String,
}

/// Static IPv4 settings for one interface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetDevice {
    #[serde(rename = "type", deserialize_with = "scalar::string")]
    pub device_type: String,
    #[serde(deserialize_with = "scalar::string")]
    pub name: String,
    #[serde(deserialize_with = "scalar::string")]
    pub address: String,
    #[serde(deserialize_with = "scalar::string")]
    pub netmask: String,
    #[serde(deserialize_with = "scalar::opt_string")]
    pub gateway: Option<String>,
}

impl NetDevice {
    /// Gateway to configure, if any. Empty strings count as unset.
    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }
}

/// Local account settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    #[serde(deserialize_with = "scalar::string")]
    pub name: String,
    #[serde(deserialize_with = "scalar::string")]
    pub passwd: String,
    #[serde(deserialize_with = "scalar::string_list")]
    pub ssh_authorized_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sudo: Option<SudoSpec>,
}

/// Sudo privilege tag. Recorded only; enforcement belongs to the OS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SudoSpec {
    /// `sudo: false`
    Flag(bool),
    /// A single sudoers rule
    Rule(#[serde(deserialize_with = "scalar::string")] String),
    /// Several sudoers rules
    Rules(#[serde(deserialize_with = "scalar::string_list")] Vec<String>),
}

/// Remote desktop settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdpSettings {
    pub enabled: bool,
    pub port: u16,
    #[serde(deserialize_with = "scalar::string")]
    pub security: String,
}

impl CanonicalConfig {
    /// Hostname, or the empty string when no document supplied one
    pub fn hostname(&self) -> &str {
        self.hostname.as_deref().unwrap_or_default()
    }

    /// Users, or an empty slice when no document supplied a `users` key
    pub fn users(&self) -> &[UserConfig] {
        self.users.as_deref().unwrap_or_default()
    }

    /// Top-level SSH keys
    pub fn ssh_authorized_keys(&self) -> &[String] {
        self.ssh_authorized_keys.as_deref().unwrap_or_default()
    }

    /// Whether any document carried a `network` section
    pub fn has_network(&self) -> bool {
        self.network.is_some()
    }

    /// Whether any document carried a `users` key
    pub fn has_users(&self) -> bool {
        self.users.is_some()
    }

    /// Fold the OpenStack `public_keys` map into `ssh_authorized_keys`.
    ///
    /// Keys are appended in key-name order after any explicit list.
    pub fn fold_public_keys(&mut self) {
        if let Some(map) = self.public_keys.take() {
            if map.is_empty() {
                return;
            }
            let keys = self.ssh_authorized_keys.get_or_insert_with(Vec::new);
            for key in map.into_values() {
                let key = key.trim().to_string();
                if !key.is_empty() && !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
    }
}
