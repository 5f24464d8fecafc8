//! Integration tests for document classification and parsing

use configdrive_init::config::{NetDevice, SudoSpec};
use configdrive_init::document::{self, Encoding, Role};
use configdrive_init::error::ParseErrorKind;
use configdrive_init::source::RawConfigFile;

fn raw(name: &str, contents: &str) -> RawConfigFile {
    RawConfigFile {
        name: name.to_string(),
        contents: contents.as_bytes().to_vec(),
    }
}

const USER_DATA_YAML: &str = r#"#cloud-config
hostname: web-01
ssh_authorized_keys:
  - ssh-ed25519 AAAAC3 ops@example
users:
  - name: admin
    passwd: "S3cret!"
    ssh_authorized_keys:
      - ssh-rsa AAAAB3 admin@example
    sudo: "ALL=(ALL) NOPASSWD:ALL"
  - name: backup
network:
  version: 1
  config:
    - type: static
      name: Ethernet
      address: 192.168.10.20
      netmask: 255.255.255.0
      gateway: 192.168.10.1
    - type: static
      name: Ethernet 2
      address: 10.0.0.20
      netmask: 255.0.0.0
      gateway: ""
  nameservers:
    - 8.8.8.8
    - 1.1.1.1
  domain: example.internal
rdp:
  enabled: true
  port: 3389
  security: nla
"#;

const USER_DATA_JSON: &str = r#"{
  "hostname": "web-01",
  "ssh_authorized_keys": ["ssh-ed25519 AAAAC3 ops@example"],
  "users": [
    {
      "name": "admin",
      "passwd": "S3cret!",
      "ssh_authorized_keys": ["ssh-rsa AAAAB3 admin@example"],
      "sudo": "ALL=(ALL) NOPASSWD:ALL"
    },
    {"name": "backup"}
  ],
  "network": {
    "version": 1,
    "config": [
      {
        "type": "static",
        "name": "Ethernet",
        "address": "192.168.10.20",
        "netmask": "255.255.255.0",
        "gateway": "192.168.10.1"
      },
      {
        "type": "static",
        "name": "Ethernet 2",
        "address": "10.0.0.20",
        "netmask": "255.0.0.0",
        "gateway": ""
      }
    ],
    "nameservers": ["8.8.8.8", "1.1.1.1"],
    "domain": "example.internal"
  },
  "rdp": {"enabled": true, "port": 3389, "security": "nla"}
}"#;

/// YAML and JSON encodings of the same document decode identically
#[test]
fn test_yaml_and_json_are_equivalent() {
    let yaml = document::parse(&raw("user-data", USER_DATA_YAML), Role::UserData).unwrap();
    let json = document::parse(&raw("USER_DATA", USER_DATA_JSON), Role::UserData).unwrap();

    assert_eq!(yaml.encoding, Encoding::Yaml);
    assert_eq!(json.encoding, Encoding::Json);
    assert_eq!(yaml.config, json.config);

    // Serialized forms agree too
    assert_eq!(
        serde_json::to_string(&yaml.config).unwrap(),
        serde_json::to_string(&json.config).unwrap()
    );
}

/// Every schema field lands where expected
#[test]
fn test_full_schema_fields() {
    let doc = document::parse(&raw("user-data", USER_DATA_YAML), Role::UserData).unwrap();
    let config = doc.config;

    assert_eq!(config.hostname(), "web-01");
    assert_eq!(config.ssh_authorized_keys(), ["ssh-ed25519 AAAAC3 ops@example"]);

    let users = config.users();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].name, "admin");
    assert_eq!(users[0].passwd, "S3cret!");
    assert_eq!(
        users[0].sudo,
        Some(SudoSpec::Rule("ALL=(ALL) NOPASSWD:ALL".to_string()))
    );
    assert_eq!(users[1].name, "backup");
    assert!(users[1].passwd.is_empty());
    assert!(users[1].ssh_authorized_keys.is_empty());

    let network = config.network.as_ref().unwrap();
    assert_eq!(network.version, 1);
    assert_eq!(network.nameservers, vec!["8.8.8.8", "1.1.1.1"]);
    assert_eq!(network.domain, "example.internal");
    assert_eq!(
        network.config[0],
        NetDevice {
            device_type: "static".to_string(),
            name: "Ethernet".to_string(),
            address: "192.168.10.20".to_string(),
            netmask: "255.255.255.0".to_string(),
            gateway: Some("192.168.10.1".to_string()),
        }
    );
    assert_eq!(network.config[1].gateway(), None);

    let rdp = config.rdp.as_ref().unwrap();
    assert!(rdp.enabled);
    assert_eq!(rdp.port, 3389);
    assert_eq!(rdp.security, "nla");
}

#[test]
fn test_role_classification() {
    assert_eq!(Role::classify("USER_DATA"), Role::UserData);
    assert_eq!(Role::classify("user-data.yaml"), Role::UserData);
    assert_eq!(Role::classify("README.txt"), Role::Unknown);
    assert_eq!(Role::classify("meta_data.json"), Role::Metadata);
    assert_eq!(Role::classify("vendor-data"), Role::NetworkConfig);
    assert_eq!(Role::classify("VENDOR_DATA.JSON"), Role::NetworkConfig);
}

/// Encoding is decided by content, not the file name
#[test]
fn test_extension_does_not_decide_encoding() {
    let doc = document::parse(&raw("user-data.json", "hostname: yaml-inside\n"), Role::UserData)
        .unwrap();
    assert_eq!(doc.encoding, Encoding::Yaml);
    assert_eq!(doc.config.hostname(), "yaml-inside");
}

/// One bad document yields a per-file error naming that file
#[test]
fn test_parse_errors_are_per_file() {
    let err = document::parse(&raw("meta-data", "hostname: [unclosed\n"), Role::Metadata)
        .unwrap_err();
    assert_eq!(err.file, "meta-data");
    assert_eq!(err.kind, ParseErrorKind::Malformed);

    let err = document::parse(&raw("user-data", "users: 42\n"), Role::UserData).unwrap_err();
    assert_eq!(err.file, "user-data");
    assert_eq!(err.kind, ParseErrorKind::SchemaMismatch);

    let ok = document::parse(&raw("user-data", "hostname: fine\n"), Role::UserData).unwrap();
    assert_eq!(ok.config.hostname(), "fine");
}

/// `version: 0` still counts as an observed network section
#[test]
fn test_version_zero_network_observed() {
    let doc = document::parse(
        &raw("network-config", "version: 0\nnameservers: [9.9.9.9]\n"),
        Role::NetworkConfig,
    )
    .unwrap();

    let network = doc.config.network.unwrap();
    assert_eq!(network.version, 0);
    assert_eq!(network.nameservers, vec!["9.9.9.9"]);
}

/// Unquoted numbers and booleans in text fields keep their textual form
#[test]
fn test_plain_scalars_in_text_fields() {
    let yaml = "\
hostname: 2024
users:
  - name: 1000
    passwd: 12345678
    ssh_authorized_keys: [ssh-ed25519 AAAAC3 ops@example]
network:
  version: 1
  config:
    - type: static
      name: 7
      address: 10.0.0.5
      netmask: 24
  nameservers: [8.8.8.8]
  domain: true
";
    let json = r#"{
  "hostname": 2024,
  "users": [
    {"name": 1000, "passwd": 12345678, "ssh_authorized_keys": ["ssh-ed25519 AAAAC3 ops@example"]}
  ],
  "network": {
    "version": 1,
    "config": [
      {"type": "static", "name": 7, "address": "10.0.0.5", "netmask": 24}
    ],
    "nameservers": ["8.8.8.8"],
    "domain": true
  }
}"#;

    let from_yaml = document::parse(&raw("user-data", yaml), Role::UserData).unwrap();
    let from_json = document::parse(&raw("user-data", json), Role::UserData).unwrap();
    assert_eq!(from_yaml.config, from_json.config);

    let config = from_yaml.config;
    assert_eq!(config.hostname(), "2024");

    let users = config.users();
    assert_eq!(users[0].name, "1000");
    assert_eq!(users[0].passwd, "12345678");
    assert_eq!(users[0].ssh_authorized_keys, ["ssh-ed25519 AAAAC3 ops@example"]);

    let network = config.network.unwrap();
    assert_eq!(network.config[0].name, "7");
    assert_eq!(network.config[0].netmask, "24");
    assert_eq!(network.config[0].gateway(), None);
    assert_eq!(network.domain, "true");
}

/// A null text field reads as unset instead of rejecting the document
#[test]
fn test_null_text_fields() {
    let doc = document::parse(
        &raw("user-data", "hostname:\nusers:\n  - name: admin\n    passwd:\n"),
        Role::UserData,
    )
    .unwrap();

    assert_eq!(doc.config.hostname, None);
    assert_eq!(doc.config.users()[0].name, "admin");
    assert!(doc.config.users()[0].passwd.is_empty());
}
