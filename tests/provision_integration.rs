//! End-to-end provisioning tests using tempfile volumes and the recording
//! control plane

use std::fs;
use std::path::{Path, PathBuf};

use configdrive_init::control::dry_run::DryRun;
use configdrive_init::control::recording::{Call, RecordingControlPlane, Verb};
use configdrive_init::locator::{Layout, SearchDirs, VolumeCandidate};
use configdrive_init::provision::{ApplyOutcome, FileStatus};
use configdrive_init::{
    DirectorySource, DiscoveryError, ProvisionError, ProvisionOptions, Provisioner,
};
use tempfile::TempDir;

const NETWORK_AND_USERS: &str = r#"
network:
  version: 1
  config:
    - type: static
      name: Ethernet
      address: 192.168.10.20
      netmask: 255.255.255.0
      gateway: 192.168.10.1
  nameservers: [8.8.8.8, 1.1.1.1]
users:
  - name: admin
    passwd: hunter2
    ssh_authorized_keys:
      - ssh-ed25519 AAAA admin@example
"#;

fn volume(temp: &TempDir, name: &str) -> PathBuf {
    let dir = temp.path().join(name);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn connected_plane() -> RecordingControlPlane {
    RecordingControlPlane::new()
        .with_interface("Wi-Fi", false)
        .with_interface("Ethernet", true)
}

/// A config-2 labelled volume matches without any marker files
#[test]
fn test_label_match_without_markers() {
    let temp = TempDir::new().unwrap();
    let flat = volume(&temp, "flat");
    fs::write(flat.join("meta-data"), "hostname: flat-host\n").unwrap();
    let labelled = volume(&temp, "labelled");
    fs::write(labelled.join("notes.txt"), "nothing to see").unwrap();

    let probe = vec![
        VolumeCandidate::from_dir("D:", &labelled).with_label("CONFIG-2"),
        VolumeCandidate::from_dir("E:", &flat),
    ];

    let source = DirectorySource::new();
    let plane = RecordingControlPlane::new();
    let report = Provisioner::new(ProvisionOptions::default(), &source, &plane)
        .with_probe(probe)
        .run()
        .unwrap();

    assert_eq!(report.root.volume, "D:");
    assert_eq!(report.root.layout, Layout::Label);
    assert_eq!(report.root.path, labelled);
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].status, FileStatus::Skipped);
    assert!(!report.has_failures());
}

/// Nested layout with only USER_DATA resolves to the nested directory
#[test]
fn test_nested_user_data_only() {
    let temp = TempDir::new().unwrap();
    let empty = volume(&temp, "empty");
    let drive = volume(&temp, "drive");
    let nested = drive.join("openstack/latest");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("USER_DATA"), NETWORK_AND_USERS).unwrap();

    let source = DirectorySource::new();
    let plane = connected_plane();
    let report = Provisioner::new(ProvisionOptions::default(), &source, &plane)
        .with_probe(SearchDirs::new([&empty, &drive]))
        .run()
        .unwrap();

    assert_eq!(report.root.layout, Layout::Nested);
    assert_eq!(report.root.path, nested);
    assert!(matches!(report.network, ApplyOutcome::Applied(_)));
    assert_eq!(report.users.len(), 1);
}

/// One unreadable file among five: the rest are still read and merged
#[cfg(unix)]
#[test]
fn test_one_unreadable_file_among_five() {
    let temp = TempDir::new().unwrap();
    let root = volume(&temp, "drive");
    fs::write(root.join("meta-data"), "instance-id: i-123\nlocal-hostname: vm-01\n").unwrap();
    fs::write(
        root.join("network-config"),
        "version: 1\nconfig:\n  - type: static\n    name: Ethernet\n    address: 10.0.0.5\n    netmask: 255.255.255.0\n",
    )
    .unwrap();
    fs::write(root.join("user-data"), "users:\n  - name: alice\n").unwrap();
    fs::write(root.join("README.txt"), "not config").unwrap();
    std::os::unix::fs::symlink(root.join("missing"), root.join("vendor-data")).unwrap();

    let source = DirectorySource::new();
    let plane = connected_plane();
    let report = Provisioner::new(ProvisionOptions::default(), &source, &plane)
        .with_probe(SearchDirs::new([&root]))
        .run()
        .unwrap();

    assert_eq!(report.files.len(), 5);
    assert_eq!(report.read_failures(), 1);
    assert_eq!(report.parse_failures(), 0);

    let failed: Vec<&str> = report
        .files
        .iter()
        .filter(|f| matches!(f.status, FileStatus::ReadFailed { .. }))
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(failed, vec!["vendor-data"]);

    assert_eq!(report.observed.hostname.as_deref(), Some("vm-01"));
    assert_eq!(report.observed.instance_id.as_deref(), Some("i-123"));
    assert!(matches!(report.network, ApplyOutcome::Applied(_)));
    assert!(plane.has_account("alice"));
    assert!(report.has_failures());
}

/// Network and users are applied in order through the control plane
#[test]
fn test_full_apply() {
    let temp = TempDir::new().unwrap();
    let root = volume(&temp, "drive");
    fs::write(root.join("user-data"), NETWORK_AND_USERS).unwrap();

    let source = DirectorySource::new();
    let plane = connected_plane().with_home_root("/home");
    let options = ProvisionOptions {
        root: Some(root.clone()),
        ..Default::default()
    };
    let report = Provisioner::new(options, &source, &plane).run().unwrap();

    assert_eq!(report.root.layout, Layout::Explicit);
    assert!(!report.has_failures());

    let network_verbs: Vec<Verb> = plane
        .calls()
        .iter()
        .map(Call::verb)
        .take_while(|v| *v != Verb::AccountExists)
        .collect();
    assert_eq!(
        network_verbs,
        vec![
            Verb::SetStaticAddress,
            Verb::SetGateway,
            Verb::ListInterfaces,
            Verb::SetPrimaryDns,
            Verb::AddSecondaryDns,
        ]
    );
    assert_eq!(plane.dns_servers("Ethernet"), vec!["8.8.8.8", "1.1.1.1"]);
    assert_eq!(plane.password("admin").as_deref(), Some("hunter2"));
    assert_eq!(
        plane.file(Path::new("/home/admin/.ssh/authorized_keys")),
        Some(b"ssh-ed25519 AAAA admin@example\n".to_vec())
    );
}

/// A second boot with the same drive succeeds and keeps state in sync
#[test]
fn test_rerun_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let root = volume(&temp, "drive");
    fs::write(root.join("user-data"), NETWORK_AND_USERS).unwrap();

    let source = DirectorySource::new();
    let plane = connected_plane();
    let options = ProvisionOptions {
        search_dirs: vec![root.clone()],
        ..Default::default()
    };

    let first = Provisioner::new(options.clone(), &source, &plane).run().unwrap();
    let second = Provisioner::new(options, &source, &plane).run().unwrap();

    assert!(!first.has_failures());
    assert!(!second.has_failures());
    assert_eq!(plane.calls_of(Verb::CreateAccount).len(), 1);
    assert_eq!(plane.calls_of(Verb::SetPassword).len(), 1);
    assert_eq!(plane.dns_servers("Ethernet"), vec!["8.8.8.8", "1.1.1.1"]);
}

/// Keys dropped from the document disappear on the next run
#[test]
fn test_authorized_keys_follow_document() {
    let temp = TempDir::new().unwrap();
    let root = volume(&temp, "drive");
    let source = DirectorySource::new();
    let plane = RecordingControlPlane::new();
    let options = ProvisionOptions {
        root: Some(root.clone()),
        ..Default::default()
    };
    let keys_path = Path::new("/home/alice/.ssh/authorized_keys");

    fs::write(
        root.join("user-data"),
        "users:\n  - name: alice\n    ssh_authorized_keys: [keyA]\n",
    )
    .unwrap();
    Provisioner::new(options.clone(), &source, &plane).run().unwrap();
    assert_eq!(plane.file(keys_path), Some(b"keyA\n".to_vec()));

    fs::write(
        root.join("user-data"),
        "users:\n  - name: alice\n    ssh_authorized_keys: [keyB]\n",
    )
    .unwrap();
    Provisioner::new(options, &source, &plane).run().unwrap();
    assert_eq!(plane.file(keys_path), Some(b"keyB\n".to_vec()));
}

/// A network failure is reported but users are still applied
#[test]
fn test_network_and_users_are_independent() {
    let temp = TempDir::new().unwrap();
    let root = volume(&temp, "drive");
    fs::write(root.join("user-data"), NETWORK_AND_USERS).unwrap();

    let source = DirectorySource::new();
    // No connected interface, so DNS fails after the device step
    let plane = RecordingControlPlane::new().with_interface("Ethernet", false);
    let options = ProvisionOptions {
        root: Some(root),
        ..Default::default()
    };
    let report = Provisioner::new(options, &source, &plane).run().unwrap();

    match &report.network {
        ApplyOutcome::Failed(message) => assert!(message.contains("No connected")),
        other => panic!("expected network failure, got {:?}", other),
    }
    assert!(plane.address("Ethernet").is_some());
    assert!(plane.has_account("admin"));
    assert_eq!(report.apply_failures(), 1);
}

/// network-config and vendor-data share a role; the later file wins even
/// when it carries no network section
#[test]
fn test_empty_vendor_data_displaces_network_config() {
    let temp = TempDir::new().unwrap();
    let root = volume(&temp, "drive");
    fs::write(
        root.join("network-config"),
        "version: 1\nnameservers: [8.8.8.8]\n",
    )
    .unwrap();
    fs::write(root.join("vendor-data"), "{}").unwrap();

    let source = DirectorySource::new();
    let plane = connected_plane();
    let options = ProvisionOptions {
        root: Some(root),
        ..Default::default()
    };
    let report = Provisioner::new(options, &source, &plane).run().unwrap();

    let names: Vec<&str> = report.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["network-config", "vendor-data"]);
    assert!(report
        .files
        .iter()
        .all(|f| matches!(f.status, FileStatus::Parsed { .. })));
    assert_eq!(report.network, ApplyOutcome::Skipped);
    assert!(plane.calls().is_empty());
    assert!(!report.has_failures());
}

#[test]
fn test_not_found_reports_accessible_count() {
    let temp = TempDir::new().unwrap();
    let a = volume(&temp, "a");
    let b = volume(&temp, "b");
    fs::write(b.join("random.bin"), [0u8; 4]).unwrap();

    let source = DirectorySource::new();
    let plane = RecordingControlPlane::new();
    let err = Provisioner::new(ProvisionOptions::default(), &source, &plane)
        .with_probe(SearchDirs::new([a, b, temp.path().join("absent")]))
        .run()
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::Discovery(DiscoveryError::NotFound {
            probed: 3,
            accessible: 2
        })
    ));
}

/// Dry run reads host state but changes nothing
#[test]
fn test_dry_run_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let root = volume(&temp, "drive");
    fs::write(root.join("user-data"), NETWORK_AND_USERS).unwrap();

    let source = DirectorySource::new();
    let plane = DryRun::new(connected_plane());
    let options = ProvisionOptions {
        root: Some(root),
        ..Default::default()
    };
    let report = Provisioner::new(options, &source, &plane).run().unwrap();

    assert!(!report.has_failures());
    let verbs: Vec<Verb> = plane.inner().calls().iter().map(Call::verb).collect();
    assert_eq!(verbs, vec![Verb::ListInterfaces, Verb::AccountExists, Verb::AccountHome]);
    assert!(!plane.inner().has_account("admin"));
}

/// Report renders in both output formats
#[test]
fn test_report_rendering() {
    let temp = TempDir::new().unwrap();
    let root = volume(&temp, "drive");
    fs::write(root.join("meta-data.json"), r#"{"hostname": "vm-01"}"#).unwrap();

    let source = DirectorySource::new();
    let plane = RecordingControlPlane::new();
    let options = ProvisionOptions {
        root: Some(root),
        ..Default::default()
    };
    let report = Provisioner::new(options, &source, &plane).run().unwrap();

    let text = report.to_string();
    assert!(text.contains("meta-data.json"));
    assert!(text.contains("parsed (meta-data, json)"));
    assert!(text.contains("Network: no network config"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["observed"]["hostname"], "vm-01");
    assert_eq!(json["files"][0]["encoding"], "json");
}
