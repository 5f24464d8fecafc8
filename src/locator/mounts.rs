//! Mount table probe
//!
//! Candidates are the device-backed entries of `/proc/self/mounts`, in file
//! order. Labels are resolved through the `/dev/disk/by-label` symlinks that
//! udev maintains.

use super::{VolumeCandidate, VolumeProbe};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kernel mount table
pub const MOUNTS_FILE: &str = "/proc/self/mounts";

/// udev label symlink directory
pub const BY_LABEL_DIR: &str = "/dev/disk/by-label";

/// One line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

/// Probe over mounted block devices
#[derive(Debug, Clone)]
pub struct MountTable {
    mounts_file: PathBuf,
    by_label_dir: PathBuf,
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            mounts_file: PathBuf::from(MOUNTS_FILE),
            by_label_dir: PathBuf::from(BY_LABEL_DIR),
        }
    }

    /// Read the mount table and labels from other locations (useful for testing)
    pub fn with_paths(mounts_file: impl AsRef<Path>, by_label_dir: impl AsRef<Path>) -> Self {
        Self {
            mounts_file: mounts_file.as_ref().to_path_buf(),
            by_label_dir: by_label_dir.as_ref().to_path_buf(),
        }
    }

    /// Map canonical device path to label
    fn labels(&self) -> HashMap<PathBuf, String> {
        let mut labels = HashMap::new();

        let Ok(entries) = fs::read_dir(&self.by_label_dir) else {
            debug!("No label directory at {}", self.by_label_dir.display());
            return labels;
        };

        for entry in entries.flatten() {
            let Some(label) = entry.file_name().to_str().map(unescape_udev) else {
                continue;
            };
            if let Ok(device) = fs::canonicalize(entry.path()) {
                labels.insert(device, label);
            }
        }

        labels
    }
}

impl VolumeProbe for MountTable {
    fn name(&self) -> &'static str {
        "mount-table"
    }

    fn candidates(&self) -> Vec<VolumeCandidate> {
        let table = match fs::read_to_string(&self.mounts_file) {
            Ok(t) => t,
            Err(e) => {
                debug!("Cannot read {}: {}", self.mounts_file.display(), e);
                return Vec::new();
            }
        };

        let labels = self.labels();

        parse_mounts(&table)
            .into_iter()
            .filter(|m| m.device.starts_with("/dev/"))
            .map(|m| {
                let device =
                    fs::canonicalize(&m.device).unwrap_or_else(|_| PathBuf::from(&m.device));
                let label = labels.get(&device).cloned();
                let mut candidate = VolumeCandidate::from_dir(m.device, m.mount_point);
                candidate.label = label;
                candidate
            })
            .collect()
    }
}

/// Parse mount table text, keeping line order
pub fn parse_mounts(table: &str) -> Vec<MountEntry> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                device: unescape_octal(device),
                mount_point: PathBuf::from(unescape_octal(mount_point)),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// Decode the `\NNN` octal escapes the kernel uses for spaces and tabs
fn unescape_octal(field: &str) -> String {
    unescape(field, b"", 3, 8)
}

/// Decode the `\xNN` escapes udev uses in by-label link names
fn unescape_udev(name: &str) -> String {
    unescape(name, b"x", 2, 16)
}

/// Replace `\` + `marker` + `width` digits in `radix` with the byte they encode
fn unescape(text: &str, marker: &[u8], width: usize, radix: u32) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let start = i + 1 + marker.len();
        if bytes[i] == b'\\'
            && bytes[i + 1..].starts_with(marker)
            && start + width <= bytes.len()
        {
            let decoded = std::str::from_utf8(&bytes[start..start + width])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, radix).ok());
            if let Some(value) = decoded {
                out.push(value);
                i = start + width;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
