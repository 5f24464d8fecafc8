//! Config drive discovery
//!
//! Walks the host's volumes in a fixed order and returns the first one that
//! looks like a config drive. Recognition, per accessible volume:
//! 1. volume label `config-2` (case-insensitive)
//! 2. a cloud-init marker file at the volume root
//! 3. an OpenStack marker file under `OPENSTACK/LATEST`
//!
//! Candidates come from a [`VolumeProbe`]:
//! - [`drives::DriveLetters`] - Windows drive letters `A:` to `Z:`
//! - [`mounts::MountTable`] - device-backed mounts from `/proc/self/mounts`
//! - [`SearchDirs`] - an explicit list of directories

pub mod drives;
pub mod mounts;

use crate::error::DiscoveryError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Volume label OpenStack-style hypervisors give a config drive
pub const CONFIG_DRIVE_LABEL: &str = "config-2";

/// cloud-init marker files looked for at the volume root
pub const FLAT_MARKERS: &[&str] = &[
    "meta-data",
    "user-data",
    "network-config",
    "vendor-data",
    "meta-data.json",
    "user-data.json",
    "network-config.json",
    "meta-data.yaml",
    "user-data.yaml",
    "network-config.yaml",
];

/// Nested directory spellings holding the OpenStack layout
pub const NESTED_DIRS: &[&str] = &["OPENSTACK/LATEST", "openstack/latest"];

/// OpenStack marker files, matched without regard to case
pub const NESTED_MARKERS: &[&str] = &["META_DATA.JSON", "USER_DATA", "VENDOR_DATA.JSON"];

/// A storage volume that may hold the config drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeCandidate {
    /// Identifier used in logs and the report (drive letter, device path)
    pub id: String,
    /// Directory the volume's contents are reachable at
    pub root: PathBuf,
    pub accessible: bool,
    pub label: Option<String>,
}

impl VolumeCandidate {
    /// Candidate for a directory, with accessibility taken from the filesystem
    pub fn from_dir(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            id: id.into(),
            accessible: fs::metadata(&root).is_ok_and(|m| m.is_dir()),
            root,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Source of candidate volumes, in a fixed enumeration order
pub trait VolumeProbe {
    /// Name of this probe (e.g., "drive-letters")
    fn name(&self) -> &'static str;

    /// Candidate volumes, in the order they must be checked
    fn candidates(&self) -> Vec<VolumeCandidate>;
}

impl VolumeProbe for Vec<VolumeCandidate> {
    fn name(&self) -> &'static str {
        "static"
    }

    fn candidates(&self) -> Vec<VolumeCandidate> {
        self.clone()
    }
}

/// Probe over an explicit list of directories
#[derive(Debug, Clone, Default)]
pub struct SearchDirs {
    dirs: Vec<PathBuf>,
}

impl SearchDirs {
    pub fn new(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }
}

impl VolumeProbe for SearchDirs {
    fn name(&self) -> &'static str {
        "search-dirs"
    }

    fn candidates(&self) -> Vec<VolumeCandidate> {
        self.dirs
            .iter()
            .map(|dir| VolumeCandidate::from_dir(dir.display().to_string(), dir))
            .collect()
    }
}

/// How the config root was recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Volume label matched
    Label,
    /// Marker files at the volume root
    Flat,
    /// Marker files under the nested OpenStack directory
    Nested,
    /// Given by the operator, no probing done
    Explicit,
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layout::Label => write!(f, "label"),
            Layout::Flat => write!(f, "flat"),
            Layout::Nested => write!(f, "nested"),
            Layout::Explicit => write!(f, "explicit"),
        }
    }
}

/// Directory believed to hold the configuration documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigRoot {
    /// Volume the root lives on
    pub volume: String,
    pub path: PathBuf,
    pub layout: Layout,
}

/// Volume recognition settings
#[derive(Debug, Clone)]
pub struct Locator {
    label: String,
}

impl Default for Locator {
    fn default() -> Self {
        Self::new()
    }
}

impl Locator {
    pub fn new() -> Self {
        Self {
            label: CONFIG_DRIVE_LABEL.to_string(),
        }
    }

    /// Match a different volume label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Find the config root among the probe's candidates
    pub fn locate(&self, probe: &dyn VolumeProbe) -> Result<ConfigRoot, DiscoveryError> {
        let candidates = probe.candidates();
        let probed = candidates.len();
        let mut accessible = 0;

        debug!("Probing {} volumes via {}", probed, probe.name());

        for candidate in &candidates {
            if !candidate.accessible {
                debug!("Skipping inaccessible volume {}", candidate.id);
                continue;
            }
            accessible += 1;

            debug!("Checking volume {}", candidate.id);
            if let Some(root) = self.recognize(candidate) {
                info!(
                    "Config drive found on {} ({} layout): {}",
                    root.volume,
                    root.layout,
                    root.path.display()
                );
                return Ok(root);
            }
        }

        if accessible == 0 {
            Err(DiscoveryError::NoAccessibleVolume { probed })
        } else {
            Err(DiscoveryError::NotFound { probed, accessible })
        }
    }

    /// Apply the recognition strategies to one accessible volume
    fn recognize(&self, candidate: &VolumeCandidate) -> Option<ConfigRoot> {
        let volume = candidate.id.clone();
        let root = candidate.root.as_path();

        if candidate
            .label
            .as_deref()
            .is_some_and(|l| l.trim().eq_ignore_ascii_case(&self.label))
        {
            debug!("Volume {} carries label {}", candidate.id, self.label);
            let path = nested_dir(root).unwrap_or_else(|| root.to_path_buf());
            return Some(ConfigRoot {
                volume,
                path,
                layout: Layout::Label,
            });
        }

        if let Some(marker) = FLAT_MARKERS.iter().find(|m| root.join(m).exists()) {
            debug!("Found marker {} on {}", marker, candidate.id);
            return Some(ConfigRoot {
                volume,
                path: root.to_path_buf(),
                layout: Layout::Flat,
            });
        }

        if let Some(dir) = nested_dir(root) {
            if has_nested_marker(&dir) {
                debug!("Found OpenStack layout at {}", dir.display());
                return Some(ConfigRoot {
                    volume,
                    path: dir,
                    layout: Layout::Nested,
                });
            }
        }

        None
    }
}

/// Locate with default recognition settings
pub fn locate(probe: &dyn VolumeProbe) -> Result<ConfigRoot, DiscoveryError> {
    Locator::new().locate(probe)
}

/// Probe for this platform: drive letters on Windows, the mount table elsewhere
pub fn platform_probe() -> Box<dyn VolumeProbe> {
    if cfg!(windows) {
        Box::new(drives::DriveLetters::new())
    } else {
        Box::new(mounts::MountTable::new())
    }
}

/// The nested OpenStack directory under `root`, if it exists
fn nested_dir(root: &Path) -> Option<PathBuf> {
    NESTED_DIRS
        .iter()
        .map(|d| root.join(d))
        .find(|d| d.is_dir())
}

fn has_nested_marker(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };

    entries.flatten().any(|entry| {
        entry.file_name().to_str().is_some_and(|name| {
            NESTED_MARKERS
                .iter()
                .any(|marker| name.eq_ignore_ascii_case(marker))
        })
    })
}
