//! Run report
//!
//! Everything a provisioning pass found and did, rendered as text through
//! `Display` or as JSON through `Serialize`.

use crate::config::RdpSettings;
use crate::document::{Encoding, Role};
use crate::locator::ConfigRoot;
use crate::modules::{NetworkSummary, UserSummary};
use serde::Serialize;
use std::fmt;

/// What happened to one listed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum FileStatus {
    Parsed { role: Role, encoding: Encoding },
    /// Name matched no known role
    Skipped,
    ReadFailed { error: String },
    ParseFailed { role: Role, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub name: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Result of one configurator invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum ApplyOutcome<T> {
    /// Nothing to apply
    Skipped,
    Applied(T),
    Failed(String),
}

impl<T> ApplyOutcome<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, ApplyOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserOutcome {
    pub name: String,
    pub outcome: ApplyOutcome<UserSummary>,
}

/// Informational settings that are reported but never applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Observed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Number of top-level SSH keys
    pub ssh_authorized_keys: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdp: Option<RdpSettings>,
}

/// Outcome of a full provisioning pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub root: ConfigRoot,
    pub files: Vec<FileOutcome>,
    pub observed: Observed,
    pub network: ApplyOutcome<NetworkSummary>,
    pub users: Vec<UserOutcome>,
}

impl RunReport {
    pub fn read_failures(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::ReadFailed { .. }))
            .count()
    }

    pub fn parse_failures(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::ParseFailed { .. }))
            .count()
    }

    pub fn apply_failures(&self) -> usize {
        let users = self.users.iter().filter(|u| u.outcome.is_failed()).count();
        users + usize::from(self.network.is_failed())
    }

    /// Whether anything failed along the way
    pub fn has_failures(&self) -> bool {
        self.read_failures() + self.parse_failures() + self.apply_failures() > 0
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Parsed { role, encoding } => write!(f, "parsed ({}, {})", role, encoding),
            FileStatus::Skipped => write!(f, "skipped (unknown role)"),
            FileStatus::ReadFailed { error } => write!(f, "read failed: {}", error),
            FileStatus::ParseFailed { error, .. } => write!(f, "parse failed: {}", error),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Config root: {} ({}, volume {})",
            self.root.path.display(),
            self.root.layout,
            self.root.volume
        )?;

        writeln!(f, "Files:")?;
        let width = self.files.iter().map(|o| o.name.len()).max().unwrap_or(0);
        for outcome in &self.files {
            writeln!(f, "  {:width$}  {}", outcome.name, outcome.status, width = width)?;
        }

        if let Some(hostname) = &self.observed.hostname {
            writeln!(f, "Hostname: {} (not applied)", hostname)?;
        }
        if let Some(instance_id) = &self.observed.instance_id {
            writeln!(f, "Instance: {}", instance_id)?;
        }
        if self.observed.ssh_authorized_keys > 0 {
            writeln!(
                f,
                "Top-level SSH keys: {} (not applied)",
                self.observed.ssh_authorized_keys
            )?;
        }
        if let Some(rdp) = &self.observed.rdp {
            writeln!(
                f,
                "RDP: enabled={} port={} security={} (not applied)",
                rdp.enabled, rdp.port, rdp.security
            )?;
        }

        match &self.network {
            ApplyOutcome::Skipped => writeln!(f, "Network: no network config")?,
            ApplyOutcome::Applied(summary) => {
                write!(f, "Network: {} device(s) configured", summary.devices.len())?;
                if let Some(interface) = &summary.dns_interface {
                    write!(
                        f,
                        ", DNS {} on {}",
                        summary.nameservers.join(", "),
                        interface
                    )?;
                }
                if let Some(domain) = &summary.domain {
                    write!(f, ", domain {}", domain)?;
                }
                writeln!(f)?;
            }
            ApplyOutcome::Failed(error) => writeln!(f, "Network: FAILED: {}", error)?,
        }

        if self.users.is_empty() {
            writeln!(f, "Users: none")?;
        } else {
            writeln!(f, "Users:")?;
            for user in &self.users {
                match &user.outcome {
                    ApplyOutcome::Skipped => writeln!(f, "  {}: skipped", user.name)?,
                    ApplyOutcome::Applied(summary) => writeln!(
                        f,
                        "  {}: {}, {} SSH key(s)",
                        user.name, summary.account, summary.keys
                    )?,
                    ApplyOutcome::Failed(error) => {
                        writeln!(f, "  {}: FAILED: {}", user.name, error)?
                    }
                }
            }
        }

        write!(
            f,
            "Summary: {} file(s), {} read failure(s), {} parse failure(s), {} apply failure(s)",
            self.files.len(),
            self.read_failures(),
            self.parse_failures(),
            self.apply_failures()
        )
    }
}
