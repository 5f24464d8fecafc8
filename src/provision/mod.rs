//! Provisioning pass
//!
//! locate, list, then per file read, classify and parse. Parsed documents
//! fill one slot per role and the slots are merged once the scan is done.
//! The network section and each user are then applied independently:
//! one failing never stops the others.

pub mod report;

pub use report::{ApplyOutcome, FileOutcome, FileStatus, Observed, RunReport, UserOutcome};

use crate::config::CanonicalConfig;
use crate::config::merge::RoleSlots;
use crate::control::ControlPlane;
use crate::document::{self, Role};
use crate::error::{ApplyError, DiscoveryError, ProvisionError};
use crate::locator::{self, ConfigRoot, Layout, Locator, SearchDirs, VolumeProbe};
use crate::modules;
use crate::source::ConfigSource;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Operator settings for a provisioning pass
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    /// Use this directory as the config root instead of probing volumes
    pub root: Option<PathBuf>,
    /// Probe these directories instead of the platform's volumes
    pub search_dirs: Vec<PathBuf>,
    /// Volume label to match instead of `config-2`
    pub label: Option<String>,
}

impl ProvisionOptions {
    /// Volume probe these options ask for
    pub fn probe(&self) -> Box<dyn VolumeProbe> {
        if self.search_dirs.is_empty() {
            locator::platform_probe()
        } else {
            Box::new(SearchDirs::new(self.search_dirs.iter().cloned()))
        }
    }

    pub fn locator(&self) -> Locator {
        match &self.label {
            Some(label) => Locator::new().with_label(label.clone()),
            None => Locator::new(),
        }
    }
}

/// Result of scanning a config root, before anything is applied
#[derive(Debug, Clone)]
pub struct Scan {
    pub root: ConfigRoot,
    pub files: Vec<FileOutcome>,
    pub slots: RoleSlots,
}

impl Scan {
    /// Merged view of every role's document
    pub fn config(&self) -> CanonicalConfig {
        self.slots.merge()
    }
}

/// Drives a provisioning pass against a source and a control plane
pub struct Provisioner<'a> {
    options: ProvisionOptions,
    probe: Box<dyn VolumeProbe + 'a>,
    source: &'a dyn ConfigSource,
    control: &'a dyn ControlPlane,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        options: ProvisionOptions,
        source: &'a dyn ConfigSource,
        control: &'a dyn ControlPlane,
    ) -> Self {
        let probe = options.probe();
        Self {
            options,
            probe,
            source,
            control,
        }
    }

    /// Probe volumes with `probe` instead of the one the options select
    pub fn with_probe(mut self, probe: impl VolumeProbe + 'a) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Resolve the config root, honoring an explicit root
    pub fn locate(&self) -> Result<ConfigRoot, DiscoveryError> {
        if let Some(root) = &self.options.root {
            info!("Using config root {}", root.display());
            return Ok(ConfigRoot {
                volume: root.display().to_string(),
                path: root.clone(),
                layout: Layout::Explicit,
            });
        }
        self.options.locator().locate(self.probe.as_ref())
    }

    /// Locate and read every document without touching the host
    pub fn scan(&self) -> Result<Scan, ProvisionError> {
        let root = self.locate()?;
        let names = self.source.list(&root.path)?;
        info!("Found {} files in {}", names.len(), root.path.display());

        let mut slots = RoleSlots::new();
        let mut files = Vec::with_capacity(names.len());

        for name in names {
            let status = self.scan_file(&root, &name, &mut slots);
            files.push(FileOutcome { name, status });
        }

        Ok(Scan { root, files, slots })
    }

    fn scan_file(&self, root: &ConfigRoot, name: &str, slots: &mut RoleSlots) -> FileStatus {
        let raw = match self.source.read(&root.path, name) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{}", e);
                return FileStatus::ReadFailed {
                    error: e.to_string(),
                };
            }
        };

        let role = Role::classify(name);
        if !role.is_known() {
            debug!("Skipping {}: not a config document", name);
            return FileStatus::Skipped;
        }

        match document::parse(&raw, role) {
            Ok(doc) => {
                info!("Parsed {} as {} ({})", name, role, doc.encoding);
                let encoding = doc.encoding;
                slots.insert(doc);
                FileStatus::Parsed { role, encoding }
            }
            Err(e) => {
                warn!("{}", e);
                FileStatus::ParseFailed {
                    role,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Full pass: scan, then apply network and users
    pub fn run(&self) -> Result<RunReport, ProvisionError> {
        let scan = self.scan()?;
        let config = scan.config();
        info!("Applying through {} control plane", self.control.name());

        let network = match &config.network {
            Some(net) => match modules::network::apply(net, self.control) {
                Ok(summary) => ApplyOutcome::Applied(summary),
                Err(e) => {
                    let message = e.to_string();
                    error!("{}", ApplyError::from(e));
                    ApplyOutcome::Failed(message)
                }
            },
            None => {
                debug!("No network config observed");
                ApplyOutcome::Skipped
            }
        };

        let users = config
            .users()
            .iter()
            .map(|user| {
                let outcome = match modules::users::apply(user, self.control) {
                    Ok(summary) => ApplyOutcome::Applied(summary),
                    Err(e) => {
                        let message = e.to_string();
                        error!("{}", ApplyError::from(e));
                        ApplyOutcome::Failed(message)
                    }
                };
                UserOutcome {
                    name: user.name.clone(),
                    outcome,
                }
            })
            .collect();

        let observed = observe(&config);

        let report = RunReport {
            root: scan.root,
            files: scan.files,
            observed,
            network,
            users,
        };

        if report.has_failures() {
            warn!("Provisioning finished with failures");
        } else {
            info!("Provisioning finished");
        }

        Ok(report)
    }
}

/// Settings carried through to the report without being applied
fn observe(config: &CanonicalConfig) -> Observed {
    if let Some(hostname) = &config.hostname {
        info!("Hostname {} is reported only", hostname);
    }
    if config.rdp.is_some() {
        info!("RDP settings are reported only");
    }

    Observed {
        hostname: config.hostname.clone(),
        instance_id: config.instance_id.clone(),
        ssh_authorized_keys: config.ssh_authorized_keys().len(),
        rdp: config.rdp.clone(),
    }
}
