//! Merging parsed documents into one canonical config
//!
//! Each role keeps only its most recent document. The retained documents are
//! then overlaid in precedence order:
//! 1. meta-data (base)
//! 2. network-config / vendor-data
//! 3. user-data (highest priority)
//!
//! Overlay is per top-level key: a key present in a later document replaces
//! the earlier value wholesale. There is no deep merge.

use super::CanonicalConfig;
use crate::document::{Document, Role};
use tracing::{debug, warn};

/// Most recent document per role
#[derive(Debug, Clone, Default)]
pub struct RoleSlots {
    metadata: Option<Document>,
    network: Option<Document>,
    user_data: Option<Document>,
}

impl RoleSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document in its role's slot, returning the one it displaced.
    ///
    /// Documents of role `Unknown` are never stored.
    pub fn insert(&mut self, document: Document) -> Option<Document> {
        let slot = match document.role {
            Role::Metadata => &mut self.metadata,
            Role::NetworkConfig => &mut self.network,
            Role::UserData => &mut self.user_data,
            Role::Unknown => return None,
        };

        if let Some(prev) = slot.as_ref() {
            if prev.config.has_network() && !document.config.has_network() {
                warn!(
                    "{} replaces {} as the {} document and carries no network section; \
                     the network settings in {} are dropped",
                    document.file, prev.file, prev.role, prev.file
                );
            } else {
                debug!(
                    "Replacing earlier {} document from {} with {}",
                    prev.role, prev.file, document.file
                );
            }
        }
        slot.replace(document)
    }

    /// Document currently held for a role
    pub fn get(&self, role: Role) -> Option<&Document> {
        match role {
            Role::Metadata => self.metadata.as_ref(),
            Role::NetworkConfig => self.network.as_ref(),
            Role::UserData => self.user_data.as_ref(),
            Role::Unknown => None,
        }
    }

    /// Whether no document has been stored
    pub fn is_empty(&self) -> bool {
        self.metadata.is_none() && self.network.is_none() && self.user_data.is_none()
    }

    /// Overlay the retained documents in precedence order
    pub fn merge(&self) -> CanonicalConfig {
        let mut merged = CanonicalConfig::default();
        for document in [&self.metadata, &self.network, &self.user_data]
            .into_iter()
            .flatten()
        {
            overlay(&mut merged, &document.config);
        }
        merged
    }
}

/// Replace every key in `base` that `top` supplies
pub fn overlay(base: &mut CanonicalConfig, top: &CanonicalConfig) {
    if top.hostname.is_some() {
        base.hostname.clone_from(&top.hostname);
    }
    if top.instance_id.is_some() {
        base.instance_id.clone_from(&top.instance_id);
    }
    if top.users.is_some() {
        base.users.clone_from(&top.users);
    }
    if top.network.is_some() {
        base.network.clone_from(&top.network);
    }
    if top.ssh_authorized_keys.is_some() {
        base.ssh_authorized_keys.clone_from(&top.ssh_authorized_keys);
    }
    if top.rdp.is_some() {
        base.rdp.clone_from(&top.rdp);
    }
}
