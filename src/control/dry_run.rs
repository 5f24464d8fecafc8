//! Dry-run wrapper
//!
//! Queries go to the wrapped control plane so the run sees real host state.
//! Mutations are logged and reported as successful without being executed.

use super::{ControlPlane, InterfaceStatus};
use crate::error::ControlPlaneError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Control plane that only pretends to mutate
#[derive(Debug, Clone)]
pub struct DryRun<P> {
    inner: P,
}

impl<P: ControlPlane> DryRun<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: ControlPlane> ControlPlane for DryRun<P> {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn set_static_address(
        &self,
        interface: &str,
        address: &str,
        netmask: &str,
    ) -> Result<(), ControlPlaneError> {
        info!("[dry-run] set address {}/{} on {}", address, netmask, interface);
        Ok(())
    }

    fn set_gateway(
        &self,
        interface: &str,
        gateway: &str,
        metric: u32,
    ) -> Result<(), ControlPlaneError> {
        info!(
            "[dry-run] set default gateway {} on {} (metric {})",
            gateway, interface, metric
        );
        Ok(())
    }

    fn list_interfaces(&self) -> Result<Vec<InterfaceStatus>, ControlPlaneError> {
        self.inner.list_interfaces()
    }

    fn set_primary_dns(&self, interface: &str, server: &str) -> Result<(), ControlPlaneError> {
        info!("[dry-run] set primary DNS {} on {}", server, interface);
        Ok(())
    }

    fn add_secondary_dns(&self, interface: &str, server: &str) -> Result<(), ControlPlaneError> {
        info!("[dry-run] add DNS {} on {}", server, interface);
        Ok(())
    }

    fn account_exists(&self, name: &str) -> Result<bool, ControlPlaneError> {
        self.inner.account_exists(name)
    }

    fn create_account(&self, name: &str, _password: &str) -> Result<(), ControlPlaneError> {
        info!("[dry-run] create account {}", name);
        Ok(())
    }

    fn set_password(&self, name: &str, _password: &str) -> Result<(), ControlPlaneError> {
        info!("[dry-run] set password for {}", name);
        Ok(())
    }

    fn account_home(&self, name: &str) -> Result<PathBuf, ControlPlaneError> {
        self.inner.account_home(name)
    }

    fn ensure_directory(&self, path: &Path, mode: u32) -> Result<(), ControlPlaneError> {
        info!("[dry-run] ensure directory {} (mode {:o})", path.display(), mode);
        Ok(())
    }

    fn write_file(
        &self,
        path: &Path,
        contents: &[u8],
        mode: u32,
    ) -> Result<(), ControlPlaneError> {
        info!(
            "[dry-run] write {} bytes to {} (mode {:o})",
            contents.len(),
            path.display(),
            mode
        );
        Ok(())
    }

    fn set_owner(&self, path: &Path, account: &str) -> Result<(), ControlPlaneError> {
        info!("[dry-run] chown {} to {}", path.display(), account);
        Ok(())
    }
}
