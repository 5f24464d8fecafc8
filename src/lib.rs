//! configdrive-init library
//!
//! Provisions a virtual machine from a config drive: finds the volume,
//! reads and merges its YAML or JSON documents, then applies static network
//! settings and local accounts through an OS control plane.
//!
//! # Design Principles
//!
//! - **Safety First**: No unsafe code (`#![forbid(unsafe_code)]`)
//! - **Testable**: All host mutation goes through [`control::ControlPlane`]
//! - **Partial failure**: One bad file or one bad user never stops the rest
//!
//! # Pipeline
//!
//! ```text
//! locator -> source -> document -> config::merge -> modules::{network, users}
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod control;
pub mod document;
pub mod error;
pub mod locator;
pub mod modules;
pub mod provision;
pub mod source;

pub use config::CanonicalConfig;
pub use control::ControlPlane;
pub use document::{Document, Role};
pub use error::{ApplyError, DiscoveryError, ParseError, ProvisionError, ReadError};
pub use locator::{ConfigRoot, Locator};
pub use provision::{ProvisionOptions, Provisioner, RunReport};
pub use source::{ConfigSource, DirectorySource};

/// Run a full pass against the local filesystem
pub fn provision(
    options: ProvisionOptions,
    control: &dyn ControlPlane,
) -> Result<RunReport, ProvisionError> {
    let source = DirectorySource::new();
    Provisioner::new(options, &source, control).run()
}
