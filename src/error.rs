//! Error types for configdrive-init
//!
//! Discovery errors are fatal to a run. Read and parse errors are scoped to
//! one file. Apply errors are scoped to one configurator invocation.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to find a config drive among the host's volumes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("No accessible volume found ({probed} probed)")]
    NoAccessibleVolume { probed: usize },

    #[error(
        "Config drive not found: {accessible} of {probed} volumes were accessible but none carried the config-2 label or marker files"
    )]
    NotFound { probed: usize, accessible: usize },
}

/// Failure to list the config root or read one file from it
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Failed to list {}: {source}", root.display())]
    List {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {file}: {source}")]
    File {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a document could not be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Not valid YAML or JSON, or a corrupt gzip payload
    Malformed,
    /// Valid syntax but the content does not fit the config schema
    SchemaMismatch,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErrorKind::Malformed => write!(f, "malformed"),
            ParseErrorKind::SchemaMismatch => write!(f, "schema mismatch"),
        }
    }
}

/// Failure to parse one document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to parse {file} ({kind}): {message}")]
pub struct ParseError {
    pub file: String,
    pub kind: ParseErrorKind,
    pub message: String,
}

impl ParseError {
    pub fn malformed(file: impl Into<String>, message: impl ToString) -> Self {
        Self {
            file: file.into(),
            kind: ParseErrorKind::Malformed,
            message: message.to_string(),
        }
    }

    pub fn schema(file: impl Into<String>, message: impl ToString) -> Self {
        Self {
            file: file.into(),
            kind: ParseErrorKind::SchemaMismatch,
            message: message.to_string(),
        }
    }
}

/// Failure reported by the OS control plane for a single verb
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {output}")]
    Command {
        program: String,
        status: String,
        output: String,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Rejected(String),
}

/// Failure while applying network settings
#[derive(Error, Debug)]
pub enum NetworkApplyError {
    #[error("Device #{index} is missing its {field}")]
    IncompleteDevice { index: usize, field: &'static str },

    #[error("Failed to set address {address}/{netmask} on {device}: {source}")]
    Address {
        device: String,
        address: String,
        netmask: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("Failed to set gateway {gateway} on {device}: {source}")]
    Gateway {
        device: String,
        gateway: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("Failed to list network interfaces: {0}")]
    ListInterfaces(#[source] ControlPlaneError),

    #[error("No connected network interface to carry DNS servers")]
    NoActiveInterface,

    #[error("Failed to set primary DNS {server} on {interface}: {source}")]
    PrimaryDns {
        interface: String,
        server: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("Failed to add DNS {server} on {interface}: {source}")]
    SecondaryDns {
        interface: String,
        server: String,
        #[source]
        source: ControlPlaneError,
    },
}

/// Failure while applying one account
#[derive(Error, Debug)]
pub enum UserApplyError {
    #[error("User entry has no name")]
    MissingName,

    #[error("Failed to look up user {user}: {source}")]
    Lookup {
        user: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("Failed to create user {user}: {source}")]
    Create {
        user: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("Failed to set password for {user}: {source}")]
    Password {
        user: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("Failed to prepare SSH directory for {user}: {source}")]
    SshDirectory {
        user: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("Failed to write authorized_keys for {user}: {source}")]
    AuthorizedKeys {
        user: String,
        #[source]
        source: ControlPlaneError,
    },
}

/// Failure of one configurator's apply pass
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Network: {0}")]
    Network(#[from] NetworkApplyError),

    #[error("User: {0}")]
    User(#[from] UserApplyError),
}

/// Run-level failure: nothing could be scanned
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Listing(#[from] ReadError),
}
