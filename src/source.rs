//! Config source: listing and reading documents under a config root

use crate::error::ReadError;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Raw bytes of one file from the config root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfigFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Access to the files under a resolved config root
pub trait ConfigSource {
    /// Names of the immediate, non-directory entries under `root`
    fn list(&self, root: &Path) -> Result<Vec<String>, ReadError>;

    /// Read one listed file fully into memory
    fn read(&self, root: &Path, name: &str) -> Result<RawConfigFile, ReadError>;
}

/// Config source backed by a mounted filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectorySource;

impl DirectorySource {
    pub fn new() -> Self {
        Self
    }
}

impl ConfigSource for DirectorySource {
    fn list(&self, root: &Path) -> Result<Vec<String>, ReadError> {
        let list_err = |source: std::io::Error| ReadError::List {
            root: root.to_path_buf(),
            source,
        };

        let mut names: Vec<String> = fs::read_dir(root)
            .map_err(list_err)?
            .filter_map(|entry| entry_name(root, entry))
            .collect();

        // Sort alphabetically
        names.sort();
        Ok(names)
    }

    fn read(&self, root: &Path, name: &str) -> Result<RawConfigFile, ReadError> {
        let contents = fs::read(root.join(name)).map_err(|source| ReadError::File {
            file: name.to_string(),
            source,
        })?;

        debug!("Read {} ({} bytes)", name, contents.len());
        Ok(RawConfigFile {
            name: name.to_string(),
            contents,
        })
    }
}

/// Name of a listable entry. An entry that cannot be read is skipped on
/// its own without failing the listing.
fn entry_name(root: &Path, entry: io::Result<fs::DirEntry>) -> Option<String> {
    let entry = match entry {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Skipping unreadable entry in {}: {}", root.display(), e);
            return None;
        }
    };

    // Symlinks are kept even when dangling; the read reports them
    if entry.file_type().is_ok_and(|t| t.is_dir()) {
        debug!("Skipping directory {:?}", entry.file_name());
        return None;
    }

    match entry.file_name().into_string() {
        Ok(name) => Some(name),
        Err(raw) => {
            debug!("Skipping non UTF-8 file name {:?}", raw);
            None
        }
    }
}
