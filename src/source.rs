//! Byte sources that back a dataset
//!
//! A dataset is a flat namespace of entries (the manifest plus payloads),
//! typically stored in an archive or a directory. The resolver only ever
//! needs whole entries by name, so the trait stays minimal; transports with
//! retry or caching policies implement it outside this crate.

use crate::error::{BvpError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Trait for fetching named payload entries of a dataset
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Read the entry with the given name in full
    async fn read_entry(&self, name: &str) -> Result<Bytes>;
}

/// In-memory source, mainly for tests and synthesized datasets
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: HashMap<String, Bytes>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, consuming and returning the source
    pub fn with_entry(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.insert(name, data);
        self
    }

    /// Add an entry
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.entries.insert(name.into(), data.into());
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_entry(&self, name: &str) -> Result<Bytes> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| BvpError::EntryNotFound(name.to_string()))
    }
}

/// Source reading entries as files under a base directory
///
/// Entry names map to relative paths, so an unpacked dataset archive can be
/// consumed directly.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Create a source rooted at the given directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Map an entry name onto a path below the root
    ///
    /// Entry names are plain relative paths; absolute names or `..`
    /// components would reach outside the dataset and are rejected.
    fn entry_path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(BvpError::EntryNotFound(format!(
                "{} (escapes the dataset root)",
                name
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ByteSource for DirectorySource {
    async fn read_entry(&self, name: &str) -> Result<Bytes> {
        let path = self.entry_path(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BvpError::EntryNotFound(name.to_string()))
            }
            Err(err) => Err(BvpError::Io(err)),
        }
    }
}

/// Fetch several entries concurrently, preserving order
pub async fn read_all(source: &dyn ByteSource, names: &[String]) -> Result<Vec<Bytes>> {
    let reads: Vec<_> = names.iter().map(|name| source.read_entry(name)).collect();
    futures::future::try_join_all(reads).await
}
