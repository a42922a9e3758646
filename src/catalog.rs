//! The set of shared entries.
//!
//! A [`ServingCatalog`] is built once at startup and only read afterwards, so
//! request handlers share it behind an `Arc` without any locking.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A named, absolute path eligible for serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Maps entry names to absolute filesystem paths.
#[derive(Debug, Default, Clone)]
pub struct ServingCatalog {
    entries: BTreeMap<String, PathBuf>,
}

impl ServingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from every path, in order.
    ///
    /// # Arguments
    ///
    /// * `paths` - Files or directories; relative paths resolve against the
    ///   current directory
    ///
    /// # Errors
    ///
    /// The first [`Error::PathResolution`](crate::Error::PathResolution) from
    /// [`add_entry`](Self::add_entry).
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut catalog = Self::new();
        for path in paths {
            catalog.add_entry(path.as_ref())?;
        }
        Ok(catalog)
    }

    /// Register `path` under its base name.
    ///
    /// Two paths sharing a base name collide: the later one replaces the
    /// earlier one.
    ///
    /// The path is made absolute. Only a path ending in `..` is canonicalized
    /// to find its name, so other targets are not checked here.
    ///
    /// # Errors
    ///
    /// [`Error::PathResolution`](crate::Error::PathResolution) when the path
    /// is empty or has no usable base name.
    pub fn add_entry(&mut self, path: &Path) -> Result<()> {
        let absolute = std::path::absolute(path).map_err(|e| Error::PathResolution {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let name = base_name(&absolute)?;

        debug!("serving {} as {:?}", absolute.display(), name);
        if let Some(previous) = self.entries.insert(name.clone(), absolute) {
            warn!(
                "entry {:?} replaces previously registered {}",
                name,
                previous.display()
            );
        }
        Ok(())
    }

    /// All registered names, in lexical order.
    pub fn list_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Look up the absolute path registered under `name`.
    ///
    /// # Arguments
    ///
    /// * `name` - Base name exactly as it appears in a request path
    ///
    /// # Returns
    ///
    /// The stored path, or `None` for an unknown name.
    pub fn resolve(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(PathBuf::as_path)
    }

    /// Every entry as a name/path pair, ordered by name.
    pub fn entries(&self) -> impl Iterator<Item = ServingEntry> + '_ {
        self.entries.iter().map(|(name, path)| ServingEntry {
            name: name.clone(),
            path: path.clone(),
        })
    }

    /// Every stored path, ordered by entry name.
    ///
    /// # Returns
    ///
    /// Owned copies, ready to hand to a blocking archive build.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Final segment of an absolute path.
///
/// Paths ending in `..` are canonicalized first so they still get a name.
fn base_name(absolute: &Path) -> Result<String> {
    let named = match absolute.file_name() {
        Some(_) => absolute.to_path_buf(),
        None => absolute.canonicalize().map_err(|e| Error::PathResolution {
            path: absolute.to_path_buf(),
            reason: e.to_string(),
        })?,
    };

    named
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::PathResolution {
            path: absolute.to_path_buf(),
            reason: "path has no final segment".to_string(),
        })
}
