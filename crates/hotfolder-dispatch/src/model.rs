//! Domain models for the dispatch pipeline.
//!
//! # Design
//! - `Rule` is immutable after construction and shared read-only across workers.
//! - `FileTask` derives its name parts once, at construction.
//! - Extensions are compared in normalised form (no leading dot, lowercase).

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use hotfolder_config::normalize_extension;

use crate::error::{DispatchError, DispatchResult};

/// An immutable routing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    name: String,
    formats: BTreeSet<String>,
    sources: Vec<PathBuf>,
    destinations: Vec<PathBuf>,
}

impl Rule {
    /// Build a rule, normalising extensions and dropping duplicate paths while
    /// keeping their first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidInput`] when no usable extension remains
    /// or when the rule has no source or no destination.
    pub fn new<F>(
        name: impl Into<String>,
        formats: impl IntoIterator<Item = F>,
        sources: impl IntoIterator<Item = PathBuf>,
        destinations: impl IntoIterator<Item = PathBuf>,
    ) -> DispatchResult<Self>
    where
        F: AsRef<str>,
    {
        let name = name.into();
        let formats: BTreeSet<String> = formats
            .into_iter()
            .filter_map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        let sources = dedup_paths(sources);
        let destinations = dedup_paths(destinations);

        let missing = if formats.is_empty() {
            Some("formats")
        } else if sources.is_empty() {
            Some("sources")
        } else if destinations.is_empty() {
            Some("destinations")
        } else {
            None
        };
        if let Some(field) = missing {
            return Err(DispatchError::InvalidInput {
                field,
                reason: "must not be empty",
                value: Some(name),
            });
        }

        Ok(Self {
            name,
            formats,
            sources,
            destinations,
        })
    }

    /// Rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted extensions, normalised.
    #[must_use]
    pub const fn formats(&self) -> &BTreeSet<String> {
        &self.formats
    }

    /// Source directories the rule applies to.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Destination directories, in configured order.
    #[must_use]
    pub fn destinations(&self) -> &[PathBuf] {
        &self.destinations
    }

    /// Whether `extension` (already normalised) is accepted.
    #[must_use]
    pub fn accepts_extension(&self, extension: &str) -> bool {
        self.formats.contains(extension)
    }
}

fn dedup_paths(paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut seen = BTreeSet::new();
    paths
        .into_iter()
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

/// One file observed on disk, owned by the worker processing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    path: PathBuf,
    file_name: OsString,
    base_name: String,
    extension: String,
}

impl FileTask {
    /// Derive the name parts of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidInput`] when the path has no final
    /// component or the name carries no extension. Dotfiles such as `.profile`
    /// have no extension.
    pub fn new(path: impl Into<PathBuf>) -> DispatchResult<Self> {
        let path = path.into();
        let Some(file_name) = path.file_name().map(ToOwned::to_owned) else {
            return Err(DispatchError::InvalidInput {
                field: "path",
                reason: "has no file name",
                value: Some(path.display().to_string()),
            });
        };
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .filter(|ext| !ext.is_empty());
        let Some(extension) = extension else {
            return Err(DispatchError::InvalidInput {
                field: "path",
                reason: "has no extension",
                value: Some(path.display().to_string()),
            });
        };
        let base_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path,
            file_name,
            base_name,
            extension,
        })
    }

    /// Absolute path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, as stored on disk.
    #[must_use]
    pub fn file_name(&self) -> &OsStr {
        &self.file_name
    }

    /// File name without its extension.
    #[must_use]
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Lowercased extension without the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }
}
