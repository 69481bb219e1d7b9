//! Temporary source/destination trees and matching configuration documents.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

const STAGING_DIR: &str = ".staging";

/// A temp directory holding named source and destination directories.
///
/// Everything is removed when the tree is dropped.
#[derive(Debug)]
pub struct DropTree {
    root: TempDir,
    sources: BTreeMap<String, PathBuf>,
    destinations: BTreeMap<String, PathBuf>,
}

impl DropTree {
    /// Create an empty tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp directory cannot be created.
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir().context("failed to create drop tree root")?;
        fs::create_dir(root.path().join(STAGING_DIR)).context("failed to create staging dir")?;
        Ok(Self {
            root,
            sources: BTreeMap::new(),
            destinations: BTreeMap::new(),
        })
    }

    /// Create a tree with the given source and destination names.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn with_dirs(sources: &[&str], destinations: &[&str]) -> Result<Self> {
        let mut tree = Self::new()?;
        for name in sources {
            tree.add_source(name)?;
        }
        for name in destinations {
            tree.add_destination(name)?;
        }
        Ok(tree)
    }

    /// Root of the tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Create `<root>/<name>` and register it as a source.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn add_source(&mut self, name: &str) -> Result<PathBuf> {
        let path = self.make_dir(name)?;
        self.sources.insert(name.to_string(), path.clone());
        Ok(path)
    }

    /// Create `<root>/<name>` and register it as a destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn add_destination(&mut self, name: &str) -> Result<PathBuf> {
        let path = self.make_dir(name)?;
        self.destinations.insert(name.to_string(), path.clone());
        Ok(path)
    }

    /// Register a destination path without creating it.
    pub fn add_missing_destination(&mut self, name: &str) -> PathBuf {
        let path = self.root.path().join(name);
        self.destinations.insert(name.to_string(), path.clone());
        path
    }

    /// Path of a registered source.
    ///
    /// # Errors
    ///
    /// Returns an error if no source with that name was registered.
    pub fn source(&self, name: &str) -> Result<&Path> {
        self.sources
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| anyhow!("unknown source fixture '{name}'"))
    }

    /// Path of a registered destination.
    ///
    /// # Errors
    ///
    /// Returns an error if no destination with that name was registered.
    pub fn destination(&self, name: &str) -> Result<&Path> {
        self.destinations
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| anyhow!("unknown destination fixture '{name}'"))
    }

    /// Write a file directly into a source directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is unknown or the write fails.
    pub fn write_source(&self, source: &str, file_name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.source(source)?.join(file_name);
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Write a file in the staging area and rename it into a source, so the
    /// file appears fully written in a single move-to notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is unknown or any filesystem step fails.
    pub fn drop_into(&self, source: &str, file_name: &str, contents: &[u8]) -> Result<PathBuf> {
        let staged = self.root.path().join(STAGING_DIR).join(file_name);
        fs::write(&staged, contents)
            .with_context(|| format!("failed to stage {}", staged.display()))?;
        let target = self.source(source)?.join(file_name);
        fs::rename(&staged, &target)
            .with_context(|| format!("failed to move into {}", target.display()))?;
        Ok(target)
    }

    /// Start a configuration document describing this tree.
    #[must_use]
    pub fn config(&self) -> ConfigYaml<'_> {
        ConfigYaml {
            tree: self,
            threads: 2,
            backend: "native",
            sources_timeout: 0.1,
            poll_interval_ms: 20,
            timeout_secs: 5,
            log_file: None,
            formats: Vec::new(),
            rules: Vec::new(),
        }
    }

    fn make_dir(&self, name: &str) -> Result<PathBuf> {
        let path = self.root.path().join(name);
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(path)
    }
}

/// Builder rendering a YAML configuration for a [`DropTree`].
///
/// Defaults favour fast tests: short poll intervals and a bounded stability wait.
#[derive(Debug, Clone)]
pub struct ConfigYaml<'a> {
    tree: &'a DropTree,
    threads: usize,
    backend: &'static str,
    sources_timeout: f64,
    poll_interval_ms: u64,
    timeout_secs: u64,
    log_file: Option<PathBuf>,
    formats: Vec<(String, Vec<String>)>,
    rules: Vec<RuleYaml>,
}

#[derive(Debug, Clone)]
struct RuleYaml {
    name: String,
    formats: Vec<String>,
    sources: Vec<String>,
    destinations: Vec<String>,
}

impl ConfigYaml<'_> {
    /// Worker pool size.
    #[must_use]
    pub const fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Watch backend label (`native` or `poll`).
    #[must_use]
    pub const fn backend(mut self, backend: &'static str) -> Self {
        self.backend = backend;
        self
    }

    /// Stability poll interval in milliseconds.
    #[must_use]
    pub const fn poll_interval_ms(mut self, value: u64) -> Self {
        self.poll_interval_ms = value;
        self
    }

    /// Stability timeout in seconds (`0` disables the bound).
    #[must_use]
    pub const fn stability_timeout_secs(mut self, value: u64) -> Self {
        self.timeout_secs = value;
        self
    }

    /// Log file written by the engine.
    #[must_use]
    pub fn log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    /// Add a format group.
    #[must_use]
    pub fn format(mut self, name: &str, extensions: &[&str]) -> Self {
        self.formats.push((
            name.to_string(),
            extensions.iter().map(ToString::to_string).collect(),
        ));
        self
    }

    /// Add a rule referencing format groups, sources and destinations by name.
    #[must_use]
    pub fn rule(
        mut self,
        name: &str,
        formats: &[&str],
        sources: &[&str],
        destinations: &[&str],
    ) -> Self {
        let owned = |items: &[&str]| items.iter().map(ToString::to_string).collect();
        self.rules.push(RuleYaml {
            name: name.to_string(),
            formats: owned(formats),
            sources: owned(sources),
            destinations: owned(destinations),
        });
        self
    }

    /// Render the document.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "general:");
        let _ = writeln!(out, "  threads: {}", self.threads);
        let _ = writeln!(out, "  log_level: debug");
        if let Some(path) = &self.log_file {
            let _ = writeln!(out, "  log_file: {}", quoted(path));
        }
        let _ = writeln!(out, "dispatcher:");
        let _ = writeln!(out, "  sources_timeout: {}", self.sources_timeout);
        let _ = writeln!(out, "  backend: {}", self.backend);
        let _ = writeln!(out, "  stability:");
        let _ = writeln!(out, "    poll_interval_ms: {}", self.poll_interval_ms);
        let _ = writeln!(out, "    timeout_secs: {}", self.timeout_secs);
        let _ = writeln!(out, "  formats:");
        for (name, extensions) in &self.formats {
            let _ = writeln!(out, "    {name}: [{}]", flow_list(extensions));
        }
        let _ = writeln!(out, "  sources:");
        for (name, path) in &self.tree.sources {
            let _ = writeln!(out, "    {name}: {}", quoted(path));
        }
        let _ = writeln!(out, "  destinations:");
        for (name, path) in &self.tree.destinations {
            let _ = writeln!(out, "    {name}: {}", quoted(path));
        }
        let _ = writeln!(out, "  rules:");
        for rule in &self.rules {
            let _ = writeln!(out, "    {}:", rule.name);
            let _ = writeln!(out, "      formats: [{}]", flow_list(&rule.formats));
            let _ = writeln!(out, "      sources: [{}]", flow_list(&rule.sources));
            let _ = writeln!(out, "      destinations: [{}]", flow_list(&rule.destinations));
        }
        out
    }

    /// Render the document into `<root>/hotfolder.yaml` and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self) -> Result<PathBuf> {
        let path = self.tree.root().join("hotfolder.yaml");
        fs::write(&path, self.render())
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn quoted(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "''"))
}

fn flow_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("'{}'", item.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_into_moves_file_out_of_staging() -> Result<()> {
        let tree = DropTree::with_dirs(&["in1"], &["out1"])?;
        let path = tree.drop_into("in1", "data.csv", b"a,b\n")?;
        assert_eq!(fs::read(&path)?, b"a,b\n");
        assert!(!tree.root().join(STAGING_DIR).join("data.csv").exists());
        Ok(())
    }

    #[test]
    fn unknown_fixture_names_are_errors() -> Result<()> {
        let tree = DropTree::new()?;
        assert!(tree.source("in1").is_err());
        assert!(tree.destination("out1").is_err());
        Ok(())
    }

    #[test]
    fn config_render_lists_every_section() -> Result<()> {
        let tree = DropTree::with_dirs(&["in1"], &["out1", "out2"])?;
        let rendered = tree
            .config()
            .threads(3)
            .format("tables", &[".csv"])
            .rule("R1", &["tables"], &["in1"], &["out1", "out2"])
            .render();
        assert!(rendered.contains("threads: 3"));
        assert!(rendered.contains("tables: ['.csv']"));
        assert!(rendered.contains("destinations: ['out1', 'out2']"));
        assert!(rendered.contains(&tree.source("in1")?.display().to_string()));
        Ok(())
    }
}
