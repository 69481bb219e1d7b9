//! Startup validation and path resolution.
//!
//! # Design
//! - Validation is fatal: the engine never starts with a partial rule table.
//! - Every directory is checked against the live filesystem and resolved to a canonical
//!   path, so downstream code can trust the paths it receives.
//! - A missing destination is created when its parent is writable.
//! - Sources and destinations must never resolve to the same directory, including
//!   through symlinks.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{DispatcherConfig, HotfolderConfig, LogFormatSetting, RuleSpec, WatchBackend};

const SECTION_GENERAL: &str = "general";
const SECTION_DISPATCHER: &str = "dispatcher";

/// Configuration that passed every startup check.
///
/// Paths are canonical and extensions normalised (see [`normalize_extension`]).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    threads: usize,
    log_level: String,
    log_format: Option<LogFormatSetting>,
    log_file: Option<PathBuf>,
    backend: WatchBackend,
    sources_timeout: Duration,
    stability_poll_interval: Duration,
    stability_timeout: Option<Duration>,
    formats: BTreeMap<String, Vec<String>>,
    sources: BTreeMap<String, PathBuf>,
    destinations: BTreeMap<String, PathBuf>,
    rules: BTreeMap<String, RuleSpec>,
}

impl ValidatedConfig {
    /// Worker pool size (at least one).
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Default log filter.
    #[must_use]
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Console log format, if configured.
    #[must_use]
    pub const fn log_format(&self) -> Option<LogFormatSetting> {
        self.log_format
    }

    /// Log file, if configured.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Notification backend.
    #[must_use]
    pub const fn backend(&self) -> WatchBackend {
        self.backend
    }

    /// Per-source observation poll timeout.
    #[must_use]
    pub const fn sources_timeout(&self) -> Duration {
        self.sources_timeout
    }

    /// Delay between stability samples.
    #[must_use]
    pub const fn stability_poll_interval(&self) -> Duration {
        self.stability_poll_interval
    }

    /// Upper bound on the stability wait; `None` waits indefinitely.
    #[must_use]
    pub const fn stability_timeout(&self) -> Option<Duration> {
        self.stability_timeout
    }

    /// Format groups with normalised extensions.
    #[must_use]
    pub const fn formats(&self) -> &BTreeMap<String, Vec<String>> {
        &self.formats
    }

    /// Canonical source directories by name.
    #[must_use]
    pub const fn sources(&self) -> &BTreeMap<String, PathBuf> {
        &self.sources
    }

    /// Canonical destination directories by name.
    #[must_use]
    pub const fn destinations(&self) -> &BTreeMap<String, PathBuf> {
        &self.destinations
    }

    /// Rules whose references are known to resolve.
    #[must_use]
    pub const fn rules(&self) -> &BTreeMap<String, RuleSpec> {
        &self.rules
    }
}

/// Normalise an extension: trim whitespace, strip one leading dot, lowercase.
///
/// Returns `None` when nothing usable remains or the value contains a path
/// separator or an inner dot (a file extension never does).
#[must_use]
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if bare.is_empty() || bare.contains(['.', '/', '\\']) {
        return None;
    }
    Some(bare.to_lowercase())
}

/// Run every startup check and resolve the document into a [`ValidatedConfig`].
///
/// Creates missing destination directories whose parent is writable.
///
/// # Errors
///
/// Returns the first failed check as a [`ConfigError`].
pub fn validate_config(config: &HotfolderConfig) -> ConfigResult<ValidatedConfig> {
    let general = &config.general;
    let dispatcher = &config.dispatcher;

    if general.threads == 0 {
        return Err(ConfigError::invalid_field(
            SECTION_GENERAL,
            "threads",
            Some(general.threads.to_string()),
            "must be at least 1",
        ));
    }
    if general.log_level.trim().is_empty() {
        return Err(ConfigError::invalid_field(
            SECTION_GENERAL,
            "log_level",
            None,
            "must not be empty",
        ));
    }
    let sources_timeout = positive_seconds("sources_timeout", dispatcher.sources_timeout)?;
    if dispatcher.stability.poll_interval_ms == 0 {
        return Err(ConfigError::invalid_field(
            SECTION_DISPATCHER,
            "stability.poll_interval_ms",
            Some("0".to_string()),
            "must be greater than zero",
        ));
    }

    require_entries("formats", dispatcher.formats.len())?;
    require_entries("sources", dispatcher.sources.len())?;
    require_entries("destinations", dispatcher.destinations.len())?;
    require_entries("rules", dispatcher.rules.len())?;

    let formats = normalize_formats(&dispatcher.formats)?;
    for (name, rule) in &dispatcher.rules {
        check_rule(name, rule, &formats, dispatcher)?;
    }

    let mut sources = BTreeMap::new();
    for (name, path) in &dispatcher.sources {
        sources.insert(name.clone(), resolve_source(name, path)?);
    }
    let mut destinations = BTreeMap::new();
    for (name, path) in &dispatcher.destinations {
        destinations.insert(name.clone(), resolve_destination(name, path)?);
    }
    ensure_disjoint(&sources, &destinations)?;

    let stability_timeout = match dispatcher.stability.timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    Ok(ValidatedConfig {
        threads: general.threads,
        log_level: general.log_level.trim().to_string(),
        log_format: general.log_format,
        log_file: general.log_file.clone(),
        backend: dispatcher.backend,
        sources_timeout,
        stability_poll_interval: Duration::from_millis(dispatcher.stability.poll_interval_ms),
        stability_timeout,
        formats,
        sources,
        destinations,
        rules: dispatcher.rules.clone(),
    })
}

fn positive_seconds(field: &'static str, value: f64) -> ConfigResult<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid_field(
            SECTION_DISPATCHER,
            field,
            Some(value.to_string()),
            "must be a positive number of seconds",
        ));
    }
    Duration::try_from_secs_f64(value).map_err(|_| {
        ConfigError::invalid_field(
            SECTION_DISPATCHER,
            field,
            Some(value.to_string()),
            "is out of range",
        )
    })
}

fn require_entries(field: &'static str, len: usize) -> ConfigResult<()> {
    if len == 0 {
        return Err(ConfigError::invalid_field(
            SECTION_DISPATCHER,
            field,
            None,
            "must contain at least one entry",
        ));
    }
    Ok(())
}

fn normalize_formats(
    raw: &BTreeMap<String, Vec<String>>,
) -> ConfigResult<BTreeMap<String, Vec<String>>> {
    let mut formats = BTreeMap::new();
    for (group, extensions) in raw {
        let field = format!("formats.{group}");
        if extensions.is_empty() {
            return Err(ConfigError::invalid_field(
                SECTION_DISPATCHER,
                field,
                None,
                "must list at least one extension",
            ));
        }
        let mut seen = BTreeSet::new();
        let mut normalized = Vec::with_capacity(extensions.len());
        for raw_ext in extensions {
            let ext = normalize_extension(raw_ext).ok_or_else(|| {
                ConfigError::invalid_field(
                    SECTION_DISPATCHER,
                    field.clone(),
                    Some(raw_ext.clone()),
                    "must be a non-empty single extension",
                )
            })?;
            if seen.insert(ext.clone()) {
                normalized.push(ext);
            }
        }
        formats.insert(group.clone(), normalized);
    }
    Ok(formats)
}

fn check_rule(
    name: &str,
    rule: &RuleSpec,
    formats: &BTreeMap<String, Vec<String>>,
    dispatcher: &DispatcherConfig,
) -> ConfigResult<()> {
    check_references(name, "formats", "format", &rule.formats, |key| {
        formats.contains_key(key)
    })?;
    check_references(name, "sources", "source", &rule.sources, |key| {
        dispatcher.sources.contains_key(key)
    })?;
    check_references(name, "destinations", "destination", &rule.destinations, |key| {
        dispatcher.destinations.contains_key(key)
    })
}

fn check_references(
    rule: &str,
    field: &'static str,
    kind: &'static str,
    names: &[String],
    known: impl Fn(&str) -> bool,
) -> ConfigResult<()> {
    if names.is_empty() {
        return Err(ConfigError::invalid_field(
            SECTION_DISPATCHER,
            format!("rules.{rule}.{field}"),
            None,
            "must reference at least one entry",
        ));
    }
    match names.iter().find(|candidate| !known(candidate.as_str())) {
        Some(missing) => Err(ConfigError::UnknownReference {
            rule: rule.to_string(),
            kind,
            name: missing.clone(),
        }),
        None => Ok(()),
    }
}

fn resolve_source(name: &str, path: &Path) -> ConfigResult<PathBuf> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::unusable("source", name, path, "does not exist"));
        }
        Err(err) => return Err(ConfigError::io("validate.source_metadata", path, err)),
    };
    if !metadata.is_dir() {
        return Err(ConfigError::unusable("source", name, path, "is not a directory"));
    }
    if !has_access(path, Access::ReadWrite) {
        return Err(ConfigError::unusable(
            "source",
            name,
            path,
            "is not readable and writable",
        ));
    }
    fs::canonicalize(path).map_err(|err| ConfigError::io("validate.canonicalize", path, err))
}

fn resolve_destination(name: &str, path: &Path) -> ConfigResult<PathBuf> {
    match fs::metadata(path) {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(ConfigError::unusable(
                "destination",
                name,
                path,
                "is not a directory",
            ));
        }
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => create_destination(name, path)?,
        Err(err) => return Err(ConfigError::io("validate.destination_metadata", path, err)),
    }
    if !has_access(path, Access::Write) {
        return Err(ConfigError::unusable(
            "destination",
            name,
            path,
            "is not writable",
        ));
    }
    fs::canonicalize(path).map_err(|err| ConfigError::io("validate.canonicalize", path, err))
}

fn create_destination(name: &str, path: &Path) -> ConfigResult<()> {
    let parent = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => {
            return Err(ConfigError::unusable(
                "destination",
                name,
                path,
                "does not exist and has no parent directory",
            ));
        }
    };
    if !parent.is_dir() || !has_access(parent, Access::Write) {
        return Err(ConfigError::unusable(
            "destination",
            name,
            path,
            "does not exist and its parent is not writable",
        ));
    }
    fs::create_dir(path).map_err(|err| ConfigError::io("validate.create_destination", path, err))?;
    info!(destination = name, path = %path.display(), "created missing destination directory");
    Ok(())
}

fn ensure_disjoint(
    sources: &BTreeMap<String, PathBuf>,
    destinations: &BTreeMap<String, PathBuf>,
) -> ConfigResult<()> {
    for (source_name, source_path) in sources {
        if let Some((destination_name, _)) = destinations
            .iter()
            .find(|(_, destination_path)| *destination_path == source_path)
        {
            return Err(ConfigError::SourceIsDestination {
                source_name: source_name.clone(),
                destination_name: destination_name.clone(),
                path: source_path.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Access {
    Write,
    ReadWrite,
}

#[cfg(unix)]
fn has_access(path: &Path, access: Access) -> bool {
    use nix::unistd::AccessFlags;

    // Directories also need search permission to be listed or written into.
    let flags = match access {
        Access::Write => AccessFlags::W_OK | AccessFlags::X_OK,
        Access::ReadWrite => AccessFlags::R_OK | AccessFlags::W_OK | AccessFlags::X_OK,
    };
    nix::unistd::access(path, flags).is_ok()
}

#[cfg(not(unix))]
fn has_access(path: &Path, access: Access) -> bool {
    let _ = access;
    fs::metadata(path).is_ok_and(|metadata| !metadata.permissions().readonly())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotfolder_test_support::DropTree;

    type TestResult<T> = anyhow::Result<T>;

    fn parse(tree: &DropTree) -> TestResult<HotfolderConfig> {
        let text = tree
            .config()
            .format("tables", &[".CSV", "tsv", "csv"])
            .format("docs", &["json"])
            .rule("R1", &["tables"], &["in1"], &["out1", "out2"])
            .rule("R2", &["docs"], &["in1"], &["out2"])
            .render();
        Ok(HotfolderConfig::from_yaml_str(&text)?)
    }

    fn standard_tree() -> TestResult<DropTree> {
        DropTree::with_dirs(&["in1"], &["out1", "out2"])
    }

    #[test]
    fn normalize_extension_strips_dot_and_lowercases() {
        assert_eq!(normalize_extension(".CSV"), Some("csv".to_string()));
        assert_eq!(normalize_extension(" json "), Some("json".to_string()));
        assert_eq!(normalize_extension("."), None);
        assert_eq!(normalize_extension(""), None);
        assert_eq!(normalize_extension("tar.gz"), None);
        assert_eq!(normalize_extension("a/b"), None);
    }

    #[test]
    fn valid_document_resolves_canonical_paths() -> TestResult<()> {
        let tree = standard_tree()?;
        let validated = validate_config(&parse(&tree)?)?;

        assert_eq!(validated.threads(), 2);
        assert_eq!(
            validated.formats().get("tables"),
            Some(&vec!["csv".to_string(), "tsv".to_string()])
        );
        let in1 = fs::canonicalize(tree.source("in1")?)?;
        assert_eq!(validated.sources().get("in1"), Some(&in1));
        assert!(validated.destinations().values().all(|path| path.is_absolute()));
        assert_eq!(validated.stability_poll_interval(), Duration::from_millis(20));
        assert_eq!(validated.stability_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(validated.sources_timeout(), Duration::from_millis(100));
        Ok(())
    }

    #[test]
    fn zero_threads_is_rejected() -> TestResult<()> {
        let tree = standard_tree()?;
        let mut config = parse(&tree)?;
        config.general.threads = 0;
        let err = validate_config(&config).err();
        assert!(matches!(
            err,
            Some(ConfigError::InvalidField { section: "general", ref field, .. }) if field == "threads"
        ));
        Ok(())
    }

    #[test]
    fn non_positive_sources_timeout_is_rejected() -> TestResult<()> {
        let tree = standard_tree()?;
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = parse(&tree)?;
            config.dispatcher.sources_timeout = bad;
            assert!(matches!(
                validate_config(&config),
                Err(ConfigError::InvalidField { ref field, .. }) if field == "sources_timeout"
            ));
        }
        Ok(())
    }

    #[test]
    fn empty_tables_are_rejected_by_name() -> TestResult<()> {
        let tree = standard_tree()?;
        let mut config = parse(&tree)?;
        config.dispatcher.rules.clear();
        match validate_config(&config) {
            Err(ConfigError::InvalidField { field, reason, .. }) => {
                assert_eq!(field, "rules");
                assert_eq!(reason, "must contain at least one entry");
            }
            other => anyhow::bail!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn empty_format_group_is_rejected() -> TestResult<()> {
        let tree = standard_tree()?;
        let mut config = parse(&tree)?;
        config.dispatcher.formats.insert("empty".into(), Vec::new());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidField { ref field, .. }) if field == "formats.empty"
        ));
        Ok(())
    }

    #[test]
    fn unknown_rule_reference_is_rejected() -> TestResult<()> {
        let tree = standard_tree()?;
        let mut config = parse(&tree)?;
        if let Some(rule) = config.dispatcher.rules.get_mut("R2") {
            rule.destinations.push("out9".into());
        }
        match validate_config(&config) {
            Err(ConfigError::UnknownReference { rule, kind, name }) => {
                assert_eq!((rule.as_str(), kind, name.as_str()), ("R2", "destination", "out9"));
            }
            other => anyhow::bail!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn rule_without_sources_is_rejected() -> TestResult<()> {
        let tree = standard_tree()?;
        let mut config = parse(&tree)?;
        if let Some(rule) = config.dispatcher.rules.get_mut("R1") {
            rule.sources.clear();
        }
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidField { ref field, .. }) if field == "rules.R1.sources"
        ));
        Ok(())
    }

    #[test]
    fn missing_source_is_rejected() -> TestResult<()> {
        let tree = standard_tree()?;
        let mut config = parse(&tree)?;
        config
            .dispatcher
            .sources
            .insert("in1".into(), tree.root().join("absent"));
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::UnusableDirectory { kind: "source", reason: "does not exist", .. })
        ));
        Ok(())
    }

    #[test]
    fn source_file_is_not_a_directory() -> TestResult<()> {
        let tree = standard_tree()?;
        let file = tree.write_source("in1", "plain.txt", b"x")?;
        let mut config = parse(&tree)?;
        config.dispatcher.sources.insert("in1".into(), file);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::UnusableDirectory { reason: "is not a directory", .. })
        ));
        Ok(())
    }

    #[test]
    fn missing_destination_is_created() -> TestResult<()> {
        let mut tree = standard_tree()?;
        let created = tree.add_missing_destination("out3");
        let mut config = parse(&tree)?;
        if let Some(rule) = config.dispatcher.rules.get_mut("R2") {
            rule.destinations.push("out3".into());
        }
        let validated = validate_config(&config)?;
        assert!(created.is_dir());
        assert_eq!(
            validated.destinations().get("out3"),
            Some(&fs::canonicalize(&created)?)
        );
        Ok(())
    }

    #[test]
    fn destination_with_missing_parent_is_rejected() -> TestResult<()> {
        let mut tree = standard_tree()?;
        tree.add_missing_destination("deep/nested/out3");
        let config = parse(&tree)?;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::UnusableDirectory {
                kind: "destination",
                reason: "does not exist and its parent is not writable",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn source_equal_to_destination_is_rejected() -> TestResult<()> {
        let tree = standard_tree()?;
        let mut config = parse(&tree)?;
        config
            .dispatcher
            .destinations
            .insert("out2".into(), tree.source("in1")?.to_path_buf());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::SourceIsDestination { ref source_name, ref destination_name, .. })
                if source_name == "in1" && destination_name == "out2"
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn destination_symlink_to_source_is_rejected() -> TestResult<()> {
        let tree = standard_tree()?;
        let link = tree.root().join("link-to-in1");
        std::os::unix::fs::symlink(tree.source("in1")?, &link)?;
        let mut config = parse(&tree)?;
        config.dispatcher.destinations.insert("out2".into(), link);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::SourceIsDestination { .. })
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_source_is_rejected() -> TestResult<()> {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::geteuid().is_root() {
            return Ok(());
        }
        let tree = standard_tree()?;
        let source = tree.source("in1")?;
        fs::set_permissions(source, fs::Permissions::from_mode(0o555))?;
        let result = validate_config(&parse(&tree)?);
        fs::set_permissions(source, fs::Permissions::from_mode(0o755))?;
        assert!(matches!(
            result,
            Err(ConfigError::UnusableDirectory { reason: "is not readable and writable", .. })
        ));
        Ok(())
    }

    #[test]
    fn zero_stability_timeout_means_unbounded() -> TestResult<()> {
        let tree = standard_tree()?;
        let mut config = parse(&tree)?;
        config.dispatcher.stability.timeout_secs = 0;
        assert_eq!(validate_config(&config)?.stability_timeout(), None);
        Ok(())
    }
}
