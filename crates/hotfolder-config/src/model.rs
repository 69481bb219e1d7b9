//! Serde model of the YAML configuration document.
//!
//! # Design
//! - Unknown keys are rejected so typos fail at startup instead of being ignored.
//! - Tables are `BTreeMap`s, which fixes iteration order to name order.
//! - Empty tables parse successfully; emptiness is reported by validation with a field name.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HotfolderConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Dispatch tables and watcher tuning.
    pub dispatcher: DispatcherConfig,
}

impl HotfolderConfig {
    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not valid YAML or does
    /// not match the schema.
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse { source })
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Worker pool size.
    #[serde(default = "defaults::threads")]
    pub threads: usize,
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    /// Console log format; inferred from the build profile when absent.
    #[serde(default)]
    pub log_format: Option<LogFormatSetting>,
    /// Optional daily-rolled log file.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            threads: defaults::threads(),
            log_level: defaults::log_level(),
            log_format: None,
            log_file: None,
        }
    }
}

/// Console log format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormatSetting {
    /// Human-readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Filesystem notification backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchBackend {
    /// Operating system notifications (inotify, `FSEvents`, `ReadDirectoryChangesW`).
    #[default]
    Native,
    /// Periodic directory scans, for network shares without native notifications.
    Poll,
}

impl WatchBackend {
    /// Stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Poll => "poll",
        }
    }
}

/// Dispatch tables and watcher tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Format-group name to the extensions it accepts.
    #[serde(default)]
    pub formats: BTreeMap<String, Vec<String>>,
    /// Source name to watched directory.
    #[serde(default)]
    pub sources: BTreeMap<String, PathBuf>,
    /// Per-source observation poll timeout, in seconds.
    #[serde(default = "defaults::sources_timeout")]
    pub sources_timeout: f64,
    /// Notification backend.
    #[serde(default)]
    pub backend: WatchBackend,
    /// File stability detector tuning.
    #[serde(default)]
    pub stability: StabilitySettings,
    /// Destination name to target directory.
    #[serde(default)]
    pub destinations: BTreeMap<String, PathBuf>,
    /// Rule name to the tables it references.
    #[serde(default)]
    pub rules: BTreeMap<String, RuleSpec>,
}

/// File stability detector tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StabilitySettings {
    /// Delay between size samples, in milliseconds.
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on the wait, in seconds; `0` waits indefinitely.
    #[serde(default = "defaults::stability_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::poll_interval_ms(),
            timeout_secs: defaults::stability_timeout_secs(),
        }
    }
}

/// A rule as written in the document: names into the other tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    /// Format-group names.
    pub formats: Vec<String>,
    /// Source names.
    pub sources: Vec<String>,
    /// Destination names.
    pub destinations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
dispatcher:
  formats:
    tables: ['.csv']
  sources:
    in1: /srv/in1
  destinations:
    out1: /srv/out1
  rules:
    R1:
      formats: [tables]
      sources: [in1]
      destinations: [out1]
";

    #[test]
    fn defaults_fill_omitted_fields() -> ConfigResult<()> {
        let config = HotfolderConfig::from_yaml_str(MINIMAL)?;
        assert_eq!(config.general.threads, 2);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, None);
        assert!((config.dispatcher.sources_timeout - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.dispatcher.backend, WatchBackend::Native);
        assert_eq!(config.dispatcher.stability, StabilitySettings::default());
        assert_eq!(config.dispatcher.stability.poll_interval_ms, 500);
        assert_eq!(config.dispatcher.stability.timeout_secs, 600);
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let text = MINIMAL.replace("  sources:\n", "  sourcez: {}\n  sources:\n");
        let result = HotfolderConfig::from_yaml_str(&text);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_dispatcher_section_is_a_parse_error() {
        let result = HotfolderConfig::from_yaml_str("general:\n  threads: 4\n");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn backend_and_format_labels_parse() -> ConfigResult<()> {
        let text = format!("general:\n  log_format: json\n{}", MINIMAL.trim_start())
            .replace("  formats:\n", "  backend: poll\n  formats:\n");
        let config = HotfolderConfig::from_yaml_str(&text)?;
        assert_eq!(config.general.log_format, Some(LogFormatSetting::Json));
        assert_eq!(config.dispatcher.backend, WatchBackend::Poll);
        assert_eq!(config.dispatcher.backend.as_str(), "poll");
        Ok(())
    }

    #[test]
    fn rules_iterate_in_name_order() -> ConfigResult<()> {
        let text = MINIMAL.replace(
            "  rules:\n",
            "  rules:\n    A0:\n      formats: [tables]\n      sources: [in1]\n      destinations: [out1]\n",
        );
        let config = HotfolderConfig::from_yaml_str(&text)?;
        let names: Vec<_> = config.dispatcher.rules.keys().cloned().collect();
        assert_eq!(names, vec!["A0".to_string(), "R1".to_string()]);
        Ok(())
    }
}
