//! Default values applied when the configuration document omits a field.
//!
//! # Design
//! - Keep every default in one place so documentation and serde agree.
//! - Serde default functions are thin wrappers over the constants.

/// Default configuration path relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "conf/hotfolder.yaml";
/// Environment variable overriding the configuration path.
pub const CONFIG_PATH_ENV: &str = "HOTFOLDER_CONFIG";

pub(crate) const DEFAULT_THREADS: usize = 2;
pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";
pub(crate) const DEFAULT_SOURCES_TIMEOUT_SECS: f64 = 1.0;
pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
/// Zero keeps the unbounded wait.
pub(crate) const DEFAULT_STABILITY_TIMEOUT_SECS: u64 = 600;

pub(crate) const fn threads() -> usize {
    DEFAULT_THREADS
}

pub(crate) fn log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

pub(crate) const fn sources_timeout() -> f64 {
    DEFAULT_SOURCES_TIMEOUT_SECS
}

pub(crate) const fn poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

pub(crate) const fn stability_timeout_secs() -> u64 {
    DEFAULT_STABILITY_TIMEOUT_SECS
}
