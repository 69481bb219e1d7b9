#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! File-backed configuration for the hotfolder dispatcher.
//!
//! The document is loaded once at startup, validated against the filesystem and
//! handed to the engine as an immutable [`ValidatedConfig`].
//!
//! Layout: `model.rs` (serde document model), `loader.rs` (file loading),
//! `validate.rs` (startup checks and path resolution), `defaults.rs`, `error.rs`.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
pub use error::{ConfigError, ConfigResult};
pub use loader::load_config;
pub use model::{
    DispatcherConfig, GeneralConfig, HotfolderConfig, LogFormatSetting, RuleSpec,
    StabilitySettings, WatchBackend,
};
pub use validate::{ValidatedConfig, normalize_extension, validate_config};
