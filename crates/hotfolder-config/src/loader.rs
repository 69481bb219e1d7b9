//! Configuration file loading.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::HotfolderConfig;

/// Read and parse the configuration file at `path`.
///
/// # Errors
///
/// Returns an error if the path does not exist, is not a regular file, cannot
/// be read, or does not parse into a [`HotfolderConfig`].
pub fn load_config(path: &Path) -> ConfigResult<HotfolderConfig> {
    let metadata = fs::metadata(path).map_err(|err| ConfigError::io("load.metadata", path, err))?;
    if !metadata.is_file() {
        return Err(ConfigError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path).map_err(|err| ConfigError::io("load.read", path, err))?;
    let config: HotfolderConfig =
        serde_yaml::from_str(&text).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(
        path = %path.display(),
        rules = config.dispatcher.rules.len(),
        sources = config.dispatcher.sources.len(),
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_rejects_directories() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let result = load_config(temp.path());
        assert!(matches!(result, Err(ConfigError::NotAFile { .. })));
        Ok(())
    }

    #[test]
    fn load_config_reports_missing_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let result = load_config(&temp.path().join("absent.yaml"));
        assert!(matches!(
            result,
            Err(ConfigError::Io {
                operation: "load.metadata",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn parse_errors_carry_the_path() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("broken.yaml");
        fs::write(&path, "dispatcher: [not, a, map]\n")?;
        match load_config(&path) {
            Err(ConfigError::ParseFile { path: reported, .. }) => assert_eq!(reported, path),
            other => anyhow::bail!("unexpected result: {other:?}"),
        }
        Ok(())
    }
}
