//! Config file loading.

use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{info, warn};

/// Load a role's configuration, falling back to defaults.
///
/// A missing, unreadable or malformed file is logged and replaced by
/// `T::default()`; bootstrap never fails on configuration.
pub fn load_config<T>(path: Option<&Path>) -> T
where
    T: DeserializeOwned + Default,
{
    let Some(config_path) = path else {
        info!("No config file given, using defaults");
        return T::default();
    };

    if !config_path.exists() {
        warn!(path = %config_path.display(), "Config file not found, using defaults");
        return T::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(contents) => match toml::from_str::<T>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                T::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use licenselink_types::config::{CompilerKind, LinkerConfig, SwhConfig};

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config: LinkerConfig = load_config(Some(&dir.path().join("absent.toml")));
        assert_eq!(config.listen_addr.port(), 7300);
    }

    #[test]
    fn test_no_path_yields_defaults() {
        let config: SwhConfig = load_config(None);
        assert_eq!(config.listen_addr.port(), 7400);
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swh.toml");
        std::fs::write(&path, "listen_addr = [not toml").unwrap();
        let config: SwhConfig = load_config(Some(&path));
        assert!(config.libraries.is_empty());
    }

    #[test]
    fn test_loads_swh_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swh.toml");
        std::fs::write(
            &path,
            r#"
listen_addr = "0.0.0.0:9400"
source_root = "/srv/src"

[compiler]
kind = "prebuilt"

[[libraries]]
name = "acme.lib.Core"
"#,
        )
        .unwrap();

        let config: SwhConfig = load_config(Some(&path));
        assert_eq!(config.listen_addr.port(), 9400);
        assert_eq!(config.compiler.kind, CompilerKind::Prebuilt);
        let libraries = config.resolved_libraries();
        assert_eq!(libraries.len(), 1);
        assert_eq!(
            libraries[0].source,
            std::path::PathBuf::from("/srv/src/acme/lib/Core.java")
        );
    }
}
