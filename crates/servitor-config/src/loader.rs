//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `/etc/servitor/config.toml` (system)
//! 3. Merge the explicit file, if one was given
//! 4. Apply `SERVITOR_*` env var fallbacks for fields no file set
//! 5. Deserialize merged tree → `Config`
//! 6. Validate

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::env::apply_env_fallbacks;
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// System-wide config location.
const SYSTEM_CONFIG_PATH: &str = "/etc/servitor/config.toml";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A fully merged configuration together with where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The validated configuration.
    pub config: Config,
    /// Source layer for every leaf field.
    pub field_sources: FieldSources,
    /// Files that contributed, in merge order.
    pub loaded_files: Vec<String>,
}

/// Load configuration with layered precedence.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, if the explicit
/// file does not exist, or if the merged configuration fails validation.
pub fn load<S: ::std::hash::BuildHasher>(
    explicit: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    load_layers(Path::new(SYSTEM_CONFIG_PATH), explicit, env_vars)
}

fn load_layers<S: ::std::hash::BuildHasher>(
    system_path: &Path,
    explicit: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    if let Some(overlay) = try_load_file(system_path)? {
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::System,
            &mut field_sources,
        );
        loaded_files.push(system_path.display().to_string());
        info!(path = %system_path.display(), "loaded system config");
    }

    if let Some(path) = explicit {
        // An explicitly requested file must exist.
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::File,
            &mut field_sources,
        );
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded config file");
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let content = read_bounded(path)?;
    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if it doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match read_bounded(path) {
        Ok(c) => c,
        Err(ConfigError::ReadError { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => return Err(e),
    };

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Read a file in one operation and reject it if it is oversized.
fn read_bounded(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    fn missing_system() -> &'static Path {
        Path::new("/nonexistent/servitor/config.toml")
    }

    #[test]
    fn test_defaults_deserialize_to_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert!(config.coordinator.rollback_bind_on_launch_failure);
        assert_eq!(config.events.channel_capacity, 1024);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_load_defaults_only() {
        let resolved = load_layers(missing_system(), None, &no_env()).unwrap();
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(
            resolved.field_sources.get("logging.level"),
            Some(&ConfigLayer::Defaults)
        );
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servitor.toml");
        std::fs::write(
            &path,
            "[coordinator]\nrollback_bind_on_launch_failure = false\n",
        )
        .unwrap();

        let resolved = load_layers(missing_system(), Some(&path), &no_env()).unwrap();

        assert!(!resolved.config.coordinator.rollback_bind_on_launch_failure);
        assert_eq!(resolved.loaded_files, vec![path.display().to_string()]);
        assert_eq!(
            resolved
                .field_sources
                .get("coordinator.rollback_bind_on_launch_failure"),
            Some(&ConfigLayer::File)
        );
    }

    #[test]
    fn test_env_applies_only_where_no_file_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servitor.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

        let env: HashMap<String, String> = [
            ("SERVITOR_LOG_LEVEL".to_owned(), "trace".to_owned()),
            ("SERVITOR_LOG_FORMAT".to_owned(), "json".to_owned()),
        ]
        .into_iter()
        .collect();

        let resolved = load_layers(missing_system(), Some(&path), &env).unwrap();

        assert_eq!(resolved.config.logging.level, "warn");
        assert_eq!(resolved.config.logging.format, "json");
    }

    #[test]
    fn test_system_layer_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.toml");
        std::fs::write(&system, "[events]\nchannel_capacity = 32\n").unwrap();

        let resolved = load_layers(&system, None, &no_env()).unwrap();

        assert_eq!(resolved.config.events.channel_capacity, 32);
        assert_eq!(
            resolved.field_sources.get("events.channel_capacity"),
            Some(&ConfigLayer::System)
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_layers(
            missing_system(),
            Some(Path::new("/nonexistent/servitor.toml")),
            &no_env(),
        );
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_invalid_merged_config_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servitor.toml");
        std::fs::write(&path, "[events]\nchannel_capacity = 0\n").unwrap();

        let result = load_layers(missing_system(), Some(&path), &no_env());
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_load_file_nonexistent() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.toml");
        let data = format!("x = \"{}\"", "a".repeat(1_100_000));
        std::fs::write(&file_path, data).unwrap();

        let result = try_load_file(&file_path);
        assert!(
            matches!(result, Err(ConfigError::ValidationError { .. })),
            "Expected ValidationError for oversized config, got: {result:?}"
        );
    }
}
