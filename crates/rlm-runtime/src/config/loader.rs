//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Global config (`~/.rlm/config.toml`)
//! 3. Project config (`.rlm/config.toml`)
//! 4. Environment variables (`RLM_*`)
//!
//! Each layer overrides the previous.

use super::{
    default_config_path, ConfigError, SandboxConfig, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper macro for parsing boolean environment variables.
macro_rules! parse_env_bool {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```no_run
/// use rlm_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_project_root("/path/to/project")
///     .skip_env_vars()
///     .load()?;
/// # Ok::<(), rlm_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Global config file path (defaults to ~/.rlm/config.toml).
    global_config_path: Option<PathBuf>,

    /// Project root directory.
    project_root: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,

    /// Skip global config loading.
    skip_global: bool,

    /// Skip project config loading.
    skip_project: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Sets the project root directory.
    ///
    /// Project config will be loaded from `<project_root>/.rlm/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips global config loading.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Skips project config loading.
    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Loads, merges and validates configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any config file exists but cannot be
    /// parsed, an env var is malformed, or the merged result is unusable.
    /// Missing config files are silently ignored.
    pub fn load(&self) -> Result<SandboxConfig, ConfigError> {
        let mut config = SandboxConfig::default();

        // Layer 1: Global config
        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);

            if let Some(global_config) = self.load_file(&global_path)? {
                debug!(path = %global_path.display(), "Loaded global config");
                config.merge(&global_config);
            }
        }

        // Layer 2: Project config
        if !self.skip_project {
            if let Some(ref project_root) = self.project_root {
                let project_config_path = project_root
                    .join(PROJECT_CONFIG_DIR)
                    .join(PROJECT_CONFIG_FILE);

                if let Some(project_config) = self.load_file(&project_config_path)? {
                    debug!(
                        path = %project_config_path.display(),
                        project = %project_root.display(),
                        "Loaded project config"
                    );
                    config.merge(&project_config);
                }
            }
        }

        // Layer 3: Environment variables
        if !self.skip_env {
            apply_env_vars(&mut config)?;
        }

        validate(&config)?;
        Ok(config)
    }

    /// Loads a config file, returning None if it doesn't exist.
    fn load_file(&self, path: &Path) -> Result<Option<SandboxConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

        let config =
            SandboxConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

        Ok(Some(config))
    }
}

/// Applies environment variable overrides.
fn apply_env_vars(config: &mut SandboxConfig) -> Result<(), ConfigError> {
    parse_env_bool!(config.debug, "RLM_DEBUG");

    if let Ok(val) = std::env::var("RLM_BRIDGE_PREFIX") {
        config.bridge.id_prefix = val;
    }

    // A log directory implies file logging.
    if let Ok(val) = std::env::var("RLM_LOG_FILE") {
        config.logging.file = true;
        config.logging.file_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("RLM_LOG_LEVEL") {
        config.logging.file_level = val;
    }

    Ok(())
}

fn validate(config: &SandboxConfig) -> Result<(), ConfigError> {
    if config.bridge.id_prefix.trim().is_empty() {
        return Err(ConfigError::invalid_value(
            "bridge.id_prefix",
            "must not be empty",
        ));
    }
    if config.context.variable.trim().is_empty() {
        return Err(ConfigError::invalid_value(
            "context.variable",
            "must not be empty",
        ));
    }
    Ok(())
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off" (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, content).expect("write config");
        path
    }

    #[test]
    fn load_defaults_only() {
        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect("load");

        assert_eq!(config, SandboxConfig::default());
    }

    #[test]
    fn load_global_config() {
        let temp = TempDir::new().expect("temp dir");
        let config_path = create_config_file(
            temp.path(),
            r#"
debug = true

[bridge]
id_prefix = "host"
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&config_path)
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect("load");

        assert!(config.debug);
        assert_eq!(config.bridge.id_prefix, "host");
    }

    #[test]
    fn load_project_overrides_global() {
        let global_temp = TempDir::new().expect("temp dir");
        let project_temp = TempDir::new().expect("temp dir");

        let rlm_dir = project_temp.path().join(".rlm");
        std::fs::create_dir_all(&rlm_dir).expect("create .rlm");

        let global_path = create_config_file(
            global_temp.path(),
            r#"
debug = true

[context]
variable = "global_doc"
"#,
        );

        create_config_file(
            &rlm_dir,
            r#"
[context]
variable = "project_doc"
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&global_path)
            .with_project_root(project_temp.path())
            .skip_env_vars()
            .load()
            .expect("load");

        // debug from global (not overridden in project)
        assert!(config.debug);
        assert_eq!(config.context.variable, "project_doc");
    }

    #[test]
    fn missing_config_files_ok() {
        let config = ConfigLoader::new()
            .with_global_config("/nonexistent/path/config.toml")
            .with_project_root("/nonexistent/project")
            .skip_env_vars()
            .load()
            .expect("load");

        assert_eq!(config, SandboxConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().expect("temp dir");
        let path = create_config_file(temp.path(), "debug = = true");

        let err = ConfigLoader::new()
            .with_global_config(&path)
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect_err("malformed");

        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn empty_prefix_rejected() {
        let temp = TempDir::new().expect("temp dir");
        let path = create_config_file(temp.path(), "[bridge]\nid_prefix = \" \"\n");

        let err = ConfigLoader::new()
            .with_global_config(&path)
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect_err("empty prefix");

        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "bridge.id_prefix"));
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));

        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));

        assert_eq!(parse_bool("invalid"), None);
    }

    #[test]
    fn env_var_override() {
        // Only test in this crate that touches RLM_* env vars.
        std::env::set_var("RLM_DEBUG", "true");
        std::env::set_var("RLM_BRIDGE_PREFIX", "env");
        std::env::set_var("RLM_LOG_FILE", "/tmp/rlm-env-logs");

        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .load();

        std::env::remove_var("RLM_DEBUG");
        std::env::remove_var("RLM_BRIDGE_PREFIX");
        std::env::remove_var("RLM_LOG_FILE");

        let config = config.expect("load");
        assert!(config.debug);
        assert_eq!(config.bridge.id_prefix, "env");
        assert!(config.logging.file);
        assert_eq!(
            config.logging.file_path,
            Some(PathBuf::from("/tmp/rlm-env-logs"))
        );
    }
}
