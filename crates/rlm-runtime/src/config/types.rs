//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use crate::bridge::DEFAULT_ID_PREFIX;
use rlm_lua::DEFAULT_CONTEXT_VARIABLE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure.
///
/// This is the unified configuration after merging all layers.
///
/// # Example
///
/// ```
/// use rlm_runtime::config::SandboxConfig;
///
/// let config = SandboxConfig::default();
/// assert!(!config.debug);
/// assert_eq!(config.bridge.id_prefix, "bridge");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Enable debug logging on stderr.
    pub debug: bool,

    /// Bridge callback settings.
    pub bridge: BridgeConfig,

    /// Execution context settings.
    pub context: ContextConfig,

    /// Log file settings.
    pub logging: LoggingConfig,
}

impl SandboxConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they
    /// differ from the default.
    pub fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.debug != default.debug {
            self.debug = other.debug;
        }

        self.bridge.merge(&other.bridge);
        self.context.merge(&other.context);
        self.logging.merge(&other.logging);
    }
}

/// Bridge callback configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Prefix of bridge correlation ids (`<prefix>:<n>`).
    pub id_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
        }
    }
}

impl BridgeConfig {
    fn merge(&mut self, other: &Self) {
        if other.id_prefix != DEFAULT_ID_PREFIX {
            self.id_prefix.clone_from(&other.id_prefix);
        }
    }
}

/// Execution context configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextConfig {
    /// Binding name of the context string.
    pub variable: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            variable: DEFAULT_CONTEXT_VARIABLE.to_string(),
        }
    }
}

impl ContextConfig {
    fn merge(&mut self, other: &Self) {
        if other.variable != DEFAULT_CONTEXT_VARIABLE {
            self.variable.clone_from(&other.variable);
        }
    }
}

/// Log file configuration.
///
/// The stderr layer is driven by CLI flags and `RUST_LOG`; these settings
/// only control the optional file layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write logs to a file as well.
    pub file: bool,

    /// Log directory. Defaults to `~/.rlm/logs`.
    pub file_path: Option<PathBuf>,

    /// Level directive for the file layer.
    pub file_level: String,
}

/// Default file log level.
const DEFAULT_FILE_LEVEL: &str = "debug";

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: false,
            file_path: None,
            file_level: DEFAULT_FILE_LEVEL.to_string(),
        }
    }
}

impl LoggingConfig {
    fn merge(&mut self, other: &Self) {
        if other.file {
            self.file = true;
        }
        if other.file_path.is_some() {
            self.file_path.clone_from(&other.file_path);
        }
        if other.file_level != DEFAULT_FILE_LEVEL {
            self.file_level.clone_from(&other.file_level);
        }
    }

    /// Log directory, falling back to `~/.rlm/logs`.
    #[must_use]
    pub fn resolved_file_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| super::default_config_dir().join("logs"))
    }

    /// `EnvFilter` directive for the file layer.
    ///
    /// A bare level is scoped to the sandbox crates; a full directive
    /// (containing `=` or `,`) passes through unchanged.
    #[must_use]
    pub fn file_filter_directive(&self) -> String {
        let level = self.file_level.trim();
        if level.contains('=') || level.contains(',') {
            return level.to_string();
        }
        format!("warn,rlm_sandbox={level},rlm_runtime={level},rlm_lua={level},rlm_protocol={level}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = SandboxConfig::default();
        assert!(!config.debug);
        assert_eq!(config.bridge.id_prefix, "bridge");
        assert_eq!(config.context.variable, "context");
        assert!(!config.logging.file);
        assert_eq!(config.logging.file_level, "debug");
    }

    #[test]
    fn parse_partial_toml() {
        let config = SandboxConfig::from_toml(
            r#"
debug = true

[bridge]
id_prefix = "cb"
"#,
        )
        .expect("parse");

        assert!(config.debug);
        assert_eq!(config.bridge.id_prefix, "cb");
        assert_eq!(config.context, ContextConfig::default());
    }

    #[test]
    fn parse_rejects_wrong_types() {
        assert!(SandboxConfig::from_toml("debug = \"yes\"").is_err());
    }

    #[test]
    fn merge_overrides_non_defaults_only() {
        let mut base = SandboxConfig::from_toml(
            r#"
debug = true

[context]
variable = "doc"
"#,
        )
        .expect("parse");

        let overlay = SandboxConfig::from_toml(
            r#"
[logging]
file = true
file_level = "trace"
"#,
        )
        .expect("parse");

        base.merge(&overlay);

        assert!(base.debug);
        assert_eq!(base.context.variable, "doc");
        assert!(base.logging.file);
        assert_eq!(base.logging.file_level, "trace");
    }

    #[test]
    fn file_filter_directive_scopes_bare_level() {
        let logging = LoggingConfig {
            file_level: "info".into(),
            ..LoggingConfig::default()
        };
        let directive = logging.file_filter_directive();
        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("rlm_runtime=info"));

        let logging = LoggingConfig {
            file_level: "rlm_lua=trace".into(),
            ..LoggingConfig::default()
        };
        assert_eq!(logging.file_filter_directive(), "rlm_lua=trace");
    }

    #[test]
    fn resolved_file_path_prefers_explicit() {
        let logging = LoggingConfig {
            file_path: Some(PathBuf::from("/tmp/rlm-logs")),
            ..LoggingConfig::default()
        };
        assert_eq!(logging.resolved_file_path(), PathBuf::from("/tmp/rlm-logs"));
        assert!(LoggingConfig::default()
            .resolved_file_path()
            .ends_with(".rlm/logs"));
    }
}
