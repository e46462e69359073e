//! Configuration management with hierarchical layering.
//!
//! # Architecture
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌─────────────────────────────────────────┐
//! │  1. CLI flags (via ConfigResolver)      │  Per-invocation
//! ├─────────────────────────────────────────┤
//! │  2. Environment Variables (RLM_*)       │  Runtime override
//! ├─────────────────────────────────────────┤
//! │  3. Project Config (.rlm/config.toml)   │  Project-specific
//! ├─────────────────────────────────────────┤
//! │  4. Global Config (~/.rlm/config.toml)  │  User defaults
//! ├─────────────────────────────────────────┤
//! │  5. Default Values (compile-time)       │  Fallback
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `RLM_DEBUG` | `debug` | bool |
//! | `RLM_BRIDGE_PREFIX` | `bridge.id_prefix` | String |
//! | `RLM_LOG_FILE` | `logging.file_path` (enables `logging.file`) | PathBuf |
//! | `RLM_LOG_LEVEL` | `logging.file_level` | String |
//!
//! # Example Configuration
//!
//! ```toml
//! # ~/.rlm/config.toml
//! debug = false
//!
//! [bridge]
//! id_prefix = "bridge"
//!
//! [context]
//! variable = "context"
//!
//! [logging]
//! file = true
//! file_path = "/var/log/rlm"
//! file_level = "debug"
//! ```

mod error;
mod loader;
mod resolver;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use resolver::{ConfigResolver, DefaultResolver};
pub use types::{BridgeConfig, ContextConfig, LoggingConfig, SandboxConfig};

/// Default global config directory.
#[must_use]
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".rlm")
}

/// Default global config file path.
#[must_use]
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".rlm";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";
