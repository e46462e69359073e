//! Configuration resolver trait.
//!
//! # Architecture
//!
//! ```text
//! ConfigLoader.load()  →  SandboxConfig (files + env)
//!                              │
//!                              ▼
//!                 ConfigResolver.resolve()  (adds CLI overrides)
//!                              │
//!                              ▼
//!                     SandboxConfig (final)
//! ```

use super::{ConfigError, ConfigLoader, SandboxConfig};

/// Produces the final configuration for a run.
///
/// The binary implements this over its parsed arguments, applying them as
/// the highest-priority layer on top of [`ConfigLoader`].
pub trait ConfigResolver {
    /// Resolves the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer cannot be loaded.
    fn resolve(&self) -> Result<SandboxConfig, ConfigError>;
}

/// Resolver that loads files and env vars with no further overrides.
#[derive(Debug, Clone, Default)]
pub struct DefaultResolver {
    loader: ConfigLoader,
}

impl DefaultResolver {
    /// Wraps a configured loader.
    #[must_use]
    pub fn new(loader: ConfigLoader) -> Self {
        Self { loader }
    }
}

impl ConfigResolver for DefaultResolver {
    fn resolve(&self) -> Result<SandboxConfig, ConfigError> {
        self.loader.load()
    }
}
