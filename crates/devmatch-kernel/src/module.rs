//! Module loader contract.
//!
//! The loader fetches driver implementations from a byte stream and can
//! uninstall them again. The resolver tags the modules it installs on demand
//! with a location prefix so the reaper can find them later.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Module loader errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModuleError {
    #[error("Failed to install module {location}: {message}")]
    InstallFailed { location: String, message: String },

    #[error("Failed to uninstall module {location}: {message}")]
    UninstallFailed { location: String, message: String },

    #[error("Module not found: {0}")]
    NotFound(String),
}

/// An installed module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleHandle {
    /// Loader-assigned id, unique for the lifetime of the loader
    pub id: u64,
    /// Install location
    pub location: String,
}

impl ModuleHandle {
    pub fn new(id: u64, location: impl Into<String>) -> Self {
        Self {
            id,
            location: location.into(),
        }
    }

    /// Whether this module was installed under the given on-demand prefix.
    pub fn is_on_demand(&self, prefix: &str) -> bool {
        self.location.starts_with(prefix)
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.location, self.id)
    }
}

/// Installs and uninstalls driver modules.
#[async_trait::async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Install a module from raw bytes. Starting it is expected to announce
    /// its drivers through the registry.
    async fn install(&self, location: &str, bytes: Vec<u8>) -> Result<ModuleHandle, ModuleError>;

    /// Uninstall a previously installed module.
    async fn uninstall(&self, module: &ModuleHandle) -> Result<(), ModuleError>;

    /// All currently installed modules.
    async fn modules(&self) -> Vec<ModuleHandle>;

    /// Whether any device-matching consumer currently uses a service of `module`.
    async fn is_in_use(&self, module: &ModuleHandle) -> bool;
}
