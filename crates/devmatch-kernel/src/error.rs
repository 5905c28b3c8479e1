//! Crate-level error types for `devmatch-kernel`.
//!
//! Every collaborator call made by the resolver returns [`KernelResult`].
//! None of these errors is fatal to resolution: the resolver converts each
//! one into a "no match" outcome for the candidate it came from.
//!
//! Configuration loading uses [`KernelReport`] so that callers can attach
//! context as the error travels up:
//!
//! ```rust,ignore
//! use devmatch_kernel::error::{IntoKernelReport, KernelReport};
//! use error_stack::ResultExt;
//!
//! fn startup(path: &str) -> KernelReport<ResolverConfig> {
//!     ResolverConfig::from_file(path)
//!         .into_report()
//!         .attach(format!("loading resolver config from {path}"))
//! }
//! ```

use std::time::Duration;

use error_stack::Report;
use thiserror::Error;

use crate::config::ConfigError;
use crate::module::ModuleError;

/// Unified error for collaborator calls and configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// Device property retrieval or notification failed.
    #[error("Device error: {0}")]
    Device(String),

    /// A locator could not produce driver ids or driver bytes.
    #[error("Locator {locator} failed: {message}")]
    Locator { locator: String, message: String },

    /// A driver's match or attach routine failed.
    #[error("Driver {driver_id} failed: {message}")]
    Driver { driver_id: String, message: String },

    /// The external selector failed.
    #[error("Selector error: {0}")]
    Selector(String),

    /// Module install or uninstall failed.
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    /// An external call did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// An internal / untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

impl KernelError {
    pub fn driver(driver_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Driver {
            driver_id: driver_id.into(),
            message: message.into(),
        }
    }

    pub fn locator(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Locator {
            locator: locator.into(),
            message: message.into(),
        }
    }

    /// Whether this error was produced by a call timing out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result alias for collaborator calls.
pub type KernelResult<T> = Result<T, KernelError>;

/// Error-stack backed result alias.
pub type KernelReport<T> = Result<T, Report<KernelError>>;

/// Lift a plain result into a [`KernelReport`].
pub trait IntoKernelReport<T> {
    fn into_report(self) -> KernelReport<T>;
}

impl<T, E> IntoKernelReport<T> for Result<T, E>
where
    E: Into<KernelError>,
{
    #[inline]
    fn into_report(self) -> KernelReport<T> {
        self.map_err(|e| Report::new(e.into()))
    }
}
