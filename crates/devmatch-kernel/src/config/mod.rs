//! Configuration loading
//!
//! Resolver policy (lease lengths, reaper period, call timeouts) is read
//! through the `config` crate. Files may be TOML, YAML or JSON; the format is
//! picked from the extension. `${VAR}` and `$VAR` references are replaced by
//! environment values before parsing, and `DEVMATCH_*` environment variables
//! override file values last.

mod resolver;

pub use resolver::{MAX_PERIOD, ResolverConfig};

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

/// Prefix of environment variables layered over file values.
pub const ENV_PREFIX: &str = "DEVMATCH";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Detect configuration format from file extension
pub fn detect_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Replace `${VAR}` and `$VAR` references with environment values.
///
/// Unset variables are left untouched.
pub fn substitute_env_vars(content: &str) -> ConfigResult<String> {
    let braced = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    let simple =
        Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").map_err(|e| ConfigError::Parse(e.to_string()))?;

    let lookup = |caps: &Captures<'_>| std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string());

    let result = braced.replace_all(content, lookup).into_owned();
    Ok(simple.replace_all(&result, lookup).into_owned())
}

/// Parse `content` in the given format, without environment overrides.
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content)?;

    Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load a file, detecting its format from the extension.
pub fn load_config<T>(path: impl AsRef<Path>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    debug!("Loaded config file {:?} ({} bytes)", path, content.len());
    from_str(&content, format)
}

/// Load an optional file and layer `DEVMATCH_*` environment variables on top.
///
/// Nested keys use `__` as separator, e.g. `DEVMATCH_SHORT_LEASE_SECS=60`.
pub fn load_layered<T>(path: Option<&Path>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let mut builder = Cfg::builder();

    if let Some(path) = path {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&content)?;
        builder = builder.add_source(File::from_str(&substituted, format));
    }

    builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}
