//! Loading the on-disk configuration file.
//!
//! The server's defaults live in a TOML file; overrides applied at runtime
//! are layered on top of whatever this loader returns. A missing file is
//! not an error: the built-in defaults are used instead.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;

/// Error type for configuration file loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse TOML: {0}")]
    Parse(String),
}

/// Load a configuration tree from a TOML file, falling back to the
/// built-in defaults when the file does not exist.
pub fn load_file<C>(path: impl AsRef<Path>) -> Result<C, LoadError>
where
    C: DeserializeOwned + Default,
{
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "config file not found, using built-in defaults");
        return Ok(C::default());
    }

    let content = fs::read_to_string(path).map_err(|e| LoadError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    from_toml(&content)
}

/// Parse a configuration tree from a TOML document.
pub fn from_toml<C: DeserializeOwned>(content: &str) -> Result<C, LoadError> {
    toml::from_str(content).map_err(|e| LoadError::Parse(e.to_string()))
}
