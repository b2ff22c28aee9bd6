// src/config.rs

//! Configuration loading utilities.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;

/// Load configuration from a TOML file and validate it.
///
/// A missing file yields the defaults; an unreadable, malformed or invalid
/// file is an error the caller should treat as fatal.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(path).map_err(|e| {
        AppError::config(format!("Failed to load config from {path:?}: {e}"))
    })?;
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid config {path:?}: {e}")))?;
    log::debug!("Loaded configuration from {:?}", path);
    Ok(config)
}
