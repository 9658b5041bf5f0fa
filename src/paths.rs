//! Path resolution for nimbus
//!
//! # Environment Variables
//!
//! - `NIMBUS_CONFIG_DIR` - Override config directory
//! - `NIMBUS_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `NIMBUS_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/nimbus` (if set)
//! 3. `~/.config/nimbus`
//!
//! For state_dir():
//! 1. `NIMBUS_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/nimbus` (if set)
//! 3. `~/.local/state/nimbus`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "NIMBUS_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "NIMBUS_STATE_DIR";

/// Get the nimbus config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("nimbus");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("nimbus");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the nimbus state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("nimbus");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("nimbus");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Default location of the provider state file
pub fn default_state_file() -> Result<PathBuf> {
    Ok(state_dir()?.join("state.json"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
