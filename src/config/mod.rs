//! Configuration module
//!
//! Handles loading settings from YAML files and environment variables.

mod settings;

pub use settings::*;

use anyhow::Result;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use tracing::info;

/// Global settings instance
static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// Initialize global settings from a file
pub fn init_from_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut settings = Settings::from_file(path)?;
    settings.merge_env();
    init(settings)
}

/// Initialize global settings with an already loaded value
pub fn init(settings: Settings) -> Result<()> {
    SETTINGS
        .set(settings)
        .map_err(|_| anyhow::anyhow!("Settings already initialized"))?;
    Ok(())
}

/// Get a reference to the global settings
pub fn get() -> Option<&'static Settings> {
    SETTINGS.get()
}

/// Check if settings have been initialized
pub fn is_initialized() -> bool {
    SETTINGS.get().is_some()
}

/// Locate and load settings, falling back to defaults.
///
/// `PPLX_SETTINGS_PATH` wins over the default search paths; environment
/// overrides are applied last.
pub fn load() -> Result<Settings> {
    if let Ok(path) = std::env::var("PPLX_SETTINGS_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return load_from(&path);
        }
    }

    for path in default_paths() {
        if path.exists() {
            return load_from(&path);
        }
    }

    info!("No settings file found, using defaults");
    let mut settings = Settings::default();
    settings.merge_env();
    Ok(settings)
}

fn load_from(path: &Path) -> Result<Settings> {
    info!("Loading settings from: {}", path.display());
    let mut settings = Settings::from_file(path)?;
    settings.merge_env();
    Ok(settings)
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("settings.yml"),
        PathBuf::from("config/settings.yml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("pplx-client/settings.yml"));
    }
    paths
}
