use std::path::Path;
use tracing::{debug, info};

use super::AppConfig;
use crate::error::{AppError, Result};

/// Environment variable naming a config file when none is passed on the CLI
pub const CONFIG_ENV: &str = "CAMRELAY_CONFIG";

/// Load configuration from a TOML file.
///
/// With no path the built-in defaults are used. An explicitly named file that
/// does not exist is an error rather than a silent fallback.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        debug!("No config file given, using defaults");
        return Ok(AppConfig::default());
    };

    if !path.exists() {
        return Err(AppError::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let text = std::fs::read_to_string(path)?;
    let config = parse_config(&text)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse configuration from TOML text
pub fn parse_config(text: &str) -> Result<AppConfig> {
    Ok(toml::from_str(text)?)
}
