//! Config file loading for the CLI.

use std::path::Path;

use anyhow::{Context, Result};

use handoff_types::config::Config;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "handoff.toml";

/// Load a config: the explicit path when given, else `handoff.toml`
/// when present, else built-in defaults. The result is NOT validated;
/// callers decide how a validation failure maps to exit codes.
pub fn load(path: Option<&str>) -> Result<Config> {
    let path = match path {
        Some(explicit) => Some(explicit.to_string()),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Some(DEFAULT_CONFIG_FILE.to_string())
        }
        None => None,
    };

    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            let config: Config =
                toml::from_str(&raw).with_context(|| format!("parsing config file {path}"))?;
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}
