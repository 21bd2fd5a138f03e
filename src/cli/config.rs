//! Configuration CLI command handlers

use std::path::{Path, PathBuf};

use crate::cli::commands::{ConfigCommand, ConfigKey};
use crate::core::Config;
use crate::error::{CrewdeckError, Result};

/// Handle configuration commands
///
/// `config_path` overrides the default file location.
pub fn handle_config(command: ConfigCommand, config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };

    match command {
        ConfigCommand::Set { key, value } => handle_set(&path, key, &value),
        ConfigCommand::Get { key } => handle_get(&path, key),
        ConfigCommand::Remove { key } => handle_remove(&path, key),
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// Handle setting a configuration value
fn handle_set(path: &Path, key: ConfigKey, value: &str) -> Result<()> {
    let mut config = Config::load_from(path)?;
    apply_value(&mut config, key, value)?;
    config.validate()?;
    config.save_to(path)?;

    match key {
        ConfigKey::ApiKey => println!("Dashboard API key has been stored."),
        _ => println!("{} set to: {}", key_name(key), display_value(&config, key)),
    }
    Ok(())
}

/// Handle getting a configuration value
fn handle_get(path: &Path, key: ConfigKey) -> Result<()> {
    let config = Config::load_from(path)?;
    println!("{}: {}", key_name(key), display_value(&config, key));
    Ok(())
}

/// Handle removing a configuration value
fn handle_remove(path: &Path, key: ConfigKey) -> Result<()> {
    let mut config = Config::load_from(path)?;
    let defaults = Config::default();
    match key {
        ConfigKey::ApiUrl => config.api_url = defaults.api_url,
        ConfigKey::ApiKey => config.api_key = None,
        ConfigKey::WorkspaceRoot => config.workspace_root = defaults.workspace_root,
        ConfigKey::OpenBrowser => config.open_browser = defaults.open_browser,
    }
    config.save_to(path)?;

    println!(
        "{} reset to default: {}",
        key_name(key),
        display_value(&config, key)
    );
    Ok(())
}

fn apply_value(config: &mut Config, key: ConfigKey, value: &str) -> Result<()> {
    let value = value.trim();
    match key {
        ConfigKey::ApiUrl => config.api_url = value.trim_end_matches('/').to_string(),
        ConfigKey::ApiKey => {
            if value.is_empty() {
                return Err(CrewdeckError::InvalidInput(
                    "API key cannot be empty. Use 'crewdeck config remove api-key' instead.".into(),
                ));
            }
            config.api_key = Some(value.to_string());
        }
        ConfigKey::WorkspaceRoot => {
            if value.is_empty() {
                return Err(CrewdeckError::InvalidInput(
                    "Workspace root cannot be empty.".into(),
                ));
            }
            config.workspace_root = PathBuf::from(value);
        }
        ConfigKey::OpenBrowser => {
            config.open_browser = parse_bool(value).ok_or_else(|| {
                CrewdeckError::InvalidInput(format!(
                    "Invalid value '{}'. Expected true or false.",
                    value
                ))
            })?;
        }
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn key_name(key: ConfigKey) -> &'static str {
    match key {
        ConfigKey::ApiUrl => "Dashboard URL",
        ConfigKey::ApiKey => "Dashboard API key",
        ConfigKey::WorkspaceRoot => "Workspace root",
        ConfigKey::OpenBrowser => "Open browser",
    }
}

fn display_value(config: &Config, key: ConfigKey) -> String {
    match key {
        ConfigKey::ApiUrl => config.api_url.clone(),
        ConfigKey::ApiKey => config
            .api_key
            .as_deref()
            .map(mask_secret)
            .unwrap_or_else(|| "Not configured".to_string()),
        ConfigKey::WorkspaceRoot => config.workspace_root.display().to_string(),
        ConfigKey::OpenBrowser => config.open_browser.to_string(),
    }
}

/// Mask a secret for display, keeping only its last four characters
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
