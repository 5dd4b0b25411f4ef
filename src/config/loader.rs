// Configuration loader
// Loads from ~/.studyloop/config.toml or environment variables.

use anyhow::{bail, Context, Result};
use std::fs;

use super::provider::ProviderEntry;
use super::settings::Config;

/// Load configuration from the config file or environment.
pub fn load_config() -> Result<Config> {
    if let Some(config) = try_load_from_file()? {
        return Ok(config);
    }

    // Fall back to environment variables, Gemini first.
    if let Ok(api_key) = std::env::var("GEMINI_API_KEY") {
        if !api_key.is_empty() {
            let providers = vec![ProviderEntry::Gemini {
                api_key,
                model: None,
                base_url: None,
                name: Some("Gemini (Environment)".to_string()),
            }];
            return Ok(Config::with_providers(providers));
        }
    }
    if let Ok(api_key) = std::env::var("TOGETHER_API_KEY") {
        if !api_key.is_empty() {
            let providers = vec![ProviderEntry::Together {
                api_key,
                model: None,
                base_url: None,
                name: Some("Together (Environment)".to_string()),
            }];
            return Ok(Config::with_providers(providers));
        }
    }

    bail!(
        "No configuration found. Create ~/.studyloop/config.toml with a [[providers]] \
         entry, or set GEMINI_API_KEY / TOGETHER_API_KEY in the environment."
    );
}

fn try_load_from_file() -> Result<Option<Config>> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let config_path = home.join(".studyloop/config.toml");

    if !config_path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;

    config
        .validate()
        .context("Configuration validation failed")?;

    tracing::info!(path = %config_path.display(), "configuration loaded");
    Ok(Some(config))
}
