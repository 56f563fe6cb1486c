// Configuration management module
// TOML settings with environment overrides, validated once at startup

pub mod settings;

pub use settings::{
    CollectionConfig, CollectionsConfig, Config, ConfigError, IdentityConfig, OllamaConfig,
    ProviderKind, StorageConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}

/// Render the effective configuration as TOML
#[inline]
pub fn show_config(config: &Config) -> anyhow::Result<String> {
    use anyhow::Context;

    let mut rendered = format!("# {}\n", config.config_file_path().display());
    rendered.push_str(&toml::to_string_pretty(config).context("Failed to serialize config")?);
    Ok(rendered)
}
