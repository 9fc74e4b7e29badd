//! `tasksmith config`: write or print the configuration.

use tasksmith_config::AppConfig;

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_dir().join("config.toml");
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("   Run with --force to overwrite it.");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    std::fs::create_dir_all(AppConfig::workspace_dir())?;

    println!("Wrote default config to {}", path.display());
    println!("   Set TASKSMITH_API_KEY (or ANTHROPIC_API_KEY / OPENAI_API_KEY) before running tasks.");
    Ok(())
}

pub async fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

/// A copy safe to print: every secret replaced by a marker.
fn redacted(config: &AppConfig) -> AppConfig {
    const MASK: &str = "***";
    let mut config = config.clone();
    if config.api_key.is_some() {
        config.api_key = Some(MASK.into());
    }
    if config.tools.search_api_key.is_some() {
        config.tools.search_api_key = Some(MASK.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(MASK.into());
        }
    }
    config
}
