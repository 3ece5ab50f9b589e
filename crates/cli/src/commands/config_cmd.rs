//! `wayfarer config`: configuration management commands.

use std::path::Path;

use wayfarer_config::AppConfig;

const REDACTED: &str = "***";

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    if let Err(e) = config.check_credentials() {
        warnings.push(e.to_string());
    }
    if config.tasks_file.is_none() {
        warnings.push("No tasks_file set; `wayfarer run` will need --task or --tasks-file".into());
    }
    if config.agent.enable_memory && config.agent.memory_interval >= config.agent.max_steps {
        warnings.push(format!(
            "memory_interval ({}) >= max_steps ({}): consolidation will never run",
            config.agent.memory_interval, config.agent.max_steps
        ));
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:  {}", config.default_provider);
    println!("   Model:     {}", config.model());
    println!("   Start URL: {}", config.browser.start_url);
    println!("   Memory:    {}", config.memory.backend);
    println!("   Logs:      {}", config.log_dir.display());
    Ok(())
}

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    redact(&mut config);
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_path().display());
}

pub fn init() {
    print!("{}", AppConfig::default_toml());
}

/// Hide keys and sensitive values before printing.
fn redact(config: &mut AppConfig) {
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.into());
        }
    }
    for value in config.sensitive_data.values_mut() {
        *value = REDACTED.into();
    }
}
