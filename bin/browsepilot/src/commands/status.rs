use anyhow::Result;
use browsepilot_core::{Config, Paths};

pub fn run() -> Result<()> {
    let paths = Paths::new();
    let config_path = paths.config_file();
    let config = Config::load(&config_path)?;

    println!("browsepilot status");
    println!(
        "  config: {} ({})",
        config_path.display(),
        if config_path.exists() { "present" } else { "missing, using defaults" }
    );
    println!("  model: {}", config.agent.model);
    println!(
        "  api key: {}",
        if config.agent.api_key.is_empty() { "NOT SET" } else { "set" }
    );
    println!("  gateway: {}:{}", config.gateway.host, config.gateway.port);
    println!("  max iterations: {}", config.agent.max_iterations);
    Ok(())
}
