use anyhow::{bail, Result};
use browsepilot_core::{Config, Paths};

/// Write a starter config. The API key can also come from
/// BROWSEPILOT_API_KEY, so an empty key here is not an error.
pub fn run(force: bool) -> Result<()> {
    let paths = Paths::new();
    let config_path = paths.config_file();

    if config_path.exists() && !force {
        bail!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    config.save(&config_path)?;

    println!("Wrote {}", config_path.display());
    println!("Next steps:");
    println!("  1. Put your API key in the config, or export BROWSEPILOT_API_KEY");
    println!("  2. Pick a model (e.g. claude/claude-sonnet-4-20250514 or gemini/gemini-2.0-flash)");
    println!("  3. Install the browser extension and run `browsepilot gateway`");
    Ok(())
}
