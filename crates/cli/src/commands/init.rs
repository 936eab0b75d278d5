//! `pico init`: First-time setup.

use std::path::Path;

use anyhow::Context;
use pico_config::AppConfig;

pub fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path);

    if path.exists() {
        println!("Config already exists at: {}", path.display());
        println!("   Edit it manually or delete it and re-run init.");
        return Ok(());
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(&path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created config at: {}", path.display());
    println!();
    println!("Next steps:");
    println!("   1. Add your Anthropic API key to {} (or set ANTHROPIC_API_KEY)", path.display());
    println!("   2. Run: pico chat");
    Ok(())
}
