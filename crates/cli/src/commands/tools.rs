//! `pico tools`: List what the providers expose. Needs no API key.

use std::path::Path;

use crate::runtime::{load_config, open_plugins};

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let (_plugins, registry) = open_plugins(&config)?;

    println!("Tools");
    println!("=====");
    for tool in registry.discover_tools() {
        println!("  {:<20} [{}] {}", tool.descriptor.name, tool.provider, tool.descriptor.description);
        for param in &tool.descriptor.params {
            let marker = if param.required { "*" } else { " " };
            println!("      {marker}{:<12} {:<8} {}", param.name, param.kind.as_str(), param.description);
        }
    }

    println!();
    println!("Resources");
    println!("=========");
    for resource in registry.discover_resources() {
        println!(
            "  {:<20} [{}] {}",
            resource.descriptor.uri, resource.provider, resource.descriptor.name
        );
    }
    Ok(())
}
