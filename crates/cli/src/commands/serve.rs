//! `pico serve`: Start the HTTP API server.

use std::path::Path;

use pico_gateway::AppState;

use crate::runtime::{Runtime, load_config};

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let runtime = Runtime::build(config)?;
    let gateway = runtime.config.gateway.clone();

    println!("Pico Gateway");
    println!("   Listening: {}:{}", gateway.host, gateway.port);
    println!("   Model:     {}", runtime.config.model.name);
    println!("   Data:      {}", runtime.config.storage.data_dir.display());

    let state = AppState::new(runtime.agent, runtime.plugins);
    pico_gateway::serve(state, &gateway).await?;
    Ok(())
}
