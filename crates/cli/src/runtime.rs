//! Wiring shared by `serve` and `chat`: config, then providers, registry and agent.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pico_agent::{Agent, AgentSettings};
use pico_config::AppConfig;
use pico_plugins::PluginSet;
use tracing::info;

pub struct Runtime {
    pub config: AppConfig,
    pub plugins: PluginSet,
    pub agent: Arc<Agent>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    AppConfig::load_with(path).context("Failed to load config")
}

/// Open the data files and register every provider.
pub fn open_plugins(config: &AppConfig) -> anyhow::Result<(PluginSet, pico_core::registry::CapabilityRegistry)> {
    let plugins = PluginSet::open(&config.storage.data_dir).with_context(|| {
        format!(
            "Failed to open data directory {}",
            config.storage.data_dir.display()
        )
    })?;
    let registry = plugins
        .registry(Duration::from_secs(config.agent.tool_timeout_secs))
        .context("Failed to register capability providers")?;
    info!(
        data_dir = %config.storage.data_dir.display(),
        providers = ?registry.provider_names(),
        "Capability providers registered"
    );
    Ok((plugins, registry))
}

impl Runtime {
    pub fn build(config: AppConfig) -> anyhow::Result<Self> {
        if !config.has_api_key() {
            anyhow::bail!(
                "No API key configured. Set ANTHROPIC_API_KEY or add `api_key` to {}",
                AppConfig::config_path().display()
            );
        }
        let model = pico_providers::build_from_config(&config)
            .context("Failed to build model provider")?;
        let (plugins, registry) = open_plugins(&config)?;
        let agent = Agent::new(
            model,
            Arc::new(registry),
            AgentSettings::from_config(&config),
        );
        Ok(Self {
            config,
            plugins,
            agent: Arc::new(agent),
        })
    }
}
