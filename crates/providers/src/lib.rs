//! Model provider implementations for Pico.
//!
//! All providers implement the `pico_core::ModelProvider` trait.

pub mod anthropic;

use std::sync::Arc;

use pico_core::error::ProviderError;
use pico_core::model::ModelProvider;

pub use anthropic::AnthropicProvider;

/// Build the configured model provider.
///
/// Fails with [`ProviderError::NotConfigured`] when no API key is available.
pub fn build_from_config(
    config: &pico_config::AppConfig,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key: set api_key in config.toml or ANTHROPIC_API_KEY".into(),
            )
        })?;

    let mut provider = AnthropicProvider::new(api_key);
    if let Some(base_url) = &config.model.base_url {
        provider = provider.with_base_url(base_url);
    }
    tracing::debug!(model = %config.model.name, "Built Anthropic provider");
    Ok(Arc::new(provider))
}
