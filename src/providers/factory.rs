// Adapter construction from configuration entries

use std::sync::Arc;

use super::{GeminiAdapter, ProviderAdapter, TogetherAdapter};
use crate::config::ProviderEntry;
use crate::error::{Error, Result};

/// Build an adapter for a configured provider entry.
///
/// A blank API key is a configuration error surfaced distinctly, so
/// operators can diagnose it while the service keeps answering learners
/// through the fallback path.
pub fn create_adapter(entry: &ProviderEntry) -> Result<Arc<dyn ProviderAdapter>> {
    let key = entry.api_key().trim();
    if key.is_empty() {
        return Err(Error::configuration(format!(
            "provider '{}' has no API key configured",
            entry.provider_type()
        )));
    }

    let adapter: Arc<dyn ProviderAdapter> = match entry {
        ProviderEntry::Gemini {
            api_key,
            model,
            base_url,
            ..
        } => {
            let mut adapter = GeminiAdapter::new(api_key.clone());
            if let Some(model) = model {
                adapter = adapter.with_model(model.clone());
            }
            if let Some(base_url) = base_url {
                adapter = adapter.with_base_url(base_url.clone());
            }
            Arc::new(adapter)
        }
        ProviderEntry::Together {
            api_key,
            model,
            base_url,
            ..
        } => {
            let mut adapter = TogetherAdapter::new(api_key.clone());
            if let Some(model) = model {
                adapter = adapter.with_model(model.clone());
            }
            if let Some(base_url) = base_url {
                adapter = adapter.with_base_url(base_url.clone());
            }
            Arc::new(adapter)
        }
    };

    tracing::info!(
        provider = adapter.name(),
        model = adapter.default_model(),
        "provider adapter created"
    );
    Ok(adapter)
}
