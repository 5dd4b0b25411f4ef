// Configuration: provider entries, retry/threshold settings, loader.

mod loader;
mod provider;
mod settings;

pub use loader::load_config;
pub use provider::ProviderEntry;
pub use settings::{Config, RetrySettings, ThresholdSettings};
