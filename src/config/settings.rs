// Service settings: providers, retry policy, engagement thresholds.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::provider::ProviderEntry;
use crate::providers::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempt_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 30,
            max_retries: 2,
            backoff_base_ms: 1000,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

/// Engagement score thresholds for the two unlock stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    pub quiz: u32,
    pub practice: u32,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            quiz: 30,
            practice: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub thresholds: ThresholdSettings,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".studyloop")
        .join("studyloop.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            retry: RetrySettings::default(),
            thresholds: ThresholdSettings::default(),
            db_path: default_db_path(),
        }
    }
}

impl Config {
    pub fn with_providers(providers: Vec<ProviderEntry>) -> Self {
        Self {
            providers,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            bail!("no providers configured");
        }
        if self.thresholds.quiz == 0 || self.thresholds.practice == 0 {
            bail!("engagement thresholds must be positive");
        }
        if self.thresholds.quiz >= self.thresholds.practice {
            bail!(
                "quiz threshold ({}) must be below practice threshold ({})",
                self.thresholds.quiz,
                self.thresholds.practice
            );
        }
        if self.retry.attempt_timeout_secs == 0 {
            bail!("attempt timeout must be positive");
        }
        Ok(())
    }
}
