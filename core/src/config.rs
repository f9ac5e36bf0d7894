//! Application configuration
//!
//! Loaded from a YAML file; every section has runnable defaults so a
//! missing file still yields a working local setup (Ollama endpoint, open
//! network policy, consent required for sensitive tools). The API key can
//! always be overridden through `SWARMGATE_API_KEY`.

use crate::error::{Result, SwarmError};
use crate::llm::client::ProviderConfig;
use crate::policy::GlobalPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_sec: u64,
    pub error_ttl_sec: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_entries: 256,
            ttl_sec: 3600,
            error_ttl_sec: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub price_in_per_m: f64,
    pub price_out_per_m: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        BudgetConfig {
            price_in_per_m: 0.35,
            price_out_per_m: 1.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub policy: GlobalPolicy,
    /// Root directory the sandbox confines tools to
    pub workdir: PathBuf,
    pub cache: CacheConfig,
    pub budget: BudgetConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            provider: ProviderConfig::default(),
            policy: GlobalPolicy::default(),
            workdir: PathBuf::from("./workspace"),
            cache: CacheConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: AppConfig =
            serde_yml::from_str(&raw).map_err(|e| SwarmError::InvalidConfig {
                message: format!("{}: {}", path.display(), e),
            })?;
        config.apply_env();
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let mut config = AppConfig::default();
            config.apply_env();
            Ok(config)
        }
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("SWARMGATE_API_KEY") {
            if !key.trim().is_empty() {
                self.provider.api_key = Some(key);
            }
        }
    }
}
