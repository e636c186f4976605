use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::generation::OpenAiSettings;
use crate::retry::RetryPolicy;
use crate::scheduler::BatchPolicy;
use crate::storage::AssetCacheOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            storage: StorageConfig::default(),
            dedup: DedupConfig::default(),
            persistence: PersistenceConfig::default(),
            generator: GeneratorConfig::default(),
            batch: BatchConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_primary_directory")]
    pub primary_directory: String,
    /// Used when the primary directory cannot be created or written.
    /// Defaults to `<temp dir>/citybingo/images`.
    #[serde(default)]
    pub fallback_directory: Option<String>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_primary_directory() -> String {
    "public/images".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("citybingo-asset-cache/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            primary_directory: default_primary_directory(),
            fallback_directory: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl StorageConfig {
    pub fn primary_path(&self) -> PathBuf {
        PathBuf::from(&self.primary_directory)
    }

    pub fn fallback_path(&self) -> PathBuf {
        match &self.fallback_directory {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join("citybingo").join("images"),
        }
    }

    pub fn asset_cache_options(&self) -> AssetCacheOptions {
        AssetCacheOptions {
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_stale_after_secs() -> u64 {
    120
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl DedupConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_cache_capacity() -> u64 {
    crate::persistence::DEFAULT_CACHE_CAPACITY
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            database_path: None,
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl PersistenceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::db::default_database_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_size")]
    pub size: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_api_base() -> String {
    crate::generation::openai::DEFAULT_API_BASE.to_string()
}

fn default_model() -> String {
    crate::generation::openai::DEFAULT_MODEL.to_string()
}

fn default_size() -> String {
    crate::generation::openai::DEFAULT_SIZE.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            size: default_size(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl GeneratorConfig {
    /// Builds generator settings, reading the API key from the environment.
    pub fn settings(&self) -> OpenAiSettings {
        OpenAiSettings {
            api_base: self.api_base.clone(),
            model: self.model.clone(),
            size: self.size.clone(),
            api_key: std::env::var(&self.api_key_env)
                .ok()
                .filter(|key| !key.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchPolicyConfig {
    FixedConcurrency {
        #[serde(default = "default_group_size")]
        group_size: usize,
        #[serde(default = "default_inter_batch_delay_ms")]
        inter_batch_delay_ms: u64,
    },
    FixedSpacing {
        #[serde(default = "default_spacing_ms")]
        spacing_ms: u64,
    },
}

fn default_group_size() -> usize {
    3
}

fn default_inter_batch_delay_ms() -> u64 {
    5000
}

fn default_spacing_ms() -> u64 {
    5000
}

impl Default for BatchPolicyConfig {
    fn default() -> Self {
        BatchPolicyConfig::FixedConcurrency {
            group_size: default_group_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
        }
    }
}

impl From<BatchPolicyConfig> for BatchPolicy {
    fn from(config: BatchPolicyConfig) -> Self {
        match config {
            BatchPolicyConfig::FixedConcurrency {
                group_size,
                inter_batch_delay_ms,
            } => BatchPolicy::FixedConcurrency {
                group_size,
                inter_batch_delay: Duration::from_millis(inter_batch_delay_ms),
            },
            BatchPolicyConfig::FixedSpacing { spacing_ms } => BatchPolicy::FixedSpacing {
                spacing: Duration::from_millis(spacing_ms),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub policy: BatchPolicyConfig,
    #[serde(default = "default_refresh_every")]
    pub refresh_every: usize,
}

fn default_refresh_every() -> usize {
    crate::scheduler::DEFAULT_REFRESH_EVERY
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            policy: BatchPolicyConfig::default(),
            refresh_every: default_refresh_every(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}
