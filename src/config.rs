use crate::search::{RecordClass, SearchConfig, SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Search engine connection
    pub engine: EngineConfig,

    /// Index naming and population
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Query defaults
    #[serde(default)]
    pub query: QueryConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Record class declarations, keyed by class name
    #[serde(default)]
    pub classes: BTreeMap<String, ClassConfig>,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("SEARCHLINK_CONFIG").unwrap_or_else(|_| "config/searchlink.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Same as [`Config::load`] with an explicit file path
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: SEARCHLINK__)
            .add_source(
                config::Environment::with_prefix("SEARCHLINK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Config>()?;
        config
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    /// Reject settings that would only fail later, on every reindex or search
    pub fn validate(&self) -> SearchResult<()> {
        if self.engine.backend == EngineBackend::Http && self.engine.url.trim().is_empty() {
            return Err(SearchError::Configuration("engine.url must not be empty".to_string()));
        }
        if self.engine.request_timeout_secs == Some(0) {
            return Err(SearchError::Configuration(
                "engine.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.indexing.batch_size == 0 {
            return Err(SearchError::Configuration(
                "indexing.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.indexing.number_of_shards == 0 {
            return Err(SearchError::Configuration(
                "indexing.number_of_shards must be greater than zero".to_string(),
            ));
        }
        if self.query.per_page == 0 {
            return Err(SearchError::Configuration("query.per_page must be greater than zero".to_string()));
        }
        let boosts = [
            ("query.personalize_boost", self.query.personalize_boost),
            ("query.autocomplete_boost", self.query.autocomplete_boost),
            ("query.misspellings_boost", self.query.misspellings_boost),
        ];
        for (name, boost) in boosts {
            if !(boost.is_finite() && boost >= 0.0) {
                return Err(SearchError::Configuration(format!(
                    "{} must be a non-negative number, got {}",
                    name, boost
                )));
            }
        }
        Ok(())
    }

    /// Build the record class declared under `[classes.<name>]`
    pub fn record_class(&self, name: &str) -> SearchResult<RecordClass> {
        let declared = self.classes.get(name).ok_or_else(|| {
            SearchError::Configuration(format!("record class '{}' is not declared", name))
        })?;
        RecordClass::with_kinds(name, declared.kinds.iter().cloned(), declared.search.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            indexing: IndexingConfig::default(),
            query: QueryConfig::default(),
            observability: ObservabilityConfig::default(),
            classes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine backend
    #[serde(default)]
    pub backend: EngineBackend,

    /// Base URL of the engine REST API
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// Basic auth username
    pub username: Option<String>,

    /// Name of the environment variable holding the basic auth password
    pub password_env: Option<String>,

    /// Transport timeout (seconds); unset means no client-side timeout
    pub request_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::default(),
            url: default_engine_url(),
            username: None,
            password_env: None,
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EngineBackend {
    #[default]
    Http,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Prepended to every index alias (`{prefix}_{name}`)
    pub index_prefix: Option<String>,

    /// Appended to every index alias, typically the environment (`products_test`)
    pub index_suffix: Option<String>,

    /// Documents per bulk request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_shards")]
    pub number_of_shards: u32,

    #[serde(default = "default_replicas")]
    pub number_of_replicas: u32,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            index_prefix: None,
            index_suffix: None,
            batch_size: default_batch_size(),
            number_of_shards: default_shards(),
            number_of_replicas: default_replicas(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Page size when the caller does not give one
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Boost added for documents the searching actor interacted with
    #[serde(default = "default_personalize_boost")]
    pub personalize_boost: f64,

    /// Boost of the autocomplete clause relative to exact matching
    #[serde(default = "default_autocomplete_boost")]
    pub autocomplete_boost: f64,

    /// Boost of the misspellings clause relative to exact matching
    #[serde(default = "default_misspellings_boost")]
    pub misspellings_boost: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            personalize_boost: default_personalize_boost(),
            autocomplete_boost: default_autocomplete_boost(),
            misspellings_boost: default_misspellings_boost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// A record class declared in configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassConfig {
    /// Subclass kinds stored in the same index (type hierarchy)
    #[serde(default)]
    pub kinds: Vec<String>,

    #[serde(flatten)]
    pub search: SearchConfig,
}

// Default value functions
fn default_engine_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_shards() -> u32 {
    1
}

fn default_replicas() -> u32 {
    1
}

fn default_per_page() -> usize {
    100
}

fn default_personalize_boost() -> f64 {
    10.0
}

fn default_autocomplete_boost() -> f64 {
    10.0
}

fn default_misspellings_boost() -> f64 {
    0.5
}

fn default_log_level() -> String {
    "info".to_string()
}
