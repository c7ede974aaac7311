use crate::config::{EngineBackend, EngineConfig};
use crate::engine::{HttpEngine, InMemoryEngine, SearchEngine};
use crate::search::SearchResult;
use std::sync::Arc;

/// Create a search engine client based on configuration
pub fn create_engine(config: &EngineConfig) -> SearchResult<Arc<dyn SearchEngine>> {
    match config.backend {
        EngineBackend::Http => {
            tracing::info!(
                url = %config.url,
                authenticated = config.username.is_some(),
                timeout_secs = ?config.request_timeout_secs,
                "Initializing HTTP search engine client"
            );
            Ok(Arc::new(HttpEngine::new(config)?))
        }

        EngineBackend::Memory => {
            tracing::warn!("Using the in-memory search engine; indexed data is lost on exit");
            Ok(Arc::new(InMemoryEngine::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchError;

    #[tokio::test]
    async fn test_create_memory_engine() {
        let config = EngineConfig {
            backend: EngineBackend::Memory,
            ..Default::default()
        };

        let engine = create_engine(&config).unwrap();
        // Should be able to use the engine
        assert!(!engine.index_exists("products").await.unwrap());
    }

    #[test]
    fn test_create_http_engine() {
        let config = EngineConfig::default();
        assert!(create_engine(&config).is_ok());
    }

    #[test]
    fn test_http_engine_requires_valid_url() {
        let config = EngineConfig {
            url: "::nonsense".to_string(),
            ..Default::default()
        };

        let result = create_engine(&config);
        assert!(matches!(result, Err(SearchError::Configuration(_))));
    }
}
