use crate::config::EngineConfig;
use crate::engine::{
    AliasAction, BulkOperation, BulkResponse, EngineError, EngineResponse, EngineResult, SearchEngine,
};
use crate::search::{SearchError, SearchResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Client for an Elasticsearch-compatible REST API
#[derive(Clone)]
pub struct HttpEngine {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatIndex {
    index: String,
}

impl HttpEngine {
    /// Create a client from the engine configuration
    pub fn new(config: &EngineConfig) -> SearchResult<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| SearchError::Configuration(format!("Invalid engine url '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SearchError::Configuration(format!(
                "Engine url '{}' cannot be used as a base",
                config.url
            )));
        }

        let password = match config.password_env {
            Some(ref var) => Some(std::env::var(var).map_err(|_| {
                SearchError::Configuration(format!("Environment variable {} is not set", var))
            })?),
            None => None,
        };

        let mut builder = Client::builder().user_agent(concat!("searchlink/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| SearchError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password,
        })
    }

    fn url(&self, segments: &[&str]) -> EngineResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EngineError::Unavailable(format!("invalid engine url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.username {
            Some(ref username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }

    /// Send a request and return the status with the raw body.
    ///
    /// Non-2xx statuses are returned, not converted, so callers can treat 404 specially.
    async fn send(&self, request: RequestBuilder) -> EngineResult<(StatusCode, String)> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Unavailable(format!("Engine request timed out: {}", e))
            } else if e.is_connect() {
                EngineError::Unavailable(format!("Failed to connect to engine: {}", e))
            } else {
                EngineError::Unavailable(format!("Engine request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::Unavailable(format!("Failed to read engine response: {}", e)))?;
        Ok((status, body))
    }

    async fn send_ok(&self, request: RequestBuilder) -> EngineResult<String> {
        let (status, body) = self.send(request).await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(error_from_response(status, &body))
        }
    }
}

/// Map an error status and body to an [`EngineError`]
fn error_from_response(status: StatusCode, body: &str) -> EngineError {
    if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        return EngineError::Unavailable(format!("Engine returned {}", status));
    }

    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let (kind, reason) = match parsed.as_ref().and_then(|v| v.get("error")) {
        Some(Value::Object(error)) => (
            error
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            error
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Some(Value::String(reason)) => ("unknown".to_string(), reason.clone()),
        _ => ("unknown".to_string(), body.chars().take(200).collect()),
    };
    EngineError::rejected(status.as_u16(), kind, reason)
}

/// Newline-delimited bulk body; every line, including the last, ends with `\n`
fn bulk_body(operations: &[BulkOperation]) -> EngineResult<String> {
    let mut body = String::new();
    for operation in operations {
        match operation {
            BulkOperation::Index { id, source } => {
                body.push_str(&serde_json::to_string(&json!({ "index": { "_id": id } }))?);
                body.push('\n');
                body.push_str(&serde_json::to_string(source)?);
                body.push('\n');
            }
            BulkOperation::Delete { id } => {
                body.push_str(&serde_json::to_string(&json!({ "delete": { "_id": id } }))?);
                body.push('\n');
            }
        }
    }
    Ok(body)
}

#[async_trait]
impl SearchEngine for HttpEngine {
    async fn create_index(&self, name: &str, body: &Value) -> EngineResult<()> {
        debug!(index = %name, "Creating index");
        let url = self.url(&[name])?;
        self.send_ok(self.client.put(url).json(body)).await?;
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> EngineResult<bool> {
        let url = self.url(&[name])?;
        let (status, body) = self.send(self.client.delete(url)).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(error_from_response(s, &body)),
        }
    }

    async fn index_exists(&self, name: &str) -> EngineResult<bool> {
        let url = self.url(&[name])?;
        let (status, body) = self.send(self.client.head(url)).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(error_from_response(s, &body)),
        }
    }

    async fn list_indices(&self, pattern: &str) -> EngineResult<Vec<String>> {
        let mut url = self.url(&["_cat", "indices", pattern])?;
        url.query_pairs_mut().append_pair("format", "json").append_pair("h", "index");

        let (status, body) = self.send(self.client.get(url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }

        let rows: Vec<CatIndex> = serde_json::from_str(&body)?;
        let mut names: Vec<String> = rows.into_iter().map(|row| row.index).collect();
        names.sort();
        Ok(names)
    }

    async fn get_alias(&self, alias: &str) -> EngineResult<Vec<String>> {
        let url = self.url(&["_alias", alias])?;
        let (status, body) = self.send(self.client.get(url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }

        let indices: BTreeMap<String, Value> = serde_json::from_str(&body)?;
        Ok(indices.into_keys().collect())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> EngineResult<()> {
        let url = self.url(&["_aliases"])?;
        let actions: Vec<Value> = actions.iter().map(AliasAction::to_json).collect();
        self.send_ok(self.client.post(url).json(&json!({ "actions": actions })))
            .await?;
        Ok(())
    }

    async fn bulk(&self, index: &str, operations: &[BulkOperation]) -> EngineResult<BulkResponse> {
        if operations.is_empty() {
            return Ok(BulkResponse::default());
        }

        let url = self.url(&[index, "_bulk"])?;
        let request = self
            .client
            .post(url)
            .header("Content-Type", "application/x-ndjson")
            .body(bulk_body(operations)?);
        let body = self.send_ok(request).await?;

        let response: BulkResponse = serde_json::from_str(&body)?;
        if response.errors {
            warn!(
                index = %index,
                failed = response.failures().count(),
                "Bulk request completed with item errors"
            );
        }
        Ok(response)
    }

    async fn delete_document(&self, index: &str, id: &str) -> EngineResult<bool> {
        let url = self.url(&[index, "_doc", id])?;
        let (status, body) = self.send(self.client.delete(url)).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(error_from_response(s, &body)),
        }
    }

    async fn refresh(&self, index: &str) -> EngineResult<()> {
        let url = self.url(&[index, "_refresh"])?;
        self.send_ok(self.client.post(url)).await?;
        Ok(())
    }

    async fn search(&self, index: &str, body: &Value) -> EngineResult<EngineResponse> {
        let url = self.url(&[index, "_search"])?;
        let body = self.send_ok(self.client.post(url).json(body)).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(url: &str) -> HttpEngine {
        HttpEngine::new(&EngineConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_bulk_body_is_ndjson() {
        let body = bulk_body(&[
            BulkOperation::Index {
                id: "1".to_string(),
                source: json!({ "name": "Gummy Bear" }),
            },
            BulkOperation::Delete { id: "2".to_string() },
        ])
        .unwrap();

        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#"{"index":{"_id":"1"}}"#);
        assert_eq!(lines[2], r#"{"delete":{"_id":"2"}}"#);
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_error_mapping() {
        let err = error_from_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"type":"resource_already_exists_exception","reason":"index exists"},"status":400}"#,
        );
        assert!(matches!(
            err,
            EngineError::Rejected { status: 400, ref kind, .. } if kind == "resource_already_exists_exception"
        ));

        let err = error_from_response(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(err, EngineError::Unavailable(_)));

        let err = error_from_response(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, EngineError::Rejected { status: 500, ref reason, .. } if reason == "boom"));
    }

    #[test]
    fn test_url_segments() {
        let engine = engine("http://localhost:9200/");
        assert_eq!(
            engine.url(&["products", "_doc", "a b"]).unwrap().as_str(),
            "http://localhost:9200/products/_doc/a%20b"
        );

        let engine = self::engine("http://localhost:9200/es");
        assert_eq!(
            engine.url(&["_aliases"]).unwrap().as_str(),
            "http://localhost:9200/es/_aliases"
        );
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let result = HttpEngine::new(&EngineConfig {
            url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(SearchError::Configuration(_))));
    }

    #[test]
    fn test_missing_password_env() {
        let result = HttpEngine::new(&EngineConfig {
            username: Some("elastic".to_string()),
            password_env: Some("SEARCHLINK_TEST_PASSWORD_THAT_IS_NOT_SET".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(SearchError::Configuration(_))));
    }
}
