//! HTTP client for a Meilisearch-compatible engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::document::SearchDocument;
use super::engine::{EngineHits, IndexSettings, IndexStats, SearchEngine, SearchRequest};
use super::SearchError;
use crate::config::SearchConfig;

pub struct MeiliEngine {
    client: Client,
    base_url: String,
    index_uid: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponseBody {
    hits: Vec<HitId>,
    #[serde(default)]
    estimated_total_hits: Option<u64>,
    #[serde(default)]
    total_hits: Option<u64>,
    #[serde(default)]
    processing_time_ms: u64,
}

#[derive(Deserialize)]
struct HitId {
    id: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    number_of_documents: u64,
    #[serde(default)]
    is_indexing: bool,
}

impl MeiliEngine {
    pub fn new(
        base_url: impl Into<String>,
        index_uid: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index_uid: index_uid.into(),
            api_key,
        })
    }

    /// Builds a client from the `search` config section. `None` when no
    /// URL is configured.
    pub fn from_config(config: &SearchConfig) -> Result<Option<Self>, SearchError> {
        let Some(url) = config.url.as_deref() else {
            return Ok(None);
        };
        Self::new(
            url,
            config.index_uid.clone(),
            config.api_key.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
        .map(Some)
    }

    fn index_url(&self, path: &str) -> String {
        format!("{}/indexes/{}{}", self.base_url, self.index_uid, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check(response: Response) -> Result<Response, SearchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SearchError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, SearchError> {
        response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))
    }
}

fn id_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl SearchEngine for MeiliEngine {
    async fn health(&self) -> bool {
        let request = self.client.get(format!("{}/health", self.base_url));
        let response = match self.authorized(request).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!(status = %response.status(), "Search engine health probe failed");
                return false;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Search engine unreachable");
                return false;
            }
        };
        match response.json::<HealthResponse>().await {
            Ok(body) => body.status == "available",
            Err(_) => false,
        }
    }

    async fn upsert_documents(&self, documents: &[SearchDocument]) -> Result<(), SearchError> {
        if documents.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .post(self.index_url("/documents"))
            .query(&[("primaryKey", "id")])
            .json(documents);
        Self::check(self.authorized(request).send().await?).await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), SearchError> {
        let request = self.client.delete(self.index_url(&format!("/documents/{}", id)));
        let response = self.authorized(request).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<EngineHits, SearchError> {
        let body = json!({
            "q": request.query,
            "offset": request.offset,
            "limit": request.limit,
            "attributesToRetrieve": ["id"],
        });
        let http = self.client.post(self.index_url("/search")).json(&body);
        let response = Self::check(self.authorized(http).send().await?).await?;
        let parsed: SearchResponseBody = Self::decode(response).await?;

        let ids: Vec<String> = parsed.hits.into_iter().map(|h| id_to_string(h.id)).collect();
        Ok(EngineHits {
            estimated_total: parsed
                .estimated_total_hits
                .or(parsed.total_hits)
                .unwrap_or(ids.len() as u64),
            ids,
            processing_time_ms: parsed.processing_time_ms,
        })
    }

    async fn apply_settings(&self, settings: &IndexSettings) -> Result<(), SearchError> {
        let request = self.client.patch(self.index_url("/settings")).json(settings);
        Self::check(self.authorized(request).send().await?).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats, SearchError> {
        let request = self.client.get(self.index_url("/stats"));
        let response = Self::check(self.authorized(request).send().await?).await?;
        let stats: StatsResponse = Self::decode(response).await?;
        Ok(IndexStats {
            documents: stats.number_of_documents,
            is_indexing: stats.is_indexing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_without_url() {
        assert!(MeiliEngine::from_config(&SearchConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_urls() {
        let engine = MeiliEngine::new(
            "http://localhost:7700/",
            "archives",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            engine.index_url("/search"),
            "http://localhost:7700/indexes/archives/search"
        );
    }

    #[test]
    fn test_numeric_ids_are_stringified() {
        assert_eq!(id_to_string(json!(42)), "42");
        assert_eq!(id_to_string(json!("42")), "42");
    }

    #[tokio::test]
    async fn test_unreachable_engine_is_unhealthy() {
        // Port 9 (discard) is closed on any sane test host.
        let engine = MeiliEngine::new(
            "http://127.0.0.1:9",
            "archives",
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(!engine.health().await);
    }
}
