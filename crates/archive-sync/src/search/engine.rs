//! Search engine seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::document::SearchDocument;
use super::SearchError;

/// Index settings declared by `configure_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSettings {
    pub searchable_attributes: Vec<String>,
    pub filterable_attributes: Vec<String>,
    pub sortable_attributes: Vec<String>,
    pub ranking_rules: Vec<String>,
}

impl IndexSettings {
    /// The one settings document every configure call writes.
    pub fn canonical() -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            searchable_attributes: owned(&[
                "archive_no",
                "title",
                "keywords",
                "remarks",
                "responsible",
                "doc_number",
                "fonds_no",
            ]),
            filterable_attributes: owned(&["fonds_no", "year", "security_level", "retention_period"]),
            sortable_attributes: owned(&["created_at", "year", "doc_date"]),
            ranking_rules: owned(&[
                "words",
                "typo",
                "proximity",
                "attribute",
                "sort",
                "exactness",
                "created_at:desc",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub offset: u64,
    pub limit: u64,
}

/// Ranked ids returned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineHits {
    pub ids: Vec<String>,
    pub estimated_total: u64,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub documents: u64,
    pub is_indexing: bool,
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Cheap liveness probe. Never errors; an unreachable engine is unhealthy.
    async fn health(&self) -> bool;

    /// Adds or replaces documents by id.
    async fn upsert_documents(&self, documents: &[SearchDocument]) -> Result<(), SearchError>;

    /// Deletes a document. Deleting an unknown id succeeds.
    async fn delete_document(&self, id: &str) -> Result<(), SearchError>;

    async fn search(&self, request: &SearchRequest) -> Result<EngineHits, SearchError>;

    /// Overwrites the index settings.
    async fn apply_settings(&self, settings: &IndexSettings) -> Result<(), SearchError>;

    async fn stats(&self) -> Result<IndexStats, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_settings_are_stable() {
        assert_eq!(IndexSettings::canonical(), IndexSettings::canonical());
        let json = serde_json::to_value(IndexSettings::canonical()).unwrap();
        assert_eq!(json["searchableAttributes"][0], "archive_no");
        assert!(json["rankingRules"].as_array().unwrap().len() > 3);
    }
}
