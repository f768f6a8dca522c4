//! Read path: engine-ranked search with a relational fallback.
//!
//! Both paths return the same [`SearchResponse`] shape. The fallback orders
//! by recency (`created_at DESC, id DESC`), not by relevance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::engine::{SearchEngine, SearchRequest};
use super::SearchError;
use crate::db::{record_repo, Database};
use crate::records::ArchiveRecord;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;
/// Largest offset the relational store accepts (SQLite binds signed 64-bit).
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
}

impl Pagination {
    /// Clamps to `page >= 1` and `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Rows to skip, saturating at [`MAX_OFFSET`] for out-of-range pages.
    pub fn offset(&self) -> u64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.page_size)
            .min(MAX_OFFSET)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PageInfo {
    fn new(pagination: Pagination, total: u64) -> Self {
        Self {
            page: pagination.page,
            page_size: pagination.page_size,
            total,
            total_pages: total.div_ceil(pagination.page_size),
        }
    }
}

/// Which path produced a response. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Engine,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub items: Vec<ArchiveRecord>,
    pub pagination: PageInfo,
    pub query: String,
    pub elapsed_ms: u64,
    pub source: ResultSource,
}

pub struct QueryRouter {
    engine: Arc<dyn SearchEngine>,
    db: Database,
}

impl QueryRouter {
    pub fn new(engine: Arc<dyn SearchEngine>, db: Database) -> Self {
        Self { engine, db }
    }

    /// Searches through the engine when it is healthy, otherwise (or when
    /// the engine call fails) through the relational fallback. Engine
    /// trouble never surfaces as an error; only the store can fail.
    pub async fn search(
        &self,
        query: &str,
        pagination: Pagination,
    ) -> Result<SearchResponse, SearchError> {
        if !self.engine.health().await {
            tracing::warn!("Search engine unhealthy, using relational fallback");
            return self.fallback(query, pagination);
        }

        let request = SearchRequest {
            query: query.to_string(),
            offset: pagination.offset(),
            limit: pagination.page_size,
        };
        match self.engine.search(&request).await {
            Ok(hits) => {
                let items = self.hydrate(&hits.ids)?;
                Ok(SearchResponse {
                    items,
                    pagination: PageInfo::new(pagination, hits.estimated_total),
                    query: query.to_string(),
                    elapsed_ms: hits.processing_time_ms,
                    source: ResultSource::Engine,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Engine search failed, using relational fallback");
                self.fallback(query, pagination)
            }
        }
    }

    /// Case-insensitive substring search over the store, newest first.
    pub fn fallback(
        &self,
        query: &str,
        pagination: Pagination,
    ) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let (items, total) = record_repo::search_fallback(
            &self.db,
            query,
            pagination.page_size,
            pagination.offset(),
        )?;
        Ok(SearchResponse {
            items,
            pagination: PageInfo::new(pagination, total),
            query: query.to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            source: ResultSource::Fallback,
        })
    }

    /// Loads records for engine ids, keeping the engine's order. Ids the
    /// store no longer has are dropped.
    fn hydrate(&self, ids: &[String]) -> Result<Vec<ArchiveRecord>, SearchError> {
        let numeric: Vec<i64> = ids
            .iter()
            .filter_map(|id| match id.parse() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!(id = %id, "Ignoring non-numeric document id");
                    None
                }
            })
            .collect();

        let mut by_id: HashMap<i64, ArchiveRecord> = record_repo::find_by_ids(&self.db, &numeric)?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        Ok(numeric.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}
