//! In-process search engine for offline use and tests.
//!
//! Documents live in a `HashMap` behind a `RwLock`. Matching is a
//! case-insensitive substring test; hits on the archive number and title
//! rank above hits elsewhere.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use async_trait::async_trait;

use super::document::SearchDocument;
use super::engine::{EngineHits, IndexSettings, IndexStats, SearchEngine, SearchRequest};
use super::SearchError;

pub struct MemoryEngine {
    docs: RwLock<HashMap<String, SearchDocument>>,
    settings: RwLock<Option<IndexSettings>>,
    healthy: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            settings: RwLock::new(None),
            healthy: AtomicBool::new(true),
        }
    }

    /// An unhealthy engine fails its probe and every call.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn document(&self, id: &str) -> Option<SearchDocument> {
        self.docs
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn settings(&self) -> Option<IndexSettings> {
        self.settings
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn ensure_up(&self) -> Result<(), SearchError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SearchError::Unavailable("memory engine marked unhealthy".to_string()))
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn score(doc: &SearchDocument, needle: &str) -> u32 {
    if needle.is_empty() {
        return 1;
    }
    let contains = |v: &str| v.to_lowercase().contains(needle);
    let mut score = 0;
    if doc.archive_no.to_lowercase() == needle {
        score += 4;
    } else if contains(&doc.archive_no) {
        score += 2;
    }
    if doc.title.as_deref().is_some_and(contains) {
        score += 2;
    }
    score += [
        &doc.fonds_no,
        &doc.responsible,
        &doc.doc_number,
        &doc.keywords,
        &doc.remarks,
    ]
    .into_iter()
    .filter(|v| v.as_deref().is_some_and(contains))
    .count() as u32;
    score
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    async fn health(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn upsert_documents(&self, documents: &[SearchDocument]) -> Result<(), SearchError> {
        self.ensure_up()?;
        let mut docs = self.docs.write().unwrap_or_else(|p| p.into_inner());
        for doc in documents {
            docs.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), SearchError> {
        self.ensure_up()?;
        self.docs
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(id);
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<EngineHits, SearchError> {
        self.ensure_up()?;
        let started = Instant::now();
        let needle = request.query.trim().to_lowercase();

        let docs = self.docs.read().unwrap_or_else(|p| p.into_inner());
        let mut hits: Vec<(u32, &SearchDocument)> = docs
            .values()
            .map(|doc| (score(doc, &needle), doc))
            .filter(|(score, _)| *score > 0)
            .collect();
        hits.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });

        let ids = hits
            .iter()
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .map(|(_, doc)| doc.id.clone())
            .collect();

        Ok(EngineHits {
            ids,
            estimated_total: hits.len() as u64,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn apply_settings(&self, settings: &IndexSettings) -> Result<(), SearchError> {
        self.ensure_up()?;
        *self.settings.write().unwrap_or_else(|p| p.into_inner()) = Some(settings.clone());
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats, SearchError> {
        self.ensure_up()?;
        Ok(IndexStats {
            documents: self.len() as u64,
            is_indexing: false,
        })
    }
}
