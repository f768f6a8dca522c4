//! Search index synchronisation and the search read path.

pub mod document;
pub mod engine;
pub mod error;
pub mod memory;
pub mod meili;
pub mod queue;
pub mod router;
pub mod sync;

pub use document::SearchDocument;
pub use engine::{EngineHits, IndexSettings, IndexStats, SearchEngine, SearchRequest};
pub use error::SearchError;
pub use memory::MemoryEngine;
pub use meili::MeiliEngine;
pub use queue::{IndexFailure, IndexQueue};
pub use router::{PageInfo, Pagination, QueryRouter, ResultSource, SearchResponse};
pub use sync::{BatchIndexReport, IndexOutcome, IndexSynchronizer, RetryPolicy};
