use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode search engine response: {0}")]
    Decode(String),

    #[error("Search engine unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl SearchError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SearchError::Status { status, .. } => matches!(*status, 408 | 429) || *status >= 500,
            SearchError::Unavailable(_) => true,
            SearchError::Decode(_) | SearchError::Database(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |s| SearchError::Status {
            status: s,
            body: String::new(),
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(408).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(SearchError::Unavailable("down".into()).is_retryable());
        assert!(!SearchError::Decode("bad json".into()).is_retryable());
    }
}
