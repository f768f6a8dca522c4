use serde::{Deserialize, Serialize};

use crate::records::ArchiveRecord;

/// Projection of a record sent to the search engine. Keyed by the record's
/// surrogate id; never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub archive_no: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fonds_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub created_at: String,
}

impl SearchDocument {
    pub fn document_id(record_id: i64) -> String {
        record_id.to_string()
    }

    /// Values matched by free-text search.
    pub fn searchable_values(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.archive_no.as_str()).chain(
            [
                &self.title,
                &self.fonds_no,
                &self.responsible,
                &self.doc_number,
                &self.keywords,
                &self.remarks,
            ]
            .into_iter()
            .filter_map(|v| v.as_deref()),
        )
    }
}

impl From<&ArchiveRecord> for SearchDocument {
    fn from(record: &ArchiveRecord) -> Self {
        Self {
            id: Self::document_id(record.id),
            archive_no: record.archive_no.clone(),
            title: record.title.clone(),
            fonds_no: record.fonds_no.clone(),
            year: record.year.clone(),
            responsible: record.responsible.clone(),
            doc_number: record.doc_number.clone(),
            doc_date: record.doc_date.clone(),
            security_level: record.security_level.clone(),
            keywords: record.keywords.clone(),
            remarks: record.remarks.clone(),
            created_at: record.created_at.clone(),
        }
    }
}
