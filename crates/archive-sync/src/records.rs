//! Archive record model.
//!
//! A record is created as a *skeleton* (archive number + file pointer) by
//! ingestion and gains its descriptive metadata later through CSV
//! enrichment.

use serde::{Deserialize, Serialize};

/// Descriptive metadata columns that enrichment may write.
///
/// The variant list doubles as the whitelist of SQL column names, so a CSV
/// header can never reach the database as an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Title,
    FondsNo,
    Year,
    RetentionPeriod,
    Responsible,
    DocNumber,
    DocDate,
    SecurityLevel,
    Keywords,
    Remarks,
}

impl MetadataField {
    pub const ALL: [MetadataField; 10] = [
        MetadataField::Title,
        MetadataField::FondsNo,
        MetadataField::Year,
        MetadataField::RetentionPeriod,
        MetadataField::Responsible,
        MetadataField::DocNumber,
        MetadataField::DocDate,
        MetadataField::SecurityLevel,
        MetadataField::Keywords,
        MetadataField::Remarks,
    ];

    /// Column name in the `archive_records` table.
    pub fn column(&self) -> &'static str {
        match self {
            MetadataField::Title => "title",
            MetadataField::FondsNo => "fonds_no",
            MetadataField::Year => "year",
            MetadataField::RetentionPeriod => "retention_period",
            MetadataField::Responsible => "responsible",
            MetadataField::DocNumber => "doc_number",
            MetadataField::DocDate => "doc_date",
            MetadataField::SecurityLevel => "security_level",
            MetadataField::Keywords => "keywords",
            MetadataField::Remarks => "remarks",
        }
    }

    /// Maps a CSV header to a field. Matching ignores case, surrounding
    /// whitespace, and `-`/space vs `_`.
    pub fn from_header(header: &str) -> Option<Self> {
        let normalized = header.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "title" => Some(MetadataField::Title),
            "fonds_no" | "fonds" => Some(MetadataField::FondsNo),
            "year" => Some(MetadataField::Year),
            "retention_period" | "retention" => Some(MetadataField::RetentionPeriod),
            "responsible" | "responsible_party" => Some(MetadataField::Responsible),
            "doc_number" | "document_number" => Some(MetadataField::DocNumber),
            "doc_date" | "date" => Some(MetadataField::DocDate),
            "security_level" | "security" => Some(MetadataField::SecurityLevel),
            "keywords" => Some(MetadataField::Keywords),
            "remarks" | "notes" => Some(MetadataField::Remarks),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetadataField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// A single sparse field assignment.
pub type FieldUpdate = (MetadataField, String);

/// An archive record as stored in the relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    /// Surrogate id.
    pub id: i64,
    /// Business key: the unique archive number.
    pub archive_no: String,
    pub title: Option<String>,
    pub fonds_no: Option<String>,
    pub year: Option<String>,
    pub retention_period: Option<String>,
    pub responsible: Option<String>,
    pub doc_number: Option<String>,
    pub doc_date: Option<String>,
    pub security_level: Option<String>,
    pub keywords: Option<String>,
    pub remarks: Option<String>,
    /// Location of the stored PDF.
    pub file_path: String,
    pub file_size: u64,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ArchiveRecord {
    pub fn field(&self, field: MetadataField) -> Option<&str> {
        let value = match field {
            MetadataField::Title => &self.title,
            MetadataField::FondsNo => &self.fonds_no,
            MetadataField::Year => &self.year,
            MetadataField::RetentionPeriod => &self.retention_period,
            MetadataField::Responsible => &self.responsible,
            MetadataField::DocNumber => &self.doc_number,
            MetadataField::DocDate => &self.doc_date,
            MetadataField::SecurityLevel => &self.security_level,
            MetadataField::Keywords => &self.keywords,
            MetadataField::Remarks => &self.remarks,
        };
        value.as_deref()
    }

    /// True while no descriptive field has been written.
    pub fn is_skeleton(&self) -> bool {
        MetadataField::ALL
            .iter()
            .all(|f| self.field(*f).map(|v| v.trim().is_empty()).unwrap_or(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skeleton() -> ArchiveRecord {
        ArchiveRecord {
            id: 1,
            archive_no: "A-001".to_string(),
            title: None,
            fonds_no: None,
            year: None,
            retention_period: None,
            responsible: None,
            doc_number: None,
            doc_date: None,
            security_level: None,
            keywords: None,
            remarks: None,
            file_path: "/store/A-001.pdf".to_string(),
            file_size: 10,
            created_by: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_header_mapping() {
        assert_eq!(MetadataField::from_header("Title"), Some(MetadataField::Title));
        assert_eq!(
            MetadataField::from_header(" Fonds-No "),
            Some(MetadataField::FondsNo)
        );
        assert_eq!(
            MetadataField::from_header("retention period"),
            Some(MetadataField::RetentionPeriod)
        );
        assert_eq!(MetadataField::from_header("archive_no"), None);
        assert_eq!(MetadataField::from_header("unknown"), None);
    }

    #[test]
    fn test_columns_are_unique() {
        let mut columns: Vec<_> = MetadataField::ALL.iter().map(|f| f.column()).collect();
        columns.sort();
        columns.dedup();
        assert_eq!(columns.len(), MetadataField::ALL.len());
    }

    #[test]
    fn test_is_skeleton() {
        let mut record = skeleton();
        assert!(record.is_skeleton());

        record.remarks = Some("   ".to_string());
        assert!(record.is_skeleton());

        record.title = Some("Budget 2024".to_string());
        assert!(!record.is_skeleton());
        assert_eq!(record.field(MetadataField::Title), Some("Budget 2024"));
    }
}
