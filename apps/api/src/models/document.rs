use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Document lineage. Versions increase independently per (owner, doc_type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    SourceCv,
    GeneratedCv,
    CoverLetter,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::SourceCv => "source_cv",
            DocType::GeneratedCv => "generated_cv",
            DocType::CoverLetter => "cover_letter",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source_cv" | "cv" => Ok(DocType::SourceCv),
            "generated_cv" => Ok(DocType::GeneratedCv),
            "cover_letter" | "cover" => Ok(DocType::CoverLetter),
            other => Err(format!("unknown doc_type '{other}'")),
        }
    }
}

/// Metadata of a persisted document version. Content is fetched separately.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMeta {
    pub id: Uuid,
    pub user_id: Uuid,
    pub doc_type: DocType,
    pub version: i32,
    pub file_name: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl DocumentMeta {
    pub fn is_text(&self) -> bool {
        self.content_type.starts_with("text/")
    }
}

/// A document version together with its bytes.
#[derive(Debug, Clone)]
pub struct Document {
    pub meta: DocumentMeta,
    pub content: Vec<u8>,
}

/// Input for creating a new document version. The version number is assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub user_id: Uuid,
    pub doc_type: DocType,
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl NewDocument {
    pub fn text(user_id: Uuid, doc_type: DocType, file_name: String, text: String) -> Self {
        Self {
            user_id,
            doc_type,
            file_name,
            content_type: "text/plain".to_string(),
            content: text.into_bytes(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub doc_type: String,
    pub version: i32,
    pub file_name: String,
    pub content_type: String,
    pub s3_key: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for DocumentMeta {
    type Error = String;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(DocumentMeta {
            id: row.id,
            user_id: row.user_id,
            doc_type: row.doc_type.parse()?,
            version: row.version,
            file_name: row.file_name,
            content_type: row.content_type,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_accepts_short_names() {
        assert_eq!("cv".parse::<DocType>().unwrap(), DocType::SourceCv);
        assert_eq!("cover".parse::<DocType>().unwrap(), DocType::CoverLetter);
        assert!("resume".parse::<DocType>().is_err());
    }

    #[test]
    fn test_new_text_document_is_plain_text() {
        let doc = NewDocument::text(
            Uuid::new_v4(),
            DocType::CoverLetter,
            "cover.txt".to_string(),
            "Dear Hiring Manager".to_string(),
        );
        assert_eq!(doc.content_type, "text/plain");
        assert_eq!(doc.content, b"Dear Hiring Manager");
    }
}
