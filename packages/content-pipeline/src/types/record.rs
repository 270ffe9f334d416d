//! Extraction records - structured content pulled from a rendered page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One extracted (name, value) pair, in spec order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub value: String,
}

impl ExtractedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Structured content pulled from one rendered page.
///
/// Immutable after creation: regeneration replaces the whole record. The
/// content hash covers title, body and fields (not the timestamp), so two
/// extractions of identical markup with an identical spec compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Page title, empty when the page carried none.
    pub title: String,

    /// Primary text body, whitespace-normalized.
    pub body: String,

    /// Extracted fields in selector-spec order.
    pub fields: Vec<ExtractedField>,

    /// URL the markup was fetched from.
    pub source_url: String,

    /// When the extraction ran.
    pub extracted_at: DateTime<Utc>,

    /// SHA-256 over title, body and fields.
    pub content_hash: String,
}

impl ExtractionRecord {
    /// Create a record, computing the content hash.
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        fields: Vec<ExtractedField>,
    ) -> Self {
        let title = title.into();
        let body = body.into();
        let content_hash = Self::hash_content(&title, &body, &fields);

        Self {
            title,
            body,
            fields,
            source_url: source_url.into(),
            extracted_at: Utc::now(),
            content_hash,
        }
    }

    /// SHA-256 over the content-bearing parts of a record.
    ///
    /// Field separators are NUL bytes so concatenation cannot collide.
    pub fn hash_content(title: &str, body: &str, fields: &[ExtractedField]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update([0u8]);
        hasher.update(body.as_bytes());
        for field in fields {
            hasher.update([0u8]);
            hasher.update(field.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(field.value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Look up a field value by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Whether the body carries any content.
    pub fn has_content(&self) -> bool {
        !self.body.trim().is_empty()
    }

    /// Body length in characters.
    pub fn body_chars(&self) -> usize {
        self.body.chars().count()
    }
}
