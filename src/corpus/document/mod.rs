
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CorpusEntry;

/// The unit written into the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Canonical JSON of the whole raw record. This is both the embedded text and the
    /// payload handed back on retrieval.
    pub searchable_text: String,
    pub metadata: RecordMetadata,
}

/// The five declared record fields. `None` marks a field absent from the raw record
/// and serializes as `null` rather than being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub code: Option<String>,
    pub description: Option<String>,
    pub synonyms: Option<Vec<String>>,
    pub parent_code: Option<String>,
    pub parent_description: Option<String>,
}

/// Convert a loaded corpus entry into an indexable document
#[inline]
pub fn build_document(entry: &CorpusEntry) -> IndexedDocument {
    // Compact JSON, key order fixed by serde_json::Map
    let searchable_text = Value::Object(entry.fields.clone()).to_string();

    let metadata = RecordMetadata {
        code: Some(entry.record.code.clone()),
        description: Some(entry.record.description.clone()),
        synonyms: entry
            .fields
            .get("synonyms")
            .filter(|v| !v.is_null())
            .map(|_| entry.record.synonyms.clone()),
        parent_code: entry.record.parent_code.clone(),
        parent_description: entry.record.parent_description.clone(),
    };

    IndexedDocument {
        searchable_text,
        metadata,
    }
}

#[inline]
pub fn build_documents(entries: &[CorpusEntry]) -> Vec<IndexedDocument> {
    entries.iter().map(build_document).collect()
}
