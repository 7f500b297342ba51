// Corpus module
// Loads the JSON-lines file of ICD-10-CM records that the vector index is built from

#[cfg(test)]
mod tests;

pub mod document;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

use crate::{IcdError, Result};

pub use document::{IndexedDocument, RecordMetadata, build_document, build_documents};

/// One diagnostic code from the corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticCodeRecord {
    pub code: String,
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub parent_code: Option<String>,
    #[serde(default)]
    pub parent_description: Option<String>,
}

/// A non-empty corpus line: the raw JSON object plus its typed record
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusEntry {
    /// 1-based line number in the corpus file
    pub line: usize,
    /// Every key of the original object, including ones the record type ignores
    pub fields: Map<String, Value>,
    pub record: DiagnosticCodeRecord,
}

impl DiagnosticCodeRecord {
    /// Reconstruct a record from an indexed document's `searchable_text`.
    ///
    /// Applies the same field rules as loading, so anything the loader accepted parses
    /// back to the identical record.
    #[inline]
    pub fn from_document_text(text: &str) -> Result<Self> {
        parse_record(text)
            .map(|(_, record)| record)
            .map_err(|message| {
                IcdError::RecordParse(format!("{} (text: {})", message, truncate_for_log(text, 120)))
            })
    }
}

/// Read every non-empty line of `path` as a corpus record, in file order
#[inline]
pub fn load_corpus(path: &Path) -> Result<Vec<CorpusEntry>> {
    if !path.is_file() {
        return Err(IcdError::CorpusNotFound(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IcdError::CorpusNotFound(path.to_path_buf()),
        _ => IcdError::Io(e),
    })?;

    let mut entries = Vec::new();
    for (index, bytes) in BufReader::new(file).split(b'\n').enumerate() {
        let line_number = index + 1;
        let line = String::from_utf8(bytes?).map_err(|e| IcdError::MalformedRecord {
            line: line_number,
            message: format!("invalid UTF-8: {}", e),
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        entries.push(parse_line(trimmed, line_number)?);
    }

    info!("Loaded {} records from {}", entries.len(), path.display());
    Ok(entries)
}

/// Parse and validate a single corpus line
#[inline]
pub fn parse_line(line: &str, line_number: usize) -> Result<CorpusEntry> {
    let (fields, record) = parse_record(line).map_err(|message| IcdError::MalformedRecord {
        line: line_number,
        message,
    })?;

    debug!("Parsed corpus line {}: {}", line_number, record.code);

    Ok(CorpusEntry {
        line: line_number,
        fields,
        record,
    })
}

/// Field rules shared by corpus loading and document reconstruction
fn parse_record(
    text: &str,
) -> std::result::Result<(Map<String, Value>, DiagnosticCodeRecord), String> {
    let value: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {}", e))?;
    let Value::Object(fields) = value else {
        return Err("expected a JSON object".to_string());
    };

    let code = required_string(&fields, "code")?;
    let description = required_string(&fields, "description")?;
    let synonyms = optional_string_list(&fields, "synonyms")?;
    let parent_code = optional_string(&fields, "parent_code")?;
    let parent_description = optional_string(&fields, "parent_description")?;

    if parent_code.is_some() && parent_description.is_none() {
        return Err(format!(
            "record {} has a parent_code but no parent_description",
            code
        ));
    }

    let record = DiagnosticCodeRecord {
        code,
        description,
        synonyms: synonyms.unwrap_or_default(),
        parent_code,
        parent_description,
    };
    Ok((fields, record))
}

// `"synonyms": null` is legal corpus input
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn required_string(fields: &Map<String, Value>, key: &str) -> std::result::Result<String, String> {
    optional_string(fields, key)?.ok_or_else(|| format!("missing required field '{}'", key))
}

fn optional_string(
    fields: &Map<String, Value>,
    key: &str,
) -> std::result::Result<Option<String>, String> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(format!(
            "field '{}' must be a string, found {}",
            key,
            json_type_name(other)
        )),
    }
}

fn optional_string_list(
    fields: &Map<String, Value>,
    key: &str,
) -> std::result::Result<Option<Vec<String>>, String> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(format!(
                    "field '{}' must contain only strings, found {}",
                    key,
                    json_type_name(other)
                )),
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(format!(
            "field '{}' must be an array of strings, found {}",
            key,
            json_type_name(other)
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max_chars).collect();
        format!("{}...", prefix)
    }
}
