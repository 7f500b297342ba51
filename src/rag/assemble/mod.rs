
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error};

use crate::corpus::DiagnosticCodeRecord;

/// Code given to records that stand in for a failed retrieval or parse
pub const PLACEHOLDER_CODE: &str = "UNRESOLVED";

/// One document slot in a retrieval result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievedDocument {
    /// The `searchable_text` of a stored document returned for `query`
    Found { query: String, text: String },
    /// Retrieval for `query` failed before any text came back
    Failed { query: String, reason: String },
}

/// How `dedup_by_parent` treats records without a `parent_code`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingParentPolicy {
    /// Each record without a parent is its own group and is always kept
    #[default]
    Distinct,
    /// All records without a parent share one group; only the first is kept
    Collapse,
}

impl fmt::Display for MissingParentPolicy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distinct => write!(f, "distinct"),
            Self::Collapse => write!(f, "collapse"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ParentKey<'a> {
    Code(&'a str),
    Missing(usize),
    Unresolved(usize),
}

/// Record substituted for a document that could not be retrieved or parsed
#[inline]
pub fn placeholder_record(query: &str) -> DiagnosticCodeRecord {
    DiagnosticCodeRecord {
        code: PLACEHOLDER_CODE.to_string(),
        description: format!("Error retrieving documents for query: {}", query),
        synonyms: Vec::new(),
        parent_code: None,
        parent_description: None,
    }
}

/// Parse retrieved texts back into records, keeping one output per input.
///
/// Failed retrievals and unparseable texts become placeholder records so a single bad
/// document never removes its slot from the result.
#[inline]
pub fn parse_documents(documents: Vec<RetrievedDocument>) -> Vec<DiagnosticCodeRecord> {
    documents
        .into_iter()
        .map(|document| match document {
            RetrievedDocument::Found { query, text } => {
                DiagnosticCodeRecord::from_document_text(&text).unwrap_or_else(|e| {
                    error!("Failed to parse document retrieved for '{}': {}", query, e);
                    placeholder_record(&query)
                })
            }
            RetrievedDocument::Failed { query, reason } => {
                error!("Retrieval failed for query '{}': {}", query, reason);
                placeholder_record(&query)
            }
        })
        .collect()
}

/// Keep the first record seen for each parent code, preserving input order.
///
/// Placeholder records are always kept, whatever the policy.
#[inline]
pub fn dedup_by_parent(
    records: Vec<DiagnosticCodeRecord>,
    policy: MissingParentPolicy,
) -> Vec<DiagnosticCodeRecord> {
    let before = records.len();
    let kept: Vec<usize> = records
        .iter()
        .enumerate()
        .unique_by(|&(index, record)| record_key(record, index, policy))
        .map(|(index, _)| index)
        .collect();

    debug!(
        "Parent-code dedup kept {} of {} records ({} policy)",
        kept.len(),
        before,
        policy
    );

    let mut kept = kept.into_iter().peekable();
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| kept.next_if_eq(&index).map(|_| record))
        .collect()
}

/// Positions of the first occurrence of each parent key, ascending
#[inline]
pub fn dedup_indices(parent_codes: &[Option<&str>], policy: MissingParentPolicy) -> Vec<usize> {
    parent_codes
        .iter()
        .enumerate()
        .unique_by(|&(index, parent)| parent_key(*parent, index, policy))
        .map(|(index, _)| index)
        .collect()
}

// Each placeholder stands for its own failed query and never shares a group
fn record_key(
    record: &DiagnosticCodeRecord,
    index: usize,
    policy: MissingParentPolicy,
) -> ParentKey<'_> {
    if record.code == PLACEHOLDER_CODE {
        ParentKey::Unresolved(index)
    } else {
        parent_key(record.parent_code.as_deref(), index, policy)
    }
}

fn parent_key(parent: Option<&str>, index: usize, policy: MissingParentPolicy) -> ParentKey<'_> {
    match (parent, policy) {
        (Some(code), _) => ParentKey::Code(code),
        (None, MissingParentPolicy::Distinct) => ParentKey::Missing(index),
        (None, MissingParentPolicy::Collapse) => ParentKey::Missing(usize::MAX),
    }
}
