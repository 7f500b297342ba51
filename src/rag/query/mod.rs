
use fancy_regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Matches header lines such as "ICD-10 codes:" that introduce a list of queries
static HEADER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)icd.*10.*code").expect("valid regex"));

/// Ordered, normalized query strings derived from one raw input block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryBatch {
    queries: Vec<String>,
}

impl QueryBatch {
    #[inline]
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    #[inline]
    pub fn into_queries(self) -> Vec<String> {
        self.queries
    }
}

impl IntoIterator for QueryBatch {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.queries.into_iter()
    }
}

/// Split a raw block into one query per line.
///
/// Lines are trimmed; empty lines and header lines (anything matching `icd.*10.*code`,
/// case-insensitively) are dropped. Input order is preserved.
#[inline]
pub fn normalize_query(raw: &str) -> QueryBatch {
    let queries: Vec<String> = raw
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_header(line))
        .map(str::to_string)
        .collect();

    debug!("Normalized input into {} queries", queries.len());
    QueryBatch { queries }
}

fn is_header(line: &str) -> bool {
    // A backtrack-limit error counts as no match
    HEADER_PATTERN.is_match(line).unwrap_or(false)
}
