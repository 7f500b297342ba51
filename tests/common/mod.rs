//! Helpers shared by the integration tests

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use icd_rag::config::{Config, IndexConfig};
use icd_rag::provider::{ChatCompleter, ChatMessage, Embedder};
use icd_rag::{IcdError, Result};
use std::path::{Path, PathBuf};

/// Embeds text as keyword occurrence counts, so nearest neighbours are predictable
pub struct KeywordEmbedder {
    keywords: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model(&self) -> &str {
        "keyword-test"
    }

    fn dimension(&self) -> usize {
        self.keywords.len()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|text| text.contains("PROVIDER-DOWN")) {
            return Err(IcdError::EmbeddingProvider(
                "connection refused by upstream".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| {
                self.keywords
                    .iter()
                    .map(|keyword| text.matches(keyword.as_str()).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Replies with the last user message, upper-cased
pub struct ShoutingCompleter;

#[async_trait]
impl ChatCompleter for ShoutingCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        Ok(messages
            .last()
            .map(|message| message.content.to_uppercase())
            .unwrap_or_default())
    }
}

/// Three records where the first two share parent `A01`
pub const PARENT_CORPUS: [&str; 3] = [
    r#"{"code":"A01.1","description":"Paratyphoid fever A","synonyms":["Paratyphoid A"],"parent_code":"A01","parent_description":"Typhoid and paratyphoid fevers"}"#,
    r#"{"code":"A01.2","description":"Paratyphoid fever B","synonyms":[],"parent_code":"A01","parent_description":"Typhoid and paratyphoid fevers"}"#,
    r#"{"code":"B05.3","description":"Measles complicated by otitis media","parent_code":"B05","parent_description":"Measles"}"#,
];

pub const PARENT_KEYWORDS: [&str; 3] = ["A01.1", "A01.2", "B05.3"];

pub fn write_corpus(dir: &Path, lines: &[&str]) -> PathBuf {
    let path = dir.join("icd_codes_rag.jsonl");
    std::fs::write(&path, lines.join("\n")).expect("should write corpus");
    path
}

/// Default configuration rooted at `dir`, with the index at `dir/storage`
pub fn config_in(dir: &Path) -> Config {
    Config {
        base_dir: dir.to_path_buf(),
        index: IndexConfig {
            corpus_path: None,
            storage_dir: Some(PathBuf::from("storage")),
        },
        ..Config::default()
    }
}
