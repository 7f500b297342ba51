// In-process providers for unit tests

use async_trait::async_trait;
use std::sync::Mutex;

use super::{ChatCompleter, ChatMessage, Embedder};
use crate::{IcdError, Result};

/// Embeds text as keyword counts: component `i` is how often `keywords[i]` occurs.
/// Any text containing a failure marker makes the whole batch fail.
#[derive(Debug, Default)]
pub(crate) struct KeywordEmbedder {
    keywords: Vec<String>,
    fail_markers: Vec<String>,
    calls: Mutex<usize>,
}

impl KeywordEmbedder {
    pub(crate) fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn failing_on(mut self, marker: &str) -> Self {
        self.fail_markers.push(marker.to_string());
        self
    }

    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock().expect("lock poisoned")
    }

    pub(crate) fn vector_for(&self, text: &str) -> Vec<f32> {
        self.keywords
            .iter()
            .map(|keyword| text.matches(keyword.as_str()).count() as f32)
            .collect()
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
        *self.calls.lock().expect("lock poisoned") += 1;

        if let Some(marker) = self
            .fail_markers
            .iter()
            .find(|marker| texts.iter().any(|text| text.contains(marker.as_str())))
        {
            return Err(IcdError::EmbeddingProvider(format!(
                "upstream rejected input containing {}",
                marker
            )));
        }

        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}

/// Returns vectors of a fixed, wrong length
#[derive(Debug)]
pub(crate) struct ShortEmbedder {
    pub(crate) claimed: usize,
    pub(crate) actual: usize,
}

#[async_trait]
impl Embedder for ShortEmbedder {
    fn model(&self) -> &str {
        "short-test"
    }

    fn dimension(&self) -> usize {
        self.claimed
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.5; self.actual]).collect())
    }
}

/// Replies with a fixed answer and records every conversation it was sent
#[derive(Debug)]
pub(crate) struct ScriptedCompleter {
    reply: std::result::Result<String, String>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompleter {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn conversations(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ChatCompleter for ScriptedCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.seen
            .lock()
            .expect("lock poisoned")
            .push(messages.to_vec());

        self.reply
            .clone()
            .map_err(IcdError::EmbeddingProvider)
    }
}
