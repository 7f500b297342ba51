#[cfg(test)]
mod tests;

use std::sync::Arc;
use tracing::debug;

use super::{LanceIndex, VectorIndex};
use crate::config::Config;
use crate::provider::Embedder;
use crate::{IcdError, Result};

pub const DEFAULT_TOP_K: usize = 1;

/// Answers text queries with the nearest stored documents.
///
/// Holds no mutable state; share one behind an `Arc` across requests.
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    #[inline]
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k: top_k.max(1),
        }
    }

    /// Open the persisted index named by `config` for querying with `embedder`.
    ///
    /// The index must have been built with the same embedding model and dimension;
    /// vectors from another model are not comparable.
    #[inline]
    pub async fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let index = LanceIndex::open(&config.storage_path()).await?;

        if let Some(manifest) = index.manifest() {
            if manifest.embedding_model != embedder.model() {
                return Err(IcdError::Config(format!(
                    "Index was built with embedding model '{}' but '{}' is configured; rebuild the index",
                    manifest.embedding_model,
                    embedder.model()
                )));
            }
            if manifest.dimension != embedder.dimension() {
                return Err(IcdError::Config(format!(
                    "Index has {} dimensions but the configured embedder produces {}; rebuild the index",
                    manifest.dimension,
                    embedder.dimension()
                )));
            }
        }

        Ok(Self::new(
            Arc::new(index),
            embedder,
            config.retrieval.top_k,
        ))
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    #[inline]
    pub async fn document_count(&self) -> Result<usize> {
        self.index.count().await
    }

    /// The `searchable_text` of the `top_k` nearest documents, nearest first
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<String>> {
        debug!("Retrieving top {} documents for query: {}", self.top_k, query);

        let vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&vector, self.top_k).await?;

        debug!("Query matched {} documents", hits.len());
        Ok(hits.into_iter().map(|hit| hit.searchable_text).collect())
    }
}
