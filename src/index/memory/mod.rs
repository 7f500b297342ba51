
use async_trait::async_trait;
use tracing::debug;

use super::{EmbeddedDocument, SearchHit, VectorIndex, sort_hits, squared_l2};
use crate::Result;
use crate::provider::ensure_dimension;

/// Exact in-memory index: every search scans all stored vectors
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    dimension: usize,
    entries: Vec<(String, Vec<f32>)>,
}

impl FlatIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    async fn insert(&mut self, documents: &[EmbeddedDocument]) -> Result<()> {
        for doc in documents {
            ensure_dimension(self.dimension, &doc.vector)?;
        }

        self.entries.extend(
            documents
                .iter()
                .map(|doc| (doc.document.searchable_text.clone(), doc.vector.clone())),
        );
        debug!("Flat index now holds {} documents", self.entries.len());
        Ok(())
    }

    #[inline]
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        ensure_dimension(self.dimension, vector)?;

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, (text, stored))| SearchHit {
                searchable_text: text.clone(),
                distance: squared_l2(stored, vector),
                position: position as u64,
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    #[inline]
    async fn count(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}
