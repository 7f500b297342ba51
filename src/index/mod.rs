// Index module
// Vector storage for embedded corpus documents and nearest-neighbour lookup over it


pub mod builder;
pub mod lance;
pub mod memory;
pub mod retriever;

use async_trait::async_trait;

use crate::Result;
use crate::corpus::IndexedDocument;

pub use builder::IndexBuilder;
pub use lance::{IndexManifest, LanceIndex};
pub use memory::FlatIndex;
pub use retriever::Retriever;

/// A document paired with the embedding of its `searchable_text`
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedDocument {
    pub document: IndexedDocument,
    pub vector: Vec<f32>,
}

/// One nearest-neighbour result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub searchable_text: String,
    /// Squared L2 distance to the query vector
    pub distance: f32,
    /// Insertion ordinal, used to order hits at equal distance
    pub position: u64,
}

/// Storage engine for embedded documents.
///
/// Engines compare vectors by L2 distance and return hits nearest first. Hits at the same
/// distance come back in insertion order.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Length every stored and queried vector must have
    fn dimension(&self) -> usize;

    /// Append documents, in order, after everything already stored
    async fn insert(&mut self, documents: &[EmbeddedDocument]) -> Result<()>;

    /// Return at most `limit` hits for `vector`
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;

    async fn count(&self) -> Result<usize>;
}

/// Order hits nearest first, breaking distance ties by insertion order
#[inline]
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.position.cmp(&b.position))
    });
}

/// Squared euclidean distance between two equal-length vectors
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
