
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{EmbeddedDocument, IndexManifest, LanceIndex, VectorIndex};
use crate::corpus::{IndexedDocument, build_documents, load_corpus};
use crate::provider::{Embedder, ensure_dimension};
use crate::{IcdError, Result};

/// Embeds corpus documents and writes them to a persisted index.
///
/// A build either replaces the index at the target location completely or leaves it
/// untouched. Running two builders against the same location at once is not supported.
pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl IndexBuilder {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Load `corpus` and build an index from it at `storage_dir`.
    ///
    /// Corpus errors are returned before anything on disk is created or changed.
    #[inline]
    pub async fn build_from_corpus(&self, corpus: &Path, storage_dir: &Path) -> Result<IndexManifest> {
        let entries = load_corpus(corpus)?;
        let documents = build_documents(&entries);
        self.build(&documents, storage_dir).await
    }

    /// Build an index from `documents`, replacing whatever is at `storage_dir`
    #[inline]
    pub async fn build(
        &self,
        documents: &[IndexedDocument],
        storage_dir: &Path,
    ) -> Result<IndexManifest> {
        info!(
            "Building index of {} documents at {}",
            documents.len(),
            storage_dir.display()
        );
        if documents.is_empty() {
            warn!("Building an index with no documents");
        }

        if let Some(parent) = storage_dir
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                IcdError::StorageWrite(format!(
                    "Failed to create parent directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let staging = sibling_path(storage_dir, "staging")?;
        debug!("Staging index at {}", staging.display());

        let result = match self.build_staged(documents, &staging).await {
            Ok(manifest) => swap_into_place(&staging, storage_dir).map(|()| manifest),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!("Index build failed: {}", e);
            remove_staging(&staging);
        } else {
            info!("Index build complete at {}", storage_dir.display());
        }

        result
    }

    /// Embed `documents` in batches and append them to `index`, returning how many were
    /// stored
    #[inline]
    pub async fn populate(
        &self,
        index: &mut dyn VectorIndex,
        documents: &[IndexedDocument],
    ) -> Result<usize> {
        let expected = self.embedder.dimension();
        if index.dimension() != expected {
            return Err(IcdError::DimensionMismatch {
                expected,
                actual: index.dimension(),
            });
        }

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(documents.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        for batch in documents.chunks(self.batch_size) {
            let texts: Vec<String> = batch
                .iter()
                .map(|doc| doc.searchable_text.clone())
                .collect();

            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(IcdError::EmbeddingProvider(format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            for vector in &vectors {
                ensure_dimension(expected, vector)?;
            }

            let embedded: Vec<EmbeddedDocument> = batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(document, vector)| EmbeddedDocument { document, vector })
                .collect();

            index.insert(&embedded).await?;

            bar.inc(batch.len() as u64);
            if let Some(code) = batch.last().and_then(|doc| doc.metadata.code.as_deref()) {
                bar.set_message(code.to_string());
            }
        }

        bar.finish_and_clear();
        debug!("Stored {} documents", documents.len());
        Ok(documents.len())
    }

    async fn build_staged(
        &self,
        documents: &[IndexedDocument],
        staging: &Path,
    ) -> Result<IndexManifest> {
        let mut index = LanceIndex::create(staging, self.embedder.dimension()).await?;
        let record_count = self.populate(&mut index, documents).await?;

        // Written last: an index directory without a manifest never opens
        let manifest =
            IndexManifest::new(self.embedder.model(), self.embedder.dimension(), record_count);
        manifest.write(staging)?;
        Ok(manifest)
    }
}

/// `<dir>.<label>-<uuid>` next to `storage_dir`
fn sibling_path(storage_dir: &Path, label: &str) -> Result<PathBuf> {
    let name = storage_dir.file_name().ok_or_else(|| {
        IcdError::StorageWrite(format!(
            "Index location {} has no directory name",
            storage_dir.display()
        ))
    })?;

    Ok(storage_dir.with_file_name(format!(
        "{}.{}-{}",
        name.to_string_lossy(),
        label,
        uuid::Uuid::new_v4()
    )))
}

fn swap_into_place(staging: &Path, storage_dir: &Path) -> Result<()> {
    if !storage_dir.exists() {
        return std::fs::rename(staging, storage_dir).map_err(|e| {
            IcdError::StorageWrite(format!(
                "Failed to move index into {}: {}",
                storage_dir.display(),
                e
            ))
        });
    }

    let previous = sibling_path(storage_dir, "previous")?;
    std::fs::rename(storage_dir, &previous).map_err(|e| {
        IcdError::StorageWrite(format!(
            "Failed to move existing index at {} aside: {}",
            storage_dir.display(),
            e
        ))
    })?;

    if let Err(e) = std::fs::rename(staging, storage_dir) {
        if let Err(restore) = std::fs::rename(&previous, storage_dir) {
            error!(
                "Failed to restore previous index from {}: {}",
                previous.display(),
                restore
            );
        }
        return Err(IcdError::StorageWrite(format!(
            "Failed to move index into {}: {}",
            storage_dir.display(),
            e
        )));
    }

    if let Err(e) = std::fs::remove_dir_all(&previous) {
        warn!(
            "Failed to remove previous index at {}: {}",
            previous.display(),
            e
        );
    }

    Ok(())
}

fn remove_staging(staging: &Path) {
    if staging.exists() {
        if let Err(e) = std::fs::remove_dir_all(staging) {
            warn!(
                "Failed to remove staging directory {}: {}",
                staging.display(),
                e
            );
        }
    }
}
