
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{EmbeddedDocument, SearchHit, VectorIndex, sort_hits};
use crate::provider::ensure_dimension;
use crate::{IcdError, Result};

pub const TABLE_NAME: &str = "diagnostic_codes";
pub const MANIFEST_FILE: &str = "index.json";
pub const FORMAT_VERSION: u32 = 1;

/// Description of a persisted index, written next to the LanceDB data once a build
/// has fully succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimension: usize,
    pub record_count: usize,
    pub built_at: DateTime<Utc>,
}

impl IndexManifest {
    #[inline]
    pub fn new(embedding_model: &str, dimension: usize, record_count: usize) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            embedding_model: embedding_model.to_string(),
            dimension,
            record_count,
            built_at: Utc::now(),
        }
    }

    #[inline]
    pub fn path(storage_dir: &Path) -> PathBuf {
        storage_dir.join(MANIFEST_FILE)
    }

    /// Read the manifest of the index stored in `storage_dir`
    #[inline]
    pub fn read(storage_dir: &Path) -> Result<Self> {
        let path = Self::path(storage_dir);
        let not_found = |reason: String| IcdError::IndexNotFound {
            path: storage_dir.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| not_found(format!("cannot read {}: {}", MANIFEST_FILE, e)))?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| not_found(format!("invalid {}: {}", MANIFEST_FILE, e)))?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(not_found(format!(
                "unsupported index format version {} (expected {})",
                manifest.format_version, FORMAT_VERSION
            )));
        }

        Ok(manifest)
    }

    #[inline]
    pub fn write(&self, storage_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| IcdError::StorageWrite(format!("Failed to serialize manifest: {}", e)))?;
        let path = Self::path(storage_dir);
        std::fs::write(&path, content).map_err(|e| {
            IcdError::StorageWrite(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}

/// LanceDB-backed index of diagnostic code documents
pub struct LanceIndex {
    connection: Connection,
    table: Table,
    storage_dir: PathBuf,
    dimension: usize,
    next_position: u64,
    manifest: Option<IndexManifest>,
}

impl std::fmt::Debug for LanceIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceIndex")
            .field("storage_dir", &self.storage_dir)
            .field("dimension", &self.dimension)
            .field("next_position", &self.next_position)
            .finish_non_exhaustive()
    }
}

impl LanceIndex {
    /// Create an empty index in `storage_dir`, which must not already hold one
    #[inline]
    pub async fn create(storage_dir: &Path, dimension: usize) -> Result<Self> {
        debug!("Creating LanceDB index at {}", storage_dir.display());

        std::fs::create_dir_all(storage_dir).map_err(|e| {
            IcdError::StorageWrite(format!(
                "Failed to create index directory {}: {}",
                storage_dir.display(),
                e
            ))
        })?;

        let connection = lancedb::connect(&database_uri(storage_dir))
            .execute()
            .await
            .map_err(|e| IcdError::StorageWrite(format!("Failed to connect to LanceDB: {}", e)))?;

        let table = connection
            .create_empty_table(TABLE_NAME, create_schema(dimension))
            .execute()
            .await
            .map_err(|e| IcdError::StorageWrite(format!("Failed to create table: {}", e)))?;

        info!(
            "Created table {} with {} dimensions at {}",
            TABLE_NAME,
            dimension,
            storage_dir.display()
        );

        Ok(Self {
            connection,
            table,
            storage_dir: storage_dir.to_path_buf(),
            dimension,
            next_position: 0,
            manifest: None,
        })
    }

    /// Open a fully built index. Anything missing or unreadable is `IndexNotFound`.
    #[inline]
    pub async fn open(storage_dir: &Path) -> Result<Self> {
        let not_found = |reason: String| IcdError::IndexNotFound {
            path: storage_dir.to_path_buf(),
            reason,
        };

        if !storage_dir.is_dir() {
            return Err(not_found("directory does not exist".to_string()));
        }

        let manifest = IndexManifest::read(storage_dir)?;

        let connection = lancedb::connect(&database_uri(storage_dir))
            .execute()
            .await
            .map_err(|e| not_found(format!("failed to connect to LanceDB: {}", e)))?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| not_found(format!("failed to list tables: {}", e)))?;
        if !table_names.iter().any(|name| name == TABLE_NAME) {
            return Err(not_found(format!("table {} is missing", TABLE_NAME)));
        }

        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| not_found(format!("failed to open table: {}", e)))?;

        let stored_dimension = detect_vector_dimension(&table)
            .await
            .map_err(|e| not_found(e.to_string()))?;
        if stored_dimension != manifest.dimension {
            return Err(not_found(format!(
                "manifest dimension {} does not match stored vectors of dimension {}",
                manifest.dimension, stored_dimension
            )));
        }

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| not_found(format!("failed to count rows: {}", e)))?;

        info!(
            "Opened index at {} ({} records, model {})",
            storage_dir.display(),
            rows,
            manifest.embedding_model
        );

        Ok(Self {
            connection,
            table,
            storage_dir: storage_dir.to_path_buf(),
            dimension: manifest.dimension,
            next_position: rows as u64,
            manifest: Some(manifest),
        })
    }

    /// The manifest this index was opened with; `None` for an index still being built
    #[inline]
    pub fn manifest(&self) -> Option<&IndexManifest> {
        self.manifest.as_ref()
    }

    #[inline]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    #[inline]
    pub async fn table_names(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| IcdError::Index(format!("Failed to list tables: {}", e)))
    }

    async fn nearest(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        debug!("Searching {} with limit {}", TABLE_NAME, limit);

        let mut results = self
            .table
            .vector_search(vector)
            .map_err(|e| IcdError::Index(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(limit)
            .execute()
            .await
            .map_err(|e| IcdError::Index(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| IcdError::Index(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(parse_search_batch(&batch)?);
        }
        Ok(hits)
    }

    fn create_record_batch(&self, documents: &[EmbeddedDocument]) -> Result<RecordBatch> {
        let len = documents.len();

        let mut ids = Vec::with_capacity(len);
        let mut positions = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);
        let mut texts = Vec::with_capacity(len);
        let mut codes = Vec::with_capacity(len);
        let mut descriptions = Vec::with_capacity(len);
        let mut synonyms = Vec::with_capacity(len);
        let mut parent_codes = Vec::with_capacity(len);
        let mut parent_descriptions = Vec::with_capacity(len);

        for (offset, doc) in documents.iter().enumerate() {
            let metadata = &doc.document.metadata;
            ids.push(uuid::Uuid::new_v4().to_string());
            positions.push(self.next_position + offset as u64);
            flat_values.extend_from_slice(&doc.vector);
            texts.push(doc.document.searchable_text.as_str());
            codes.push(metadata.code.as_deref());
            descriptions.push(metadata.description.as_deref());
            synonyms.push(
                metadata
                    .synonyms
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| {
                        IcdError::StorageWrite(format!("Failed to encode synonyms: {}", e))
                    })?,
            );
            parent_codes.push(metadata.parent_code.as_deref());
            parent_descriptions.push(metadata.parent_description.as_deref());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| IcdError::StorageWrite(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(UInt64Array::from(positions)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(codes)),
            Arc::new(StringArray::from(descriptions)),
            Arc::new(StringArray::from(synonyms)),
            Arc::new(StringArray::from(parent_codes)),
            Arc::new(StringArray::from(parent_descriptions)),
        ];

        RecordBatch::try_new(create_schema(self.dimension), arrays)
            .map_err(|e| IcdError::StorageWrite(format!("Failed to create record batch: {}", e)))
    }
}

#[async_trait]
impl VectorIndex for LanceIndex {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    async fn insert(&mut self, documents: &[EmbeddedDocument]) -> Result<()> {
        if documents.is_empty() {
            debug!("No documents to store");
            return Ok(());
        }

        for doc in documents {
            ensure_dimension(self.dimension, &doc.vector)?;
        }

        let record_batch = self.create_record_batch(documents)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| IcdError::StorageWrite(format!("Failed to insert documents: {}", e)))?;

        self.next_position += documents.len() as u64;
        debug!("Stored {} documents", documents.len());
        Ok(())
    }

    /// Nearest `limit` rows. The engine may cut a run of equal distances anywhere, so the
    /// fetch widens until the row after the cutoff is strictly farther; ties are then
    /// settled by position.
    #[inline]
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        ensure_dimension(self.dimension, vector)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut fetch = limit.saturating_add(1);
        loop {
            let mut hits = self.nearest(vector, fetch).await?;
            sort_hits(&mut hits);

            // Rows past the fetch are no nearer than the last one returned
            let settled = hits.len() < fetch
                || hits[hits.len() - 1].distance > hits[limit - 1].distance;
            if settled {
                hits.truncate(limit);
                return Ok(hits);
            }

            fetch = fetch.saturating_mul(2);
            debug!("Distance tie at the top-{} cutoff, widening to {} rows", limit, fetch);
        }
    }

    #[inline]
    async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| IcdError::Index(format!("Failed to count rows: {}", e)))
    }
}

fn database_uri(storage_dir: &Path) -> String {
    format!("file://{}", storage_dir.display())
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("position", DataType::UInt64, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("searchable_text", DataType::Utf8, false),
        Field::new("code", DataType::Utf8, true),
        Field::new("description", DataType::Utf8, true),
        // JSON-encoded list, null when the record had no synonyms field
        Field::new("synonyms", DataType::Utf8, true),
        Field::new("parent_code", DataType::Utf8, true),
        Field::new("parent_description", DataType::Utf8, true),
    ]))
}

async fn detect_vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| IcdError::Index(format!("Failed to get table schema: {}", e)))?;

    schema
        .fields()
        .iter()
        .find(|field| field.name() == "vector")
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
        .ok_or_else(|| IcdError::Index("Could not determine vector dimension".to_string()))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let texts = batch
        .column_by_name("searchable_text")
        .ok_or_else(|| IcdError::Index("Missing searchable_text column".to_string()))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| IcdError::Index("Invalid searchable_text column type".to_string()))?;

    let positions = batch
        .column_by_name("position")
        .ok_or_else(|| IcdError::Index("Missing position column".to_string()))?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| IcdError::Index("Invalid position column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    Ok((0..batch.num_rows())
        .map(|row| SearchHit {
            searchable_text: texts.value(row).to_string(),
            distance: distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) }),
            position: positions.value(row),
        })
        .collect())
}
