use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IcdError>;

#[derive(Error, Debug)]
pub enum IcdError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corpus file not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("Malformed record on line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    #[error("Failed to write index storage: {0}")]
    StorageWrite(String),

    #[error("Index not found or invalid at {}: {reason}", .path.display())]
    IndexNotFound { path: PathBuf, reason: String },

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Failed to parse retrieved record: {0}")]
    RecordParse(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl IcdError {
    /// Whether the error originated at the embedding/completion provider
    #[inline]
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::EmbeddingProvider(_))
    }
}

pub mod commands;
pub mod config;
pub mod corpus;
pub mod index;
pub mod mcp;
pub mod notes;
pub mod provider;
pub mod rag;
