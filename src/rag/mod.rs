// RAG module
// Request path: normalize the query block, retrieve per line, assemble the records


pub mod assemble;
pub mod query;

use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

use crate::corpus::DiagnosticCodeRecord;
use crate::index::Retriever;
use crate::{IcdError, Result};

pub use assemble::{
    MissingParentPolicy, PLACEHOLDER_CODE, RetrievedDocument, dedup_by_parent, dedup_indices,
    parse_documents, placeholder_record,
};
pub use query::{QueryBatch, normalize_query};

/// Turns a block of candidate code lines into a deduplicated list of corpus records
pub struct RagService {
    retriever: Arc<Retriever>,
    policy: MissingParentPolicy,
}

impl RagService {
    #[inline]
    pub fn new(retriever: Arc<Retriever>, policy: MissingParentPolicy) -> Self {
        Self { retriever, policy }
    }

    #[inline]
    pub fn policy(&self) -> MissingParentPolicy {
        self.policy
    }

    /// Retrieve records for every query line in `query_text`.
    ///
    /// A query whose retrieval fails contributes a placeholder record instead of failing
    /// the whole request.
    #[inline]
    pub async fn retrieve_codes(&self, query_text: &str) -> Result<Vec<DiagnosticCodeRecord>> {
        if query_text.trim().is_empty() {
            return Err(IcdError::InvalidRequest(
                "Provided 'query_text' cannot be empty.".to_string(),
            ));
        }

        let batch = normalize_query(query_text);
        info!("Retrieving documents for {} queries", batch.len());

        let documents = self.retrieve_batch(batch).await;
        let records = parse_documents(documents);
        Ok(dedup_by_parent(records, self.policy))
    }

    /// Run every query concurrently; results keep query order
    #[inline]
    pub async fn retrieve_batch(&self, batch: QueryBatch) -> Vec<RetrievedDocument> {
        let lookups = batch.into_iter().map(|query| async move {
            match self.retriever.retrieve(&query).await {
                Ok(texts) => texts
                    .into_iter()
                    .map(|text| RetrievedDocument::Found {
                        query: query.clone(),
                        text,
                    })
                    .collect::<Vec<_>>(),
                Err(e) => {
                    error!("Error retrieving documents for query: {}: {}", query, e);
                    vec![RetrievedDocument::Failed {
                        reason: e.to_string(),
                        query,
                    }]
                }
            }
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }
}
