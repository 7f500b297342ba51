use super::*;
use crate::corpus::{IndexedDocument, RecordMetadata};
use crate::index::{EmbeddedDocument, FlatIndex, IndexBuilder};
use crate::provider::fake::KeywordEmbedder;
use tempfile::TempDir;

const KEYWORDS: [&str; 3] = ["diabetes", "hypertension", "asthma"];

fn document(text: &str) -> IndexedDocument {
    IndexedDocument {
        searchable_text: text.to_string(),
        metadata: RecordMetadata {
            code: None,
            description: None,
            synonyms: None,
            parent_code: None,
            parent_description: None,
        },
    }
}

async fn flat_retriever(top_k: usize) -> Retriever {
    let embedder = Arc::new(KeywordEmbedder::new(&KEYWORDS));
    let mut index = FlatIndex::new(KEYWORDS.len());
    let texts = [
        "type 2 diabetes",
        "essential hypertension",
        "asthma",
        "hypertension with diabetes",
    ];
    let documents: Vec<EmbeddedDocument> = texts
        .iter()
        .map(|text| EmbeddedDocument {
            document: document(text),
            vector: embedder.vector_for(text),
        })
        .collect();
    index.insert(&documents).await.expect("insert should succeed");

    Retriever::new(Arc::new(index), embedder, top_k)
}

#[tokio::test]
async fn default_top_k_returns_single_nearest() {
    let retriever = flat_retriever(DEFAULT_TOP_K).await;

    let texts = retriever
        .retrieve("asthma exacerbation")
        .await
        .expect("retrieve should succeed");

    assert_eq!(texts, vec!["asthma".to_string()]);
}

#[tokio::test]
async fn top_k_returns_nearest_first() {
    let retriever = flat_retriever(3).await;

    let texts = retriever
        .retrieve("hypertension")
        .await
        .expect("retrieve should succeed");

    assert_eq!(texts.len(), 3);
    assert_eq!(texts[0], "essential hypertension");
}

#[tokio::test]
async fn repeated_queries_are_deterministic() {
    let retriever = flat_retriever(4).await;

    let first = retriever
        .retrieve("diabetes and hypertension")
        .await
        .expect("retrieve should succeed");
    let second = retriever
        .retrieve("diabetes and hypertension")
        .await
        .expect("retrieve should succeed");

    assert_eq!(first, second);
    assert_eq!(first[0], "hypertension with diabetes");
}

#[tokio::test]
async fn zero_top_k_is_raised_to_one() {
    let retriever = flat_retriever(0).await;

    assert_eq!(retriever.top_k(), 1);
    assert_eq!(retriever.document_count().await.expect("count"), 4);
}

#[tokio::test]
async fn embedding_failure_propagates() {
    let embedder = Arc::new(KeywordEmbedder::new(&KEYWORDS).failing_on("boom"));
    let retriever = Retriever::new(Arc::new(FlatIndex::new(KEYWORDS.len())), embedder, 1);

    let result = retriever.retrieve("boom").await;

    assert!(matches!(result, Err(IcdError::EmbeddingProvider(_))));
}

fn config_for(dir: &TempDir) -> Config {
    Config {
        base_dir: dir.path().to_path_buf(),
        ..Config::default()
    }
}

#[tokio::test]
async fn open_requires_built_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&temp_dir);

    let result = Retriever::open(&config, Arc::new(KeywordEmbedder::new(&KEYWORDS))).await;

    assert!(matches!(result, Err(IcdError::IndexNotFound { .. })));
}

#[tokio::test]
async fn open_checks_embedding_space() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&temp_dir);
    let documents: Vec<_> = ["type 2 diabetes", "asthma"]
        .iter()
        .map(|text| document(text))
        .collect();

    IndexBuilder::new(Arc::new(KeywordEmbedder::new(&KEYWORDS)), 8)
        .build(&documents, &config.storage_path())
        .await
        .expect("build should succeed");

    let retriever = Retriever::open(&config, Arc::new(KeywordEmbedder::new(&KEYWORDS)))
        .await
        .expect("matching embedder should open");
    assert_eq!(
        retriever
            .retrieve("asthma")
            .await
            .expect("retrieve should succeed"),
        vec!["asthma".to_string()]
    );

    let wider = Retriever::open(
        &config,
        Arc::new(KeywordEmbedder::new(&["diabetes", "hypertension", "asthma", "gout"])),
    )
    .await;
    assert!(matches!(wider, Err(IcdError::Config(_))));
}
