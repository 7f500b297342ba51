#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! MCP Server Integration Tests
//!
//! Drives a server backed by a real LanceDB index through a full JSON-RPC session.

mod common;

use common::{
    KeywordEmbedder, PARENT_CORPUS, PARENT_KEYWORDS, ShoutingCompleter, config_in, write_corpus,
};
use icd_rag::index::{IndexBuilder, Retriever};
use icd_rag::mcp::server::ConnectionState;
use icd_rag::mcp::{McpServer, ToolContext, register_tools};
use icd_rag::provider::Embedder;
use icd_rag::rag::{MissingParentPolicy, RagService};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

async fn setup_server(temp_dir: &TempDir) -> Arc<McpServer> {
    let config = config_in(temp_dir.path());
    let corpus = write_corpus(temp_dir.path(), &PARENT_CORPUS);
    let embedder = Arc::new(KeywordEmbedder::new(&PARENT_KEYWORDS));

    IndexBuilder::new(Arc::clone(&embedder) as Arc<dyn Embedder>, 8)
        .build_from_corpus(&corpus, &config.storage_path())
        .await
        .expect("build should succeed");

    let retriever = Arc::new(
        Retriever::open(&config, embedder)
            .await
            .expect("index should open"),
    );
    let server = McpServer::new("icd-rag".to_string(), "1.0.0".to_string())
        .with_instructions("test instructions");
    register_tools(
        &server,
        ToolContext {
            service: Arc::new(RagService::new(
                Arc::clone(&retriever),
                MissingParentPolicy::Distinct,
            )),
            retriever,
            completer: Arc::new(ShoutingCompleter),
            expose_provider_errors: false,
        },
    )
    .await;

    Arc::new(server)
}

/// Send one request line and read one response line
async fn round_trip<W, R>(writer: &mut W, reader: &mut R, request: Value) -> Value
where
    W: AsyncWriteExt + Unpin,
    R: AsyncBufReadExt + Unpin,
{
    writer
        .write_all(format!("{}\n", request).as_bytes())
        .await
        .expect("should write request");

    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .expect("should read response");
    serde_json::from_str(&line).expect("response should be JSON")
}

fn tool_body(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("tool result has text content");
    serde_json::from_str(text).expect("tool text is JSON")
}

#[tokio::test]
async fn session_over_duplex_streams() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let server = setup_server(&temp_dir).await;

    let (client, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let serving = tokio::spawn(
        Arc::clone(&server).serve(BufReader::new(server_read), server_write),
    );

    let (client_read, mut client_write) = tokio::io::split(client);
    let mut client_read = BufReader::new(client_read);

    let initialized = round_trip(
        &mut client_write,
        &mut client_read,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "integration", "version": "1.0"}
        }}),
    )
    .await;
    assert_eq!(initialized["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(initialized["result"]["instructions"], "test instructions");

    client_write
        .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
        .await
        .expect("should write notification");

    let retrieved = round_trip(
        &mut client_write,
        &mut client_read,
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {
            "name": "retrieve_codes",
            "arguments": {"query_text": "ICD-10 Codes:\nA01.1: fever A\nA01.2: fever B\nB05.3: measles"}
        }}),
    )
    .await;
    let documents = tool_body(&retrieved)["rag_documents"].clone();
    let codes: Vec<_> = documents
        .as_array()
        .expect("documents array")
        .iter()
        .map(|doc| doc["code"].as_str().expect("code").to_string())
        .collect();
    assert_eq!(codes, ["A01.1", "B05.3"]);
    assert_eq!(documents[0]["synonyms"], json!(["Paratyphoid A"]));
    assert_eq!(server.connection_state().await, ConnectionState::Ready);

    let health = round_trip(
        &mut client_write,
        &mut client_read,
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "health"}}),
    )
    .await;
    let body = tool_body(&health);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["message"], "Clinical Note Processor is running.");
    assert_eq!(body["indexed_records"], 3);
    assert_eq!(body["top_k"], 1);

    let generated = round_trip(
        &mut client_write,
        &mut client_read,
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {
            "name": "generate_codes",
            "arguments": {"clinical_note_summary": "fever   and\n rash"}
        }}),
    )
    .await;
    assert_eq!(tool_body(&generated)["response"], "FEVER AND RASH");

    client_write
        .shutdown()
        .await
        .expect("should close the client side");
    serving
        .await
        .expect("server task should not panic")
        .expect("server should stop cleanly at EOF");
    assert_eq!(server.connection_state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn provider_failures_are_reported_without_detail() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let server = setup_server(&temp_dir).await;

    let input = format!(
        "{}\n",
        json!({"jsonrpc": "2.0", "id": 9, "method": "tools/call", "params": {
            "name": "retrieve_codes",
            "arguments": {"query_text": "PROVIDER-DOWN"}
        }})
    );
    let mut output = Vec::new();
    server
        .serve(BufReader::new(input.as_bytes()), &mut output)
        .await
        .expect("serve should finish");

    let response: Value = serde_json::from_slice(&output).expect("one JSON response");
    // A failing query degrades to a placeholder record rather than a tool error
    let body = tool_body(&response);
    assert_eq!(body["rag_documents"][0]["code"], "UNRESOLVED");
    assert!(
        !response.to_string().contains("connection refused"),
        "provider detail leaked: {}",
        response
    );
}
