//! MCP Tools Implementation
//!
//! Tool definitions and handlers for code retrieval, note summarization and code
//! generation.

use crate::IcdError;
use crate::index::Retriever;
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::notes::{generate_codes, summarize_note};
use crate::provider::ChatCompleter;
use crate::rag::RagService;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Message sent to clients in place of raw provider errors
pub const PROVIDER_ERROR_MESSAGE: &str =
    "The language model provider request failed. See server logs for details.";

/// Turn a failed operation into a tool error result.
///
/// Provider error text can carry upstream details, so it is only passed through when
/// `expose_provider_errors` is set.
#[inline]
pub fn error_result(error: &IcdError, expose_provider_errors: bool) -> CallToolResult {
    error!("Tool call failed: {}", error);

    let text = match error {
        IcdError::InvalidRequest(message) => message.clone(),
        e if e.is_provider_error() && !expose_provider_errors => {
            PROVIDER_ERROR_MESSAGE.to_string()
        }
        e => e.to_string(),
    };

    CallToolResult::error(text)
}

/// Fetch a required string argument, or the tool error to return in its place
fn string_argument(
    arguments: Option<&HashMap<String, Value>>,
    name: &str,
) -> std::result::Result<String, CallToolResult> {
    arguments
        .and_then(|args| args.get(name))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            CallToolResult::error(format!("Please provide '{}' in the arguments.", name))
        })
}

fn json_result(value: &Value) -> Result<CallToolResult> {
    Ok(CallToolResult::text(serde_json::to_string_pretty(value)?))
}

/// `retrieve_codes`: look up corpus records for candidate code lines
pub struct RetrieveCodesHandler {
    service: Arc<RagService>,
    expose_provider_errors: bool,
}

impl RetrieveCodesHandler {
    #[inline]
    pub fn new(service: Arc<RagService>, expose_provider_errors: bool) -> Self {
        Self {
            service,
            expose_provider_errors,
        }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "retrieve_codes".to_string(),
            description: Some(
                "Look up ICD-10-CM records for candidate codes, one per line, keeping one record per parent code"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query_text": {
                        "type": "string",
                        "description": "Candidate codes or diagnoses, one per line (e.g. 'E11.9: Type 2 diabetes')"
                    }
                },
                "required": ["query_text"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for RetrieveCodesHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let query_text = match string_argument(params.arguments.as_ref(), "query_text") {
            Ok(text) => text,
            Err(result) => return Ok(result),
        };

        debug!("Retrieving codes for {} input lines", query_text.lines().count());

        match self.service.retrieve_codes(&query_text).await {
            Ok(records) => json_result(&json!({ "rag_documents": records })),
            Err(e) => Ok(error_result(&e, self.expose_provider_errors)),
        }
    }
}

/// `summarize_note`: condense a clinical note
pub struct SummarizeNoteHandler {
    completer: Arc<dyn ChatCompleter>,
    expose_provider_errors: bool,
}

impl SummarizeNoteHandler {
    #[inline]
    pub fn new(completer: Arc<dyn ChatCompleter>, expose_provider_errors: bool) -> Self {
        Self {
            completer,
            expose_provider_errors,
        }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "summarize_note".to_string(),
            description: Some(
                "Summarize a clinical note to about 300 words, keeping history and exam findings"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "clinical_note": {
                        "type": "string",
                        "description": "Full text of the clinical note"
                    }
                },
                "required": ["clinical_note"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SummarizeNoteHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let note = match string_argument(params.arguments.as_ref(), "clinical_note") {
            Ok(note) => note,
            Err(result) => return Ok(result),
        };

        match summarize_note(self.completer.as_ref(), &note).await {
            Ok(summary) => json_result(&json!({ "clinical_note_summary": summary })),
            Err(e) => Ok(error_result(&e, self.expose_provider_errors)),
        }
    }
}

/// `generate_codes`: propose ICD-10-CM codes for a note summary
pub struct GenerateCodesHandler {
    completer: Arc<dyn ChatCompleter>,
    expose_provider_errors: bool,
}

impl GenerateCodesHandler {
    #[inline]
    pub fn new(completer: Arc<dyn ChatCompleter>, expose_provider_errors: bool) -> Self {
        Self {
            completer,
            expose_provider_errors,
        }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "generate_codes".to_string(),
            description: Some(
                "Propose up to 4 ICD-10-CM codes for a clinical note summary, one '[Code]: [Description]' per line"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "clinical_note_summary": {
                        "type": "string",
                        "description": "Summary of the clinical note"
                    }
                },
                "required": ["clinical_note_summary"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for GenerateCodesHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let summary = match string_argument(params.arguments.as_ref(), "clinical_note_summary") {
            Ok(summary) => summary,
            Err(result) => return Ok(result),
        };

        match generate_codes(self.completer.as_ref(), &summary).await {
            Ok(response) => json_result(&json!({ "response": response })),
            Err(e) => Ok(error_result(&e, self.expose_provider_errors)),
        }
    }
}

/// `health`: report that the server is up and how many records it serves
pub struct HealthHandler {
    retriever: Arc<Retriever>,
}

impl HealthHandler {
    #[inline]
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "health".to_string(),
            description: Some("Check that the clinical note processor is running".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for HealthHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        debug!("Health check requested");

        match self.retriever.document_count().await {
            Ok(count) => json_result(&json!({
                "status": "OK",
                "message": "Clinical Note Processor is running.",
                "indexed_records": count,
                "top_k": self.retriever.top_k()
            })),
            Err(e) => Ok(error_result(&e, false)),
        }
    }
}

/// Everything the tool handlers need to serve requests
pub struct ToolContext {
    pub service: Arc<RagService>,
    pub retriever: Arc<Retriever>,
    pub completer: Arc<dyn ChatCompleter>,
    pub expose_provider_errors: bool,
}

/// Register every tool on `server`
#[inline]
pub async fn register_tools(server: &McpServer, context: ToolContext) {
    let expose = context.expose_provider_errors;

    server
        .register_tool(
            RetrieveCodesHandler::tool_definition(),
            RetrieveCodesHandler::new(context.service, expose),
        )
        .await;
    server
        .register_tool(
            SummarizeNoteHandler::tool_definition(),
            SummarizeNoteHandler::new(Arc::clone(&context.completer), expose),
        )
        .await;
    server
        .register_tool(
            GenerateCodesHandler::tool_definition(),
            GenerateCodesHandler::new(context.completer, expose),
        )
        .await;
    server
        .register_tool(
            HealthHandler::tool_definition(),
            HealthHandler::new(context.retriever),
        )
        .await;
}
