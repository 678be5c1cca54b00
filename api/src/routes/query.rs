//! `POST /query` — the question-answering entry point. Structural
//! questions ("how many functions call X", "what imports Y") are routed
//! through a sanitized Cypher query against the graph store; everything
//! else goes through hybrid retrieval and the answer composer.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use codegraph_prep::{Edge, Node};

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::ApiResponse;
use crate::error_handler::{AppError, AppResult};

const STRUCTURAL_SYSTEM_PROMPT: &str = "You translate a question about a code graph into a single \
read-only Cypher query. The graph has nodes labeled File, Class, Function, Module and edges CONTAINS, \
IMPORTS, CALLS. Every MATCH must filter on `codebase_id = $cid`. Respond with the Cypher query only, \
no prose, no markdown fences.";

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub repo_id: Uuid,
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct QueryGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<String>,
    pub graph: QueryGraph,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryRequest>,
) -> AppResult<axum::response::Response> {
    if body.question.trim().is_empty() {
        return Err(AppError::BadRequest("question must not be empty".to_string()));
    }
    let repo_id = body.repo_id.to_string();

    if structural_router::is_structural_question(&body.question) {
        match run_structural_query(&state, &repo_id, &body.question).await {
            Ok(response) => {
                return Ok(ApiResponse::success(response).into_response_with_status(StatusCode::OK));
            }
            Err(warning) => {
                tracing::warn!(%warning, "structural query path failed, falling back to retrieval");
                let response = run_retrieval_query(&state, &repo_id, &body.question, Some(warning)).await?;
                return Ok(ApiResponse::success(response).into_response_with_status(StatusCode::OK));
            }
        }
    }

    let response = run_retrieval_query(&state, &repo_id, &body.question, None).await?;
    Ok(ApiResponse::success(response).into_response_with_status(StatusCode::OK))
}

async fn run_structural_query(
    state: &AppState,
    repo_id: &str,
    question: &str,
) -> Result<QueryResponse, String> {
    let raw_cypher = generate_cypher(state, question).await.map_err(|e| e.to_string())?;
    let cypher = structural_router::sanitize_cypher(&raw_cypher).map_err(|e| e.to_string())?;
    let rows = state
        .graph
        .run_read_only_query(repo_id, &cypher)
        .await
        .map_err(|e| e.to_string())?;

    Ok(QueryResponse {
        answer: summarize_rows(&rows),
        citations: Vec::new(),
        graph: QueryGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
        },
        warning: None,
    })
}

async fn generate_cypher(
    state: &AppState,
    question: &str,
) -> Result<String, ai_llm_service::error_handler::AiLlmError> {
    let Some(chat) = &state.chat else {
        return Ok(template_cypher(question));
    };
    chat.generate_fast_ex(question, Some(STRUCTURAL_SYSTEM_PROMPT), false).await
}

/// Deterministic fallback when no chat provider is configured: a
/// generic, always-safe listing query. It won't answer precisely, but it
/// never trips the sanitizer and still surfaces something.
fn template_cypher(_question: &str) -> String {
    "MATCH (f:Function) WHERE f.codebase_id = $cid RETURN f.name, f.file LIMIT 25".to_string()
}

fn summarize_rows(rows: &serde_json::Value) -> String {
    match rows.as_array() {
        Some(items) if !items.is_empty() => {
            let rendered: Vec<String> = items.iter().take(25).map(|v| v.to_string()).collect();
            format!("{} result(s):\n{}", items.len(), rendered.join("\n"))
        }
        _ => "The query returned no results.".to_string(),
    }
}

async fn run_retrieval_query(
    state: &AppState,
    repo_id: &str,
    question: &str,
    warning: Option<String>,
) -> AppResult<QueryResponse> {
    let pack = state
        .retriever
        .retrieve(repo_id, question, state.config.top_k)
        .await?;
    let composed = state.composer.compose(question, &pack).await?;
    let warning = match (warning, composed.warning) {
        (Some(a), Some(b)) => Some(format!("{a}; {b}")),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    Ok(QueryResponse {
        answer: composed.answer,
        citations: composed.citations,
        graph: QueryGraph {
            nodes: pack.graph.nodes,
            edges: pack.graph.edges,
        },
        warning,
    })
}
