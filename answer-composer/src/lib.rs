//! Assembles retrieval context into a prompt, invokes the chat provider,
//! validates citations, and falls back deterministically when the provider
//! is unconfigured or answers with low confidence.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use ai_llm_service::service_profiles::LlmServiceProfiles;
use hybrid_retriever::{RetrievalPack, SnippetHit};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const MAX_CONTEXT_SNIPPETS: usize = 8;
const MAX_SNIPPET_CHARS: usize = 1_200;
const MAX_GRAPH_EDGES_FOR_PROMPT: usize = 40;
const FALLBACK_CITATION_COUNT: usize = 3;

const LOW_CONFIDENCE_MARKERS: &[&str] = &[
    "i'm unsure",
    "i am unsure",
    "not enough context",
    "cannot determine",
    "no context",
    "can't determine",
];

#[derive(Debug, Error)]
pub enum ComposerError {
    #[error("chat provider call failed: {0}")]
    Chat(#[from] ai_llm_service::error_handler::AiLlmError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposedAnswer {
    pub answer: String,
    pub citations: Vec<String>,
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatAnswer {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    citations: Vec<String>,
}

/// Builds answers from a [`RetrievalPack`], optionally backed by a chat
/// provider. With no chat provider configured, every call returns the
/// deterministic summary.
pub struct AnswerComposer {
    chat: Option<Arc<LlmServiceProfiles>>,
}

impl AnswerComposer {
    pub fn new(chat: Option<Arc<LlmServiceProfiles>>) -> Self {
        Self { chat }
    }

    pub async fn compose(
        &self,
        question: &str,
        pack: &RetrievalPack,
    ) -> Result<ComposedAnswer, ComposerError> {
        let snippets: Vec<&SnippetHit> = pack.snippets.iter().take(MAX_CONTEXT_SNIPPETS).collect();

        let Some(chat) = &self.chat else {
            return Ok(self.fallback_answer(question, pack, &snippets));
        };

        let context = build_context(&snippets);
        let graph_context = graph_context_summary(pack);
        let allowed_ids: HashSet<&str> = snippets.iter().map(|s| s.id.as_str()).collect();

        let prompt = format!(
            "You are answering repository questions using retrieved code and graph context. \
             Return strict JSON with keys: answer (string) and citations (array of snippet ids). \
             Only cite ids from the provided context. \
             When context exists, give a best-effort explanation instead of saying there is no context.\n\n\
             Question:\n{question}\n\n\
             Context snippets:\n{context}\n\n\
             Graph context:\n{graph_context}\n"
        );
        let system = "Be concise, factual, and cite provided snippet ids. \
             Answer with practical explanation: repository purpose, key components, and how components connect. \
             Never claim there is no context when snippets or graph relationships are present.";

        let content = chat.generate_fast_ex(&prompt, Some(system), true).await?;

        let parsed: ChatAnswer = match serde_json::from_str(&content) {
            Ok(parsed) => parsed,
            Err(_) => ChatAnswer {
                answer: content.clone(),
                citations: extract_ids(&content, &allowed_ids),
            },
        };

        let mut answer = parsed.answer.trim().to_string();
        if answer.is_empty() {
            answer = "No answer generated.".to_string();
        }

        let mut citations = Vec::new();
        for raw in parsed.citations {
            let token = raw.trim().to_lowercase();
            if allowed_ids.contains(token.as_str()) && !citations.contains(&token) {
                citations.push(token);
            }
        }
        if citations.is_empty() {
            citations.extend(
                snippets
                    .iter()
                    .take(FALLBACK_CITATION_COUNT)
                    .map(|s| s.id.clone()),
            );
        }

        let mut warning = None;
        if !snippets.is_empty() && looks_low_confidence(&answer) {
            let deterministic = deterministic_summary_answer(question, pack, &snippets);
            answer = format!("{deterministic}\n\nModel response note:\n{answer}");
            warning = Some(
                "chat provider returned low-confidence wording; appended deterministic retrieval summary."
                    .to_string(),
            );
        }

        Ok(ComposedAnswer {
            answer,
            citations,
            warning,
        })
    }

    fn fallback_answer(
        &self,
        question: &str,
        pack: &RetrievalPack,
        snippets: &[&SnippetHit],
    ) -> ComposedAnswer {
        if snippets.is_empty() && pack.graph.nodes.is_empty() {
            return ComposedAnswer {
                answer: "No indexed snippets were retrieved for this repository yet. \
                         Run ingest/indexing and retry the query."
                    .to_string(),
                citations: Vec::new(),
                warning: Some("chat provider unconfigured; returned deterministic fallback answer.".to_string()),
            };
        }

        let answer = deterministic_summary_answer(question, pack, snippets);
        let citations = snippets
            .iter()
            .take(5)
            .map(|s| s.id.clone())
            .collect();
        ComposedAnswer {
            answer,
            citations,
            warning: Some("chat provider unconfigured; returned deterministic fallback answer.".to_string()),
        }
    }
}

fn build_context(snippets: &[&SnippetHit]) -> String {
    snippets
        .iter()
        .map(|snippet| {
            let code = truncate_chars(&snippet.snippet, MAX_SNIPPET_CHARS);
            format!(
                "id: {}\npath: {}\nname: {}\ntype: {}\nscore: {}\nsnippet:\n{}",
                snippet.id, snippet.path, snippet.name, snippet.kind, snippet.combined_score, code
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn graph_context_summary(pack: &RetrievalPack) -> String {
    let nodes = &pack.graph.nodes;
    let edges = &pack.graph.edges;
    if nodes.is_empty() && edges.is_empty() {
        return "No graph neighborhood data available.".to_string();
    }

    let node_by_id: HashMap<&str, &codegraph_prep::Node> =
        nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut type_counts: HashMap<String, usize> = HashMap::new();
    for node in nodes {
        *type_counts.entry(node.kind.to_string()).or_insert(0) += 1;
    }
    let mut counted: Vec<(&String, &usize)> = type_counts.iter().collect();
    counted.sort_by(|a, b| b.1.cmp(a.1));
    let top_types = if counted.is_empty() {
        "n/a".to_string()
    } else {
        counted
            .into_iter()
            .take(4)
            .map(|(kind, count)| format!("{kind}:{count}"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut lines = vec![
        format!("Graph nodes: {}", nodes.len()),
        format!("Graph edges: {}", edges.len()),
        format!("Node types: {top_types}"),
    ];

    let edge_lines: Vec<String> = edges
        .iter()
        .take(MAX_GRAPH_EDGES_FOR_PROMPT)
        .map(|edge| {
            let source_name = node_by_id
                .get(edge.source.as_str())
                .map(|n| n.name.as_str())
                .unwrap_or(edge.source.as_str());
            let target_name = node_by_id
                .get(edge.target.as_str())
                .map(|n| n.name.as_str())
                .unwrap_or(edge.target.as_str());
            format!("{source_name} -[{}]-> {target_name}", edge.kind)
        })
        .collect();
    if !edge_lines.is_empty() {
        lines.push("Key relationships:".to_string());
        lines.extend(edge_lines);
    }
    lines.join("\n")
}

fn deterministic_summary_answer(
    question: &str,
    pack: &RetrievalPack,
    snippets: &[&SnippetHit],
) -> String {
    let nodes = &pack.graph.nodes;
    let edges = &pack.graph.edges;

    if snippets.is_empty() && nodes.is_empty() {
        return "No indexed snippets were retrieved for this repository yet. \
                Run ingest/indexing and retry the query."
            .to_string();
    }

    let node_by_id: HashMap<&str, &codegraph_prep::Node> =
        nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut lines = vec![format!("Best-effort answer for: {question}")];

    let highlights: Vec<String> = snippets
        .iter()
        .take(4)
        .map(|s| {
            let path = if s.path.is_empty() { "<no path>" } else { &s.path };
            format!(
                "- {} ({}) [{}] score={:.3}",
                s.name, path, s.kind, s.combined_score
            )
        })
        .collect();
    if !highlights.is_empty() {
        lines.push("Most relevant code anchors:".to_string());
        lines.extend(highlights);
    }

    let relation_lines: Vec<String> = edges
        .iter()
        .take(6)
        .map(|edge| {
            let source_name = node_by_id
                .get(edge.source.as_str())
                .map(|n| n.name.as_str())
                .unwrap_or(edge.source.as_str());
            let target_name = node_by_id
                .get(edge.target.as_str())
                .map(|n| n.name.as_str())
                .unwrap_or(edge.target.as_str());
            format!("- {source_name} --{}--> {target_name}", edge.kind)
        })
        .collect();
    if !relation_lines.is_empty() {
        lines.push("Observed graph relationships:".to_string());
        lines.extend(relation_lines);
    }

    lines.push(format!(
        "Retrieved context size: snippets={}, nodes={}, edges={}.",
        snippets.len(),
        nodes.len(),
        edges.len()
    ));
    lines.join("\n")
}

fn looks_low_confidence(answer: &str) -> bool {
    let text = answer.trim().to_lowercase();
    if text.is_empty() {
        return true;
    }
    LOW_CONFIDENCE_MARKERS.iter().any(|marker| text.contains(marker))
}

fn ids_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-f0-9]{32,64}").expect("ids pattern is a valid regex"))
}

fn extract_ids(text: &str, allowed: &HashSet<&str>) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut ids = Vec::new();
    for m in ids_pattern().find_iter(&lower) {
        let token = m.as_str();
        if allowed.contains(token) && !ids.iter().any(|existing: &String| existing == token) {
            ids.push(token.to_string());
        }
    }
    ids
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_prep::{Edge, EdgeKind, Node, NodeKind};
    use hybrid_retriever::Subgraph;

    fn sample_pack() -> RetrievalPack {
        RetrievalPack {
            snippets: vec![SnippetHit {
                id: "a".repeat(64),
                name: "process_payment".to_string(),
                path: "src/pay.py".to_string(),
                kind: NodeKind::Function,
                snippet: "def process_payment(): ...".to_string(),
                combined_score: 0.9,
                semantic_score: Some(0.9),
                keyword_score: None,
            }],
            graph: Subgraph {
                nodes: vec![Node {
                    id: "a".repeat(64),
                    kind: NodeKind::Function,
                    name: "process_payment".to_string(),
                    path: "src/pay.py".to_string(),
                    code_snippet: "def process_payment(): ...".to_string(),
                }],
                edges: vec![],
            },
            scores: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn falls_back_deterministically_when_unconfigured() {
        let composer = AnswerComposer::new(None);
        let pack = sample_pack();
        let result = composer.compose("What calls process_payment?", &pack).await.unwrap();

        assert!(result.warning.is_some());
        assert!(result.answer.contains("process_payment"));
        assert_eq!(result.citations, vec!["a".repeat(64)]);
    }

    #[test]
    fn extract_ids_only_keeps_allowed_tokens() {
        let allowed: HashSet<&str> = ["a".repeat(64)].iter().map(|s| s.as_str()).collect();
        let text = format!("see {} and deadbeef", "a".repeat(64));
        let ids = extract_ids(&text, &allowed);
        assert_eq!(ids, vec!["a".repeat(64)]);
    }

    #[test]
    fn detects_low_confidence_markers() {
        assert!(looks_low_confidence("I am unsure about this."));
        assert!(looks_low_confidence("There is not enough context to answer."));
        assert!(!looks_low_confidence("UserService calls process_payment directly."));
    }
}
