//! Hybrid lexical + vector retrieval: fuses a full-text search and a vector
//! search by node id, falls back to a default ranking if both come up
//! empty, and expands the top hits by one hop for graph context.
//!
//! Any single retrieval source may fail without failing the whole call —
//! retrieval degrades gracefully to whichever source(s) still answered.

use std::collections::HashMap;
use std::sync::Arc;

use codegraph_prep::{Edge, Node, NodeKind};
use embed_client::EmbedClient;
use graph_client::GraphClient;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("graph store unavailable for expansion: {0}")]
    ExpandFailed(#[source] graph_client::GraphClientError),
}

/// One ranked snippet in a [`RetrievalPack`].
#[derive(Debug, Clone, Serialize)]
pub struct SnippetHit {
    pub id: String,
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    pub snippet: String,
    pub combined_score: f32,
    pub semantic_score: Option<f32>,
    pub keyword_score: Option<f32>,
}

/// The one-hop neighborhood attached to a retrieval pack.
#[derive(Debug, Clone, Serialize)]
pub struct Subgraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// The full payload handed to the answer composer.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalPack {
    pub snippets: Vec<SnippetHit>,
    pub graph: Subgraph,
    pub scores: HashMap<String, f32>,
}

pub struct HybridRetriever {
    graph: Arc<GraphClient>,
    embedder: Arc<EmbedClient>,
    embeddings_enabled: bool,
}

impl HybridRetriever {
    pub fn new(graph: Arc<GraphClient>, embedder: Arc<EmbedClient>, embeddings_enabled: bool) -> Self {
        Self {
            graph,
            embedder,
            embeddings_enabled,
        }
    }

    pub async fn retrieve(
        &self,
        repo_id: &str,
        question: &str,
        top_k: usize,
    ) -> Result<RetrievalPack, RetrieverError> {
        let keyword_hits = match self.graph.search_fulltext(repo_id, question, top_k).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(repo_id, error = %err, "full-text search failed, continuing without it");
                Vec::new()
            }
        };

        let semantic_hits = self.semantic_search(repo_id, question, top_k).await;

        let mut scores: HashMap<String, (Option<f32>, Option<f32>)> = HashMap::new();
        for hit in &keyword_hits {
            let entry = scores.entry(hit.id.clone()).or_insert((None, None));
            entry.0 = Some(entry.0.map_or(hit.score, |s| s.max(hit.score)));
        }
        for hit in &semantic_hits {
            let entry = scores.entry(hit.id.clone()).or_insert((None, None));
            entry.1 = Some(entry.1.map_or(hit.score, |s| s.max(hit.score)));
        }

        let mut ranked: Vec<(String, f32, Option<f32>, Option<f32>)> = scores
            .into_iter()
            .map(|(id, (keyword, semantic))| {
                let combined = match (semantic, keyword) {
                    (Some(s), Some(k)) => s.max(k),
                    (Some(s), None) => s,
                    (None, Some(k)) => k,
                    (None, None) => 0.0,
                };
                (id, combined, semantic, keyword)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);

        let used_default_ranking = ranked.is_empty();
        if used_default_ranking {
            match self.graph.search_default(repo_id, top_k).await {
                Ok(hits) => {
                    ranked = hits
                        .into_iter()
                        .map(|hit| (hit.id, 0.0, None, None))
                        .collect();
                }
                Err(err) => {
                    warn!(repo_id, error = %err, "default ranking fallback failed");
                }
            }
        }

        let ids: Vec<String> = ranked.iter().map(|(id, ..)| id.clone()).collect();
        let expand = self
            .graph
            .expand(repo_id, &ids, 1)
            .await
            .map_err(RetrieverError::ExpandFailed)?;

        let nodes_by_id: HashMap<&str, &Node> =
            expand.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let snippets = ranked
            .into_iter()
            .filter_map(|(id, combined, semantic, keyword)| {
                let node = nodes_by_id.get(id.as_str())?;
                Some(SnippetHit {
                    id: id.clone(),
                    name: node.name.clone(),
                    path: node.path.clone(),
                    kind: node.kind,
                    snippet: node.code_snippet.clone(),
                    combined_score: combined,
                    semantic_score: semantic,
                    keyword_score: keyword,
                })
            })
            .collect::<Vec<_>>();

        let score_map = snippets
            .iter()
            .map(|s| (s.id.clone(), s.combined_score))
            .collect();

        Ok(RetrievalPack {
            snippets,
            graph: Subgraph {
                nodes: expand.nodes,
                edges: expand.edges,
            },
            scores: score_map,
        })
    }

    async fn semantic_search(
        &self,
        repo_id: &str,
        question: &str,
        top_k: usize,
    ) -> Vec<graph_client::VectorHit> {
        if !self.embeddings_enabled {
            return Vec::new();
        }

        let embedded_fraction = match self.graph.embeddings_status(repo_id).await {
            Ok(frac) => frac,
            Err(err) => {
                warn!(repo_id, error = %err, "embeddings status check failed, skipping vector search");
                return Vec::new();
            }
        };
        if embedded_fraction <= 0.0 {
            return Vec::new();
        }

        let vector = match self.embedder.embed(&[question]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => {
                warn!(repo_id, "embedding call returned no vectors for question");
                return Vec::new();
            }
            Err(err) => {
                warn!(repo_id, error = %err, "question embedding failed, skipping vector search");
                return Vec::new();
            }
        };

        match self.graph.search_vector(repo_id, &vector, top_k).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(repo_id, error = %err, "vector search failed, continuing without it");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_score_prefers_max_of_both_sources() {
        let mut scores: HashMap<String, (Option<f32>, Option<f32>)> = HashMap::new();
        scores.insert("a".into(), (Some(0.9), Some(0.8)));
        scores.insert("b".into(), (Some(0.6), None));
        scores.insert("c".into(), (None, Some(0.7)));

        let mut ranked: Vec<(String, f32)> = scores
            .into_iter()
            .map(|(id, (k, s))| {
                let combined = match (s, k) {
                    (Some(s), Some(k)) => s.max(k),
                    (Some(s), None) => s,
                    (None, Some(k)) => k,
                    (None, None) => 0.0,
                };
                (id, combined)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        assert_eq!(ranked[0].0, "a");
        assert_eq!(ranked[0].1, 0.9);
    }
}
