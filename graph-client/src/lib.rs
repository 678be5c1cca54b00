//! Thin HTTP+JSON client for the collaborating Cypher-speaking graph store.
//!
//! Every call is a single request/response round trip with an explicit
//! timeout; there is no local retry here — retrying a failed step is the
//! job engine's decision, except for the embedding provider which owns its
//! own backoff policy.

use std::time::Duration;

use codegraph_prep::GraphFacts;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum GraphClientError {
    #[error("graph store unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("graph store returned {status} for {url}: {snippet}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        snippet: String,
    },

    #[error("could not decode graph store response: {0}")]
    Decode(String),
}

/// Result of [`GraphClient::load`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LoadSummary {
    pub nodes_created: usize,
    pub edges_created: usize,
}

/// Result of [`GraphClient::status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoStatus {
    pub node_count: usize,
    pub edge_count: usize,
    pub embedded_fraction: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordHit {
    pub id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultHit {
    pub id: String,
}

/// One-hop neighborhood of a set of seed node ids.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpandResult {
    pub nodes: Vec<codegraph_prep::Node>,
    pub edges: Vec<codegraph_prep::Edge>,
}

/// Thin client for the graph store's load/search/expand/embed contract.
///
/// Constructed with a base URL and a shared `reqwest::Client` carrying a
/// timeout; mirrors the provider-client idiom used by the chat/embedding
/// clients in this workspace.
#[derive(Debug, Clone)]
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GraphClientError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GraphClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, GraphClientError> {
        let url = self.url(path);
        let response = self.client.post(&url).json(body).send().await?;
        Self::decode(url, response).await
    }

    async fn get_json<R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<R, GraphClientError> {
        let url = self.url(path);
        let response = self.client.get(&url).query(query).send().await?;
        Self::decode(url, response).await
    }

    async fn decode<R: for<'de> Deserialize<'de>>(
        url: String,
        response: reqwest::Response,
    ) -> Result<R, GraphClientError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GraphClientError::HttpStatus {
                status,
                url,
                snippet: make_snippet(&body),
            });
        }
        serde_json::from_str(&body).map_err(|e| GraphClientError::Decode(e.to_string()))
    }

    /// Pushes a node/edge set to the graph store. Idempotent: the store
    /// upserts keyed by `(repo_id, id)`.
    pub async fn load(&self, facts: &GraphFacts) -> Result<LoadSummary, GraphClientError> {
        debug!(repo_id = %facts.repo_id, nodes = facts.nodes.len(), edges = facts.edges.len(), "loading graph facts");
        self.post_json("/graph/load", facts).await
    }

    pub async fn status(&self, repo_id: &str) -> Result<RepoStatus, GraphClientError> {
        #[derive(Serialize)]
        struct Req<'a> {
            repo_id: &'a str,
        }
        self.post_json("/graph/status", &Req { repo_id }).await
    }

    /// Requests embedding materialization for every un-embedded node of
    /// `repo_id`.
    pub async fn embed(&self, repo_id: &str) -> Result<(), GraphClientError> {
        #[derive(Serialize)]
        struct Req<'a> {
            repo_id: &'a str,
        }
        #[derive(Deserialize)]
        struct Ack {
            #[allow(dead_code)]
            ok: bool,
        }
        let _: Ack = self.post_json("/graph/embed", &Req { repo_id }).await?;
        Ok(())
    }

    pub async fn embeddings_status(&self, repo_id: &str) -> Result<f32, GraphClientError> {
        #[derive(Deserialize)]
        struct Resp {
            embedded_fraction: f32,
        }
        let resp: Resp = self
            .get_json("/graph/embeddings/status", &[("repo_id", repo_id)])
            .await?;
        Ok(resp.embedded_fraction)
    }

    pub async fn delete(&self, repo_id: &str) -> Result<(), GraphClientError> {
        #[derive(Serialize)]
        struct Req<'a> {
            repo_id: &'a str,
        }
        #[derive(Deserialize)]
        struct Ack {
            #[allow(dead_code)]
            ok: bool,
        }
        let _: Ack = self.post_json("/graph/delete", &Req { repo_id }).await?;
        Ok(())
    }

    pub async fn search_fulltext(
        &self,
        repo_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<KeywordHit>, GraphClientError> {
        #[derive(Serialize)]
        struct Req<'a> {
            repo_id: &'a str,
            query: &'a str,
            top_k: usize,
        }
        self.post_json(
            "/graph/search/fulltext",
            &Req {
                repo_id,
                query,
                top_k,
            },
        )
        .await
    }

    pub async fn search_vector(
        &self,
        repo_id: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorHit>, GraphClientError> {
        #[derive(Serialize)]
        struct Req<'a> {
            repo_id: &'a str,
            vector: &'a [f32],
            top_k: usize,
        }
        self.post_json(
            "/graph/search/vector",
            &Req {
                repo_id,
                vector,
                top_k,
            },
        )
        .await
    }

    /// Fallback ranking used when both keyword and vector searches come up
    /// empty: the most-connected or most-recent nodes.
    pub async fn search_default(
        &self,
        repo_id: &str,
        top_k: usize,
    ) -> Result<Vec<DefaultHit>, GraphClientError> {
        #[derive(Serialize)]
        struct Req<'a> {
            repo_id: &'a str,
            top_k: usize,
        }
        self.post_json("/graph/search/default", &Req { repo_id, top_k })
            .await
    }

    pub async fn expand(
        &self,
        repo_id: &str,
        ids: &[String],
        hops: u32,
    ) -> Result<ExpandResult, GraphClientError> {
        #[derive(Serialize)]
        struct Req<'a> {
            repo_id: &'a str,
            ids: &'a [String],
            hops: u32,
        }
        self.post_json("/graph/expand", &Req { repo_id, ids, hops })
            .await
    }

    /// Executes a pre-sanitized, read-only query and returns the raw JSON
    /// result rows. Used by the structural query path; callers are
    /// responsible for sanitizing `query` before calling this.
    pub async fn run_read_only_query(
        &self,
        repo_id: &str,
        query: &str,
    ) -> Result<serde_json::Value, GraphClientError> {
        #[derive(Serialize)]
        struct Req<'a> {
            repo_id: &'a str,
            query: &'a str,
        }
        self.post_json("/graph/query", &Req { repo_id, query }).await
    }
}

fn make_snippet(body: &str) -> String {
    const MAX: usize = 240;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let mut s: String = trimmed.chars().take(MAX).collect();
        s.push('…');
        s
    }
}
