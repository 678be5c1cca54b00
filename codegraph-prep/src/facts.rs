//! Repository-level orchestration: walk a checked-out repo, extract facts
//! from every recognized source file, and merge them into one deterministic
//! [`GraphFacts`] document.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::extract::{extract_file, ExtractError};
use crate::languages::LanguageId;
use crate::model::{Edge, GraphFacts, Node};

const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
    ".idea",
    ".vscode",
    ".mypy_cache",
    ".pytest_cache",
];

#[derive(Debug, Error)]
pub enum FactsError {
    #[error("failed to walk repo directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write graph facts to {path}: {source}")]
    WriteFacts {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize graph facts: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Walks `repo_dir`, extracts structural facts from every file whose
/// extension maps to a supported language, and returns one merged,
/// deterministically ordered [`GraphFacts`] document.
pub fn build_graph_facts(
    repo_id: &str,
    repo_dir: &Path,
    max_snippet_chars: usize,
) -> Result<GraphFacts, FactsError> {
    let mut nodes_by_id: BTreeMap<String, Node> = BTreeMap::new();
    let mut edges_set: HashSet<Edge> = HashSet::new();

    for entry in WalkDir::new(repo_dir)
        .into_iter()
        .filter_entry(|e| {
            e.file_type().is_file()
                || !e
                    .file_name()
                    .to_str()
                    .map(|n| IGNORED_DIRS.contains(&n))
                    .unwrap_or(false)
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let Some(lang) = LanguageId::from_extension(ext) else {
            continue;
        };

        let rel_path = entry
            .path()
            .strip_prefix(repo_dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        let source = match fs::read_to_string(entry.path()) {
            Ok(s) => s,
            Err(err) => {
                // Binary or non-UTF-8 files are skipped, not fatal to the run.
                debug!(path = %rel_path, error = %err, "skipping unreadable file");
                continue;
            }
        };

        match extract_file(repo_id, &rel_path, &source, lang, max_snippet_chars) {
            Ok((nodes, edges)) => {
                for node in nodes {
                    nodes_by_id.insert(node.id.clone(), node);
                }
                edges_set.extend(edges);
            }
            Err(ExtractError::NoTree(path)) => {
                warn!(path = %path, "tree-sitter produced no parse tree, skipping");
            }
            Err(err) => {
                warn!(path = %rel_path, error = %err, "extraction failed for file, skipping");
            }
        }
    }

    let mut nodes: Vec<Node> = nodes_by_id.into_values().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));

    let mut edges: Vec<Edge> = edges_set.into_iter().collect();
    edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));

    Ok(GraphFacts {
        repo_id: repo_id.to_string(),
        nodes,
        edges,
    })
}

/// Writes `facts` as pretty-printed JSON to `out_path`, creating parent
/// directories as needed.
pub fn write_graph_facts(facts: &GraphFacts, out_path: &Path) -> Result<(), FactsError> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent).map_err(|source| FactsError::WriteFacts {
            path: out_path.display().to_string(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(facts)?;
    fs::write(out_path, json).map_err(|source| FactsError::WriteFacts {
        path: out_path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_repo_and_merges_facts_across_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/a.py"),
            "def helper():\n    return 1\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("src/b.py"),
            "from src.a import helper\n\ndef caller():\n    return helper()\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/skip.py"), "def ignored(): pass").unwrap();

        let facts = build_graph_facts("repo1", dir.path(), crate::extract::DEFAULT_MAX_SNIPPET_CHARS).unwrap();

        assert!(facts.nodes.iter().any(|n| n.name == "helper"));
        assert!(facts.nodes.iter().any(|n| n.name == "caller"));
        assert!(!facts.nodes.iter().any(|n| n.name == "ignored"));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let facts = GraphFacts {
            repo_id: "repo1".to_string(),
            nodes: vec![],
            edges: vec![],
        };
        let out_path = dir.path().join("out/graph_facts.json");
        write_graph_facts(&facts, &out_path).unwrap();

        let read_back: GraphFacts =
            serde_json::from_str(&fs::read_to_string(&out_path).unwrap()).unwrap();
        assert_eq!(read_back.repo_id, "repo1");
    }
}
