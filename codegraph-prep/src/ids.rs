//! Content-addressed, deterministic node identifiers.
//!
//! Unlike a namespaced UUID, an id here is fully reproducible from its
//! logical key alone — re-extracting the same repo produces byte-identical
//! node ids, which lets a graph store merge instead of duplicate.

use sha2::{Digest, Sha256};

/// `sha256(repo_id|path|symbol|kind)` as lowercase hex.
pub fn stable_node_id(repo_id: &str, path: &str, symbol: &str, kind: &str) -> String {
    let raw = format!("{repo_id}|{path}|{symbol}|{kind}");
    let digest = Sha256::digest(raw.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic() {
        let a = stable_node_id("repo", "src/a.py", "foo", "function");
        let b = stable_node_id("repo", "src/a.py", "foo", "function");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn differs_by_any_component() {
        let base = stable_node_id("repo", "src/a.py", "foo", "function");
        assert_ne!(base, stable_node_id("repo2", "src/a.py", "foo", "function"));
        assert_ne!(base, stable_node_id("repo", "src/b.py", "foo", "function"));
        assert_ne!(base, stable_node_id("repo", "src/a.py", "bar", "function"));
        assert_ne!(base, stable_node_id("repo", "src/a.py", "foo", "class"));
    }
}
