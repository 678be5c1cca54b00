//! Single-file structural extraction: one source file in, a set of
//! [`Node`]/[`Edge`] facts out.

use std::collections::HashMap;

use thiserror::Error;
use tree_sitter::{Node as TsNode, Parser, Tree};

use crate::ids::stable_node_id;
use crate::languages::LanguageId;
use crate::model::{Edge, EdgeKind, Node, NodeKind};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to set tree-sitter grammar for {0}")]
    Grammar(LanguageId),

    #[error("tree-sitter produced no parse tree for {0}")]
    NoTree(String),
}

/// Default cap on a stored code snippet's length, used when a caller has no
/// configured value (e.g. the in-crate tests below).
pub const DEFAULT_MAX_SNIPPET_CHARS: usize = 2_000;

/// Structural facts extracted from a single source file, already rooted at
/// a file node with id `stable_node_id(repo_id, rel_path, rel_path, "file")`.
/// `max_snippet_chars` caps every stored `code_snippet`, file included.
pub fn extract_file(
    repo_id: &str,
    rel_path: &str,
    source: &str,
    lang: LanguageId,
    max_snippet_chars: usize,
) -> Result<(Vec<Node>, Vec<Edge>), ExtractError> {
    let mut parser = Parser::new();
    parser
        .set_language(&lang.tree_sitter_language())
        .map_err(|_| ExtractError::Grammar(lang))?;

    let tree: Tree = parser
        .parse(source, None)
        .ok_or_else(|| ExtractError::NoTree(rel_path.to_string()))?;

    let bytes = source.as_bytes();
    let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path).to_string();
    let file_id = stable_node_id(repo_id, rel_path, rel_path, "file");

    let mut nodes = vec![Node {
        id: file_id.clone(),
        kind: NodeKind::File,
        name: file_name,
        path: rel_path.to_string(),
        code_snippet: truncate_snippet(source, max_snippet_chars),
    }];
    let mut edges = Vec::new();

    // Pass 1: collect every definition's id up front so calls can resolve
    // forward references within the same file.
    let mut symbol_table: HashMap<String, String> = HashMap::new();
    collect_definitions(tree.root_node(), bytes, repo_id, rel_path, lang, &mut symbol_table);

    // Pass 2: walk again, emitting nodes/edges with containment and call
    // resolution against the symbol table built above.
    walk(
        tree.root_node(),
        bytes,
        repo_id,
        rel_path,
        lang,
        &file_id,
        &file_id,
        max_snippet_chars,
        &symbol_table,
        &mut nodes,
        &mut edges,
    );

    Ok((nodes, edges))
}

/// Explicit worklist rather than recursion, so an adversarially deep syntax
/// tree cannot blow the call stack.
fn collect_definitions(
    root: TsNode,
    bytes: &[u8],
    repo_id: &str,
    rel_path: &str,
    lang: LanguageId,
    symbol_table: &mut HashMap<String, String>,
) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some((name, kind)) = match_definition(node, bytes, lang) {
            let kind_str = symbol_kind_str(kind);
            let id = stable_node_id(repo_id, rel_path, &name, kind_str);
            symbol_table.insert(name, id);
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor).collect::<Vec<_>>().into_iter().rev() {
            stack.push(child);
        }
    }
}

/// Same worklist approach as [`collect_definitions`]; each stack entry
/// carries the containing node's id alongside the syntax node, since a
/// pre-order visit already knows the container before descending into
/// children — no post-order "leave" bookkeeping is needed.
#[allow(clippy::too_many_arguments)]
fn walk(
    root: TsNode,
    bytes: &[u8],
    repo_id: &str,
    rel_path: &str,
    lang: LanguageId,
    file_id: &str,
    root_container_id: &str,
    max_snippet_chars: usize,
    symbol_table: &HashMap<String, String>,
    nodes: &mut Vec<Node>,
    edges: &mut Vec<Edge>,
) {
    let mut stack: Vec<(TsNode, String)> = vec![(root, root_container_id.to_string())];

    while let Some((node, container_id)) = stack.pop() {
        let mut next_container = container_id.clone();

        if let Some((name, kind)) = match_definition(node, bytes, lang) {
            let kind_str = symbol_kind_str(kind);
            let id = stable_node_id(repo_id, rel_path, &name, kind_str);
            nodes.push(Node {
                id: id.clone(),
                kind,
                name,
                path: rel_path.to_string(),
                code_snippet: snippet(node, bytes, max_snippet_chars),
            });
            edges.push(Edge {
                source: container_id.clone(),
                target: id.clone(),
                kind: EdgeKind::Contains,
            });
            next_container = id;
        } else if lang.import_node_types().contains(&node.kind()) {
            let module_name = import_name(node, bytes);
            if !module_name.is_empty() {
                let id = stable_node_id(repo_id, "<external>", &module_name, "module");
                nodes.push(Node {
                    id: id.clone(),
                    kind: NodeKind::Module,
                    name: module_name,
                    path: "<external>".to_string(),
                    code_snippet: snippet(node, bytes, max_snippet_chars),
                });
                edges.push(Edge {
                    source: file_id.to_string(),
                    target: id,
                    kind: EdgeKind::Imports,
                });
            }
        } else if node.kind() == lang.call_node_type() {
            if let Some(callee) = call_target_name(node, bytes) {
                if let Some(target_id) = symbol_table.get(&callee) {
                    if target_id.as_str() != container_id {
                        edges.push(Edge {
                            source: container_id.clone(),
                            target: target_id.clone(),
                            kind: EdgeKind::Calls,
                        });
                    }
                }
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor).collect::<Vec<_>>().into_iter().rev() {
            stack.push((child, next_container.clone()));
        }
    }
}

fn symbol_kind_str(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::File => "file",
        NodeKind::Class => "class",
        NodeKind::Function => "function",
        NodeKind::Module => "module",
    }
}

/// Matches `node` against the language's definition table, resolving the
/// Python `decorated_definition` wrapper down to the inner definition.
fn match_definition(node: TsNode, bytes: &[u8], lang: LanguageId) -> Option<(String, NodeKind)> {
    if node.kind() == "decorated_definition" {
        // The wrapped definition is always an immediate child alongside the
        // decorator nodes — one level, not a nested search.
        let mut cursor = node.walk();
        return node
            .children(&mut cursor)
            .find_map(|child| definition_spec_match(child, bytes, lang));
    }

    definition_spec_match(node, bytes, lang)
}

fn definition_spec_match(node: TsNode, bytes: &[u8], lang: LanguageId) -> Option<(String, NodeKind)> {
    for (node_kind_str, kind, name_field) in lang.definition_specs() {
        if node.kind() == *node_kind_str {
            let name = find_name(node, name_field, bytes)?;
            return Some((name, *kind));
        }
    }
    None
}

fn find_name(node: TsNode, field: &str, bytes: &[u8]) -> Option<String> {
    let target = node.child_by_field_name(field)?;
    target.utf8_text(bytes).ok().map(|s| s.to_string())
}

/// Best-effort module name for an import-like node: the first identifier or
/// dotted/string path child, falling back to the whole trimmed statement.
fn import_name(node: TsNode, bytes: &[u8]) -> String {
    const SKIP_KINDS: &[&str] = &[
        "import", "from", "use", ";", "\"", "'", "{", "}", ",", "as",
    ];

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let kind = child.kind();
        if SKIP_KINDS.contains(&kind) {
            continue;
        }
        if matches!(
            kind,
            "dotted_name"
                | "identifier"
                | "string"
                | "scoped_identifier"
                | "import_spec"
                | "use_as_clause"
                | "use_list"
                | "use_tree"
                | "package_identifier"
                | "namespace_import"
        ) {
            if let Ok(text) = child.utf8_text(bytes) {
                return text.trim_matches(['"', '\'']).to_string();
            }
        }
    }
    node.utf8_text(bytes)
        .unwrap_or("")
        .trim()
        .trim_end_matches(';')
        .to_string()
}

/// Text of the call expression's callee, verbatim. A bare call (`helper()`)
/// yields `helper`, matching a same-file definition; a member/attribute call
/// (`self.helper()`) yields `self.helper`, which never matches the bare-name
/// symbol table and so never produces a `calls` edge — deliberately: the
/// local symbol table has no notion of instance resolution, and guessing
/// would trade precision for recall the rest of the pipeline doesn't want.
fn call_target_name(node: TsNode, bytes: &[u8]) -> Option<String> {
    let callee = node
        .child_by_field_name("function")
        .or_else(|| node.named_child(0))?;
    callee.utf8_text(bytes).ok().map(|s| s.to_string())
}

fn snippet(node: TsNode, bytes: &[u8], max_snippet_chars: usize) -> String {
    truncate_snippet(node.utf8_text(bytes).unwrap_or(""), max_snippet_chars)
}

fn truncate_snippet(text: &str, max_snippet_chars: usize) -> String {
    if text.chars().count() <= max_snippet_chars {
        text.to_string()
    } else {
        let mut s: String = text.chars().take(max_snippet_chars).collect();
        s.push('…');
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_python_class_and_function_with_containment() {
        let source = "class Greeter:\n    def hello(self):\n        return 1\n";
        let (nodes, edges) =
            extract_file("repo", "a.py", source, LanguageId::Python, DEFAULT_MAX_SNIPPET_CHARS).unwrap();

        assert!(nodes.iter().any(|n| n.kind == NodeKind::Class && n.name == "Greeter"));
        assert!(nodes.iter().any(|n| n.kind == NodeKind::Function && n.name == "hello"));
        assert!(edges.iter().any(|e| e.kind == EdgeKind::Contains));
    }

    #[test]
    fn resolves_call_edge_between_functions_in_same_file() {
        let source = "def helper():\n    return 1\n\ndef caller():\n    return helper()\n";
        let (nodes, edges) =
            extract_file("repo", "b.py", source, LanguageId::Python, DEFAULT_MAX_SNIPPET_CHARS).unwrap();

        let helper_id = nodes
            .iter()
            .find(|n| n.name == "helper")
            .map(|n| n.id.clone())
            .unwrap();
        let caller_id = nodes
            .iter()
            .find(|n| n.name == "caller")
            .map(|n| n.id.clone())
            .unwrap();

        assert!(edges
            .iter()
            .any(|e| e.kind == EdgeKind::Calls && e.source == caller_id && e.target == helper_id));
    }

    #[test]
    fn does_not_emit_self_loop_for_recursive_call() {
        let source = "def fact(n):\n    return fact(n - 1)\n";
        let (nodes, edges) =
            extract_file("repo", "c.py", source, LanguageId::Python, DEFAULT_MAX_SNIPPET_CHARS).unwrap();
        let fact_id = nodes.iter().find(|n| n.name == "fact").unwrap().id.clone();

        assert!(!edges
            .iter()
            .any(|e| e.kind == EdgeKind::Calls && e.source == fact_id && e.target == fact_id));
    }

    #[test]
    fn extracts_import_edge() {
        let source = "import os\n\ndef f():\n    return os.getcwd()\n";
        let (nodes, edges) =
            extract_file("repo", "d.py", source, LanguageId::Python, DEFAULT_MAX_SNIPPET_CHARS).unwrap();

        assert!(nodes.iter().any(|n| n.kind == NodeKind::Module && n.name == "os"));
        assert!(edges.iter().any(|e| e.kind == EdgeKind::Imports));
    }

    #[test]
    fn module_node_is_pathless_and_stable_across_importing_files() {
        let source_a = "import os\n";
        let source_b = "import os\n\ndef f():\n    return os.getcwd()\n";
        let (nodes_a, _) =
            extract_file("repo", "a.py", source_a, LanguageId::Python, DEFAULT_MAX_SNIPPET_CHARS).unwrap();
        let (nodes_b, _) =
            extract_file("repo", "b.py", source_b, LanguageId::Python, DEFAULT_MAX_SNIPPET_CHARS).unwrap();

        let module_a = nodes_a.iter().find(|n| n.kind == NodeKind::Module).unwrap();
        let module_b = nodes_b.iter().find(|n| n.kind == NodeKind::Module).unwrap();

        assert_eq!(module_a.path, "<external>");
        assert_eq!(module_b.path, "<external>");
        assert_eq!(module_a.id, module_b.id, "same module imported from two files must share one id");
    }

    #[test]
    fn file_node_carries_a_truncated_source_snippet() {
        let source = "def f():\n    return 1\n";
        let (nodes, _) =
            extract_file("repo", "e.py", source, LanguageId::Python, DEFAULT_MAX_SNIPPET_CHARS).unwrap();
        let file_node = nodes.iter().find(|n| n.kind == NodeKind::File).unwrap();
        assert_eq!(file_node.code_snippet, source);
    }

    #[test]
    fn file_snippet_respects_the_configured_cap() {
        let source = "x".repeat(50);
        let (nodes, _) = extract_file("repo", "f.py", &source, LanguageId::Python, 10).unwrap();
        let file_node = nodes.iter().find(|n| n.kind == NodeKind::File).unwrap();
        assert_eq!(file_node.code_snippet.chars().count(), 11); // 10 chars + the truncation marker
    }

    #[test]
    fn member_call_does_not_resolve_against_the_symbol_table() {
        let source = "class C:\n    def helper(self):\n        return 1\n\n    def caller(self):\n        return self.helper()\n";
        let (_, edges) =
            extract_file("repo", "g.py", source, LanguageId::Python, DEFAULT_MAX_SNIPPET_CHARS).unwrap();
        assert!(!edges.iter().any(|e| e.kind == EdgeKind::Calls));
    }
}
