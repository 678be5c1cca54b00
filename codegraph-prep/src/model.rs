//! The flat node/edge facts this crate extracts from source code.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The four structural kinds this extractor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Class,
    Function,
    Module,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::File => "file",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
            NodeKind::Module => "module",
        };
        write!(f, "{s}")
    }
}

/// A structural fact: a file, class, function, or imported module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    pub path: String,
    pub code_snippet: String,
}

/// The three edge kinds this extractor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Contains,
    Imports,
    Calls,
}

/// A directed relationship between two node ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

/// The full output of a repository extraction pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFacts {
    pub repo_id: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}
