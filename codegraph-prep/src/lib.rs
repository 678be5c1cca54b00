//! Multi-language structural extraction: turns a checked-out repository
//! into a flat graph of files, classes, functions, and the contains/imports/
//! calls relationships between them.
//!
//! Node identifiers are content-addressed (see [`ids::stable_node_id`])
//! rather than randomly generated, so re-extracting an unchanged repo
//! reproduces byte-identical output.

pub mod extract;
pub mod facts;
pub mod ids;
pub mod languages;
pub mod model;

pub use extract::{extract_file, ExtractError, DEFAULT_MAX_SNIPPET_CHARS};
pub use facts::{build_graph_facts, write_graph_facts, FactsError};
pub use languages::LanguageId;
pub use model::{Edge, EdgeKind, GraphFacts, Node, NodeKind};
