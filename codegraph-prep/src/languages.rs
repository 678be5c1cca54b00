//! Per-language tree-sitter registry: grammar lookup plus the tables that
//! drive structural extraction (which node types are definitions, imports,
//! or calls).

use std::fmt;

use crate::model::NodeKind;
use tree_sitter::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageId {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Java,
    Go,
    Rust,
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LanguageId::Python => "python",
            LanguageId::JavaScript => "javascript",
            LanguageId::TypeScript => "typescript",
            LanguageId::Tsx => "tsx",
            LanguageId::Java => "java",
            LanguageId::Go => "go",
            LanguageId::Rust => "rust",
        };
        write!(f, "{s}")
    }
}

impl LanguageId {
    /// Maps a lowercase file extension (without the dot) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" => Some(LanguageId::Python),
            "js" | "jsx" => Some(LanguageId::JavaScript),
            "ts" => Some(LanguageId::TypeScript),
            "tsx" => Some(LanguageId::Tsx),
            "java" => Some(LanguageId::Java),
            "go" => Some(LanguageId::Go),
            "rs" => Some(LanguageId::Rust),
            _ => None,
        }
    }

    pub fn tree_sitter_language(&self) -> Language {
        match self {
            LanguageId::Python => tree_sitter_python::LANGUAGE.into(),
            LanguageId::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            LanguageId::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            LanguageId::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            LanguageId::Java => tree_sitter_java::LANGUAGE.into(),
            LanguageId::Go => tree_sitter_go::LANGUAGE.into(),
            LanguageId::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }

    /// `(tree-sitter node kind, graph node kind, name field)` triples,
    /// checked in order; the first matching node kind wins.
    pub fn definition_specs(&self) -> &'static [(&'static str, NodeKind, &'static str)] {
        match self {
            LanguageId::Python => &[
                ("class_definition", NodeKind::Class, "name"),
                ("function_definition", NodeKind::Function, "name"),
                ("decorated_definition", NodeKind::Function, "name"),
            ],
            LanguageId::JavaScript => &[
                ("class_declaration", NodeKind::Class, "name"),
                ("function_declaration", NodeKind::Function, "name"),
                ("arrow_function", NodeKind::Function, "name"),
                ("method_definition", NodeKind::Function, "name"),
                ("generator_function_declaration", NodeKind::Function, "name"),
            ],
            LanguageId::TypeScript => &[
                ("class_declaration", NodeKind::Class, "name"),
                ("function_declaration", NodeKind::Function, "name"),
                ("arrow_function", NodeKind::Function, "name"),
                ("method_definition", NodeKind::Function, "name"),
                ("method_signature", NodeKind::Function, "name"),
                ("abstract_class_declaration", NodeKind::Class, "name"),
                ("interface_declaration", NodeKind::Class, "name"),
            ],
            LanguageId::Tsx => &[
                ("class_declaration", NodeKind::Class, "name"),
                ("function_declaration", NodeKind::Function, "name"),
                ("arrow_function", NodeKind::Function, "name"),
                ("method_definition", NodeKind::Function, "name"),
                ("interface_declaration", NodeKind::Class, "name"),
            ],
            LanguageId::Java => &[
                ("class_declaration", NodeKind::Class, "name"),
                ("interface_declaration", NodeKind::Class, "name"),
                ("enum_declaration", NodeKind::Class, "name"),
                ("method_declaration", NodeKind::Function, "name"),
                ("constructor_declaration", NodeKind::Function, "name"),
            ],
            LanguageId::Go => &[
                ("type_declaration", NodeKind::Class, "name"),
                ("function_declaration", NodeKind::Function, "name"),
                ("method_declaration", NodeKind::Function, "name"),
                ("short_var_declaration", NodeKind::Function, "left"),
            ],
            LanguageId::Rust => &[
                ("struct_item", NodeKind::Class, "name"),
                ("enum_item", NodeKind::Class, "name"),
                ("trait_item", NodeKind::Class, "name"),
                ("impl_item", NodeKind::Class, "name"),
                ("function_item", NodeKind::Function, "name"),
            ],
        }
    }

    pub fn import_node_types(&self) -> &'static [&'static str] {
        match self {
            LanguageId::Python => &["import_statement", "import_from_statement"],
            LanguageId::JavaScript | LanguageId::TypeScript | LanguageId::Tsx => {
                &["import_statement", "import_declaration"]
            }
            LanguageId::Java => &["import_declaration"],
            LanguageId::Go => &["import_spec"],
            LanguageId::Rust => &["use_declaration"],
        }
    }

    pub fn call_node_type(&self) -> &'static str {
        match self {
            LanguageId::Python => "call",
            LanguageId::JavaScript | LanguageId::TypeScript | LanguageId::Tsx => "call_expression",
            LanguageId::Java => "method_invocation",
            LanguageId::Go => "call_expression",
            LanguageId::Rust => "call_expression",
        }
    }
}
