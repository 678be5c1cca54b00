//! Classifies a question as structural vs semantic, and sanitizes an
//! LLM-generated Cypher query before it reaches the graph store.
//!
//! A structural question is one whose intent is counting, enumeration, or
//! reachability over the code graph — answerable by a read-only query
//! rather than a semantic/vector lookup.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("generated query contains a forbidden keyword: {0}")]
    UnsafeQuery(String),
}

fn structural_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(how many|count|list all|show all|what imports|dependenc(?:y|ies)|breaks if|impact of)\b",
        )
        .expect("structural pattern is a valid regex")
    })
}

fn forbidden_keyword_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(CREATE|MERGE|DELETE|SET|REMOVE|DROP)\b")
            .expect("forbidden keyword pattern is a valid regex")
    })
}

fn read_only_leading_keyword_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(MATCH|RETURN|WITH|UNWIND|CALL)\b")
            .expect("leading keyword pattern is a valid regex")
    })
}

/// Surface-pattern classifier: affirmative matches are phrases like "how
/// many", "count", "list all", "show all", "what imports", "dependency" /
/// "dependencies", "breaks if", "impact of".
pub fn is_structural_question(question: &str) -> bool {
    structural_pattern().is_match(question)
}

/// Strips a surrounding markdown code fence (with or without a language
/// tag) and outer whitespace from a raw LLM completion.
pub fn clean_cypher(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    let after_lang = match after_open.find('\n') {
        Some(idx) => &after_open[idx + 1..],
        None => after_open,
    };
    let without_close = after_lang.strip_suffix("```").unwrap_or(after_lang);
    without_close.trim().to_string()
}

/// Validates a generated query is read-only: rejects any string containing
/// `CREATE`/`MERGE`/`DELETE`/`SET`/`REMOVE`/`DROP` at a word boundary
/// (case-insensitive; this also catches `DETACH DELETE`), then requires the
/// cleaned query to begin with a read-only keyword.
pub fn sanitize_cypher(raw: &str) -> Result<String, RouterError> {
    let cleaned = clean_cypher(raw);

    if let Some(m) = forbidden_keyword_pattern().find(&cleaned) {
        return Err(RouterError::UnsafeQuery(m.as_str().to_string()));
    }

    if !read_only_leading_keyword_pattern().is_match(&cleaned) {
        return Err(RouterError::UnsafeQuery(
            "query must begin with MATCH, RETURN, WITH, UNWIND, or CALL".to_string(),
        ));
    }

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_structural_questions() {
        assert!(is_structural_question("How many functions call process_payment?"));
        assert!(is_structural_question("How many classes are in this repo?"));
        assert!(is_structural_question("Count all functions in the auth module"));
        assert!(is_structural_question("What imports UserService?"));
        assert!(is_structural_question("List all functions in models.py"));
        assert!(is_structural_question("List all subclasses of AbstractHandler"));
        assert!(is_structural_question("Show all classes that extend BaseView"));
        assert!(is_structural_question("Show the dependency graph for auth"));
        assert!(is_structural_question("List all dependencies of UserService"));
        assert!(is_structural_question("What breaks if I change User.save?"));
        assert!(is_structural_question(
            "What is the impact of removing validate_input?"
        ));
    }

    #[test]
    fn rejects_semantic_questions() {
        assert!(!is_structural_question("How does authentication work?"));
        assert!(!is_structural_question("Explain how the caching layer works"));
        assert!(!is_structural_question("What does the login function do?"));
        assert!(!is_structural_question(
            "Show me all database queries in the payment flow"
        ));
        assert!(!is_structural_question("How does the password hashing work?"));
        assert!(!is_structural_question("Explain how the request pipeline works"));
    }

    #[test]
    fn sanitizer_blocks_write_keywords() {
        assert!(sanitize_cypher("CREATE (n:Function {name: 'hack'})").is_err());
        assert!(sanitize_cypher("MERGE (n:Function {id: 'x'}) ON CREATE SET n.code = 'evil'").is_err());
        assert!(sanitize_cypher("MATCH (n) DELETE n").is_err());
        assert!(sanitize_cypher("MATCH (n) DETACH DELETE n").is_err());
        assert!(sanitize_cypher("MATCH (n) SET n.name = 'x'").is_err());
        assert!(sanitize_cypher("MATCH (n) REMOVE n.code").is_err());
        assert!(sanitize_cypher("DROP INDEX function_embeddings").is_err());
    }

    #[test]
    fn sanitizer_allows_read_only_queries() {
        let cypher = "MATCH (f:Function) RETURN f.name";
        assert_eq!(sanitize_cypher(cypher).unwrap(), cypher);

        let cypher = "MATCH (f:Function) WHERE f.codebase_id = $cid RETURN f.name, f.file";
        assert_eq!(sanitize_cypher(cypher).unwrap(), cypher);

        let cypher = "MATCH (f:Function) WHERE f.codebase_id = $cid RETURN count(f) AS total";
        assert_eq!(sanitize_cypher(cypher).unwrap(), cypher);

        let cypher = "MATCH (f:Function) WHERE f.codebase_id = $cid RETURN f.name, f.complexity ORDER BY f.complexity DESC LIMIT 10";
        assert_eq!(sanitize_cypher(cypher).unwrap(), cypher);
    }

    #[test]
    fn cleans_markdown_fences() {
        assert_eq!(
            clean_cypher("```cypher\nMATCH (n) RETURN n\n```"),
            "MATCH (n) RETURN n"
        );
        assert_eq!(
            clean_cypher("```\nMATCH (n) RETURN n\n```"),
            "MATCH (n) RETURN n"
        );
        assert_eq!(
            clean_cypher("  \n  MATCH (n) RETURN n  \n  "),
            "MATCH (n) RETURN n"
        );
        let raw = "MATCH (f:Function) WHERE f.name = $name RETURN f";
        assert_eq!(clean_cypher(raw), raw);
        assert_eq!(clean_cypher(""), "");
        assert!(!clean_cypher("```CYPHER\nMATCH (n) RETURN n\n```").contains("```"));
    }
}
