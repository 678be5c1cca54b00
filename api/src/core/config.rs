//! Environment-driven configuration for the HTTP edge and the pipeline it
//! drives. Mirrors the recognized option set: `DATA_DIR`, `MAX_ZIP_MB`,
//! `MAX_FILES`, `MAX_TOTAL_UNZIPPED_MB`, `MAX_SNIPPET_CHARS`,
//! `MAX_ATTEMPTS`, `ENABLE_EMBEDDINGS`, `EMBED_MAX_RETRIES`,
//! `EMBED_BACKOFF_{BASE,MAX}_SEC`, `EMBED_TIMEOUT_SEC`, `EMBED_MODEL`,
//! `EMBED_DIMENSIONS`, `CHAT_MODEL`, `CHAT_TIMEOUT_SEC`, `TOP_K`,
//! `DEBUG_ENV`, plus `DATABASE_URL`, `GRAPH_SERVICE_URL`, `CHAT_PROVIDER`,
//! `CHAT_ENDPOINT`, `CHAT_API_KEY`, `CHAT_ENABLED`, `EMBED_PROVIDER`,
//! `EMBEDDING_ENDPOINT`, `EMBEDDING_API_KEY`.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

fn env_string(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingEnv(name))
}

fn env_parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &'static str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => !matches!(raw.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"),
        Err(_) => default,
    }
}

/// Boot-time configuration, loaded once and shared as `Arc<AppConfig>`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub graph_service_url: String,
    pub data_dir: PathBuf,

    pub max_zip_mb: u64,
    pub max_files: usize,
    pub max_total_unzipped_mb: u64,
    pub max_snippet_chars: usize,

    pub max_attempts: u32,
    pub enable_embeddings: bool,
    pub embed_max_retries: u32,
    pub embed_backoff_base_sec: f64,
    pub embed_backoff_max_sec: f64,
    pub embed_timeout_sec: u64,
    pub embed_model: String,
    pub embed_dimensions: Option<u32>,

    pub chat_provider: String,
    pub chat_model: String,
    pub chat_endpoint: Option<String>,
    pub chat_api_key: Option<String>,
    pub chat_timeout_sec: u64,
    pub chat_enabled: bool,

    pub embed_provider: String,
    pub embed_endpoint: Option<String>,
    pub embed_api_key: Option<String>,

    pub top_k: usize,
    pub debug_env: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: env_required("DATABASE_URL")?,
            graph_service_url: env_string("GRAPH_SERVICE_URL", "http://localhost:8002"),
            data_dir: PathBuf::from(env_string("DATA_DIR", "/data")),

            max_zip_mb: env_parsed("MAX_ZIP_MB", 50)?,
            max_files: env_parsed("MAX_FILES", 20_000)?,
            max_total_unzipped_mb: env_parsed("MAX_TOTAL_UNZIPPED_MB", 500)?,
            max_snippet_chars: env_parsed("MAX_SNIPPET_CHARS", 2_000)?,

            max_attempts: env_parsed("MAX_ATTEMPTS", 3)?,
            enable_embeddings: env_bool("ENABLE_EMBEDDINGS", true),
            embed_max_retries: env_parsed("EMBED_MAX_RETRIES", 10)?,
            embed_backoff_base_sec: env_parsed("EMBED_BACKOFF_BASE_SEC", 1.0)?,
            embed_backoff_max_sec: env_parsed("EMBED_BACKOFF_MAX_SEC", 30.0)?,
            embed_timeout_sec: env_parsed("EMBED_TIMEOUT_SEC", 60)?,
            embed_model: env_string("EMBED_MODEL", "text-embedding-3-small"),
            embed_dimensions: env::var("EMBED_DIMENSIONS")
                .ok()
                .and_then(|v| v.parse().ok()),

            chat_provider: env_string("CHAT_PROVIDER", "openai"),
            chat_model: env_string("CHAT_MODEL", "gpt-4o-mini"),
            chat_endpoint: env::var("CHAT_ENDPOINT").ok(),
            chat_api_key: env::var("CHAT_API_KEY").or_else(|_| env::var("OPENAI_API_KEY")).ok(),
            chat_timeout_sec: env_parsed("CHAT_TIMEOUT_SEC", 30)?,
            chat_enabled: env_bool("CHAT_ENABLED", true),

            embed_provider: env_string("EMBED_PROVIDER", "openai"),
            embed_endpoint: env::var("EMBEDDING_ENDPOINT").ok(),
            embed_api_key: env::var("EMBEDDING_API_KEY").or_else(|_| env::var("OPENAI_API_KEY")).ok(),

            top_k: env_parsed("TOP_K", 8)?,
            debug_env: env_bool("DEBUG_ENV", false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_required_reports_the_missing_name() {
        let err = env_required("CONFIG_TEST_DOES_NOT_EXIST").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("CONFIG_TEST_DOES_NOT_EXIST")));
    }

    #[test]
    fn env_parsed_falls_back_to_default_when_unset() {
        let value: u64 = env_parsed("CONFIG_TEST_UNSET_U64", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn env_parsed_rejects_unparsable_values() {
        // SAFETY: test-local var name, not read by any other test.
        unsafe { env::set_var("CONFIG_TEST_BAD_U64", "not-a-number") };
        let err = env_parsed::<u64>("CONFIG_TEST_BAD_U64", 0).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "CONFIG_TEST_BAD_U64", .. }));
        unsafe { env::remove_var("CONFIG_TEST_BAD_U64") };
    }

    #[test]
    fn env_bool_recognizes_falsey_strings() {
        for falsey in ["0", "false", "no", "off", "FALSE"] {
            unsafe { env::set_var("CONFIG_TEST_BOOL", falsey) };
            assert!(!env_bool("CONFIG_TEST_BOOL", true), "{falsey} should be falsey");
        }
        unsafe { env::remove_var("CONFIG_TEST_BOOL") };
    }

    #[test]
    fn env_bool_uses_default_when_unset() {
        assert!(env_bool("CONFIG_TEST_BOOL_UNSET", true));
        assert!(!env_bool("CONFIG_TEST_BOOL_UNSET_2", false));
    }
}
