//! Batch text embedding with bounded retries and decorrelated full-jitter
//! backoff over a transient upstream.
//!
//! Retry classification follows the upstream's status code: `429` and
//! `5xx` are transient and retried; `401` surfaces immediately as an auth
//! failure; any other `4xx` surfaces immediately as a rejection. Network
//! errors, timeouts, and response-decode failures are treated as transient.

use std::time::Duration;

use ai_llm_service::error_handler::{AiLlmError, ProviderErrorKind};
use ai_llm_service::service_profiles::LlmServiceProfiles;
use rand::Rng;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::warn;

/// Retry/backoff policy for [`EmbedClient::embed`].
#[derive(Debug, Clone, Copy)]
pub struct EmbedRetryPolicy {
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for EmbedRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff_base_secs: 1,
            backoff_max_secs: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider rejected credentials: {0}")]
    Unauthorized(String),

    #[error("embedding provider rejected the request: {0}")]
    Rejected(String),

    #[error("embedding retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Batches text through the shared embedding profile, retrying transient
/// failures with decorrelated full-jitter backoff.
pub struct EmbedClient {
    profiles: std::sync::Arc<LlmServiceProfiles>,
    policy: EmbedRetryPolicy,
}

impl EmbedClient {
    pub fn new(profiles: std::sync::Arc<LlmServiceProfiles>) -> Self {
        Self::with_policy(profiles, EmbedRetryPolicy::default())
    }

    pub fn with_policy(
        profiles: std::sync::Arc<LlmServiceProfiles>,
        policy: EmbedRetryPolicy,
    ) -> Self {
        Self { profiles, policy }
    }

    /// Embeds `inputs` in one batch call, retrying transient upstream
    /// failures. Returns vectors in the same order as `inputs`.
    pub async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.profiles.embed_batch(inputs).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) => match classify(&err) {
                    Classification::Unauthorized => {
                        return Err(EmbedError::Unauthorized(err.to_string()));
                    }
                    Classification::Rejected => {
                        return Err(EmbedError::Rejected(err.to_string()));
                    }
                    Classification::Transient => {
                        if attempt >= self.policy.max_retries {
                            return Err(EmbedError::Exhausted {
                                attempts: attempt,
                                last_error: err.to_string(),
                            });
                        }
                        let sleep_secs = decorrelated_jitter_secs(
                            attempt,
                            self.policy.backoff_base_secs,
                            self.policy.backoff_max_secs,
                        );
                        warn!(
                            attempt,
                            max_retries = self.policy.max_retries,
                            sleep_secs,
                            error = %err,
                            "embedding call failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
                    }
                },
            }
        }
    }
}

enum Classification {
    Unauthorized,
    Rejected,
    Transient,
}

fn classify(err: &AiLlmError) -> Classification {
    match err {
        AiLlmError::Provider(provider_err) => match &provider_err.kind {
            ProviderErrorKind::HttpStatus(http_err) => match http_err.status {
                StatusCode::UNAUTHORIZED => Classification::Unauthorized,
                StatusCode::TOO_MANY_REQUESTS => Classification::Transient,
                s if s.is_server_error() => Classification::Transient,
                _ => Classification::Rejected,
            },
            ProviderErrorKind::Decode(_) => Classification::Transient,
            _ => Classification::Rejected,
        },
        AiLlmError::HttpTransport(_) => Classification::Transient,
        _ => Classification::Rejected,
    }
}

/// Full-jitter backoff: `uniform(0, min(cap, base * 2^(attempt-1)))`.
fn decorrelated_jitter_secs(attempt: u32, base: u64, cap: u64) -> f64 {
    let exp = base.saturating_mul(1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX));
    let upper = (cap.min(exp.max(base))) as f64;
    rand::thread_rng().gen_range(0.0..=upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_never_exceeds_cap() {
        for attempt in 1..20 {
            let s = decorrelated_jitter_secs(attempt, 1, 30);
            assert!(s <= 30.0);
            assert!(s >= 0.0);
        }
    }

    #[test]
    fn jitter_grows_with_attempt_before_hitting_cap() {
        // at attempt 1 the ceiling is base=1; at attempt 6, base*2^5=32 > cap=30.
        for attempt in 1..3 {
            let s = decorrelated_jitter_secs(attempt, 1, 30);
            assert!(s <= (1u64 << attempt) as f64);
        }
    }
}
