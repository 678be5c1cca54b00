//! Durable pipeline job state machine: row-locked claim, per-step
//! transactions, attempts/backoff/fail rules.
//!
//! ```text
//! queued ──claim──▶ running ──step-ok*──▶ running ──final-ok──▶ completed
//! running ──step-fail(attempts<MAX, transient)──▶ queued
//! running ──step-fail(attempts=MAX or non-retryable)──▶ failed
//! ```
//!
//! Every step commits in its own transaction, so a crash mid-pipeline
//! leaves a consistent, resumable record: re-claiming a `queued` job is
//! safe because every step is idempotent (archive extraction checks
//! existing output; graph load and embed upsert).

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use archive_sandbox::{extract_repo_archive, ArchiveError, ArchiveLimits};
use codegraph_prep::facts::{build_graph_facts, write_graph_facts, FactsError};
use graph_client::{GraphClient, GraphClientError};

pub mod queue;
pub use queue::{InProcessQueue, TaskQueue};

pub const MAX_ATTEMPTS: u32 = 3;

/// Delay before a `Requeued` job is handed back to the queue. Distinct from
/// the EMBED step's decorrelated-jitter backoff, which has its own policy —
/// this is the original's short, fixed retry delay for a whole-pipeline
/// requeue.
pub const REQUEUE_DELAY_SECS: u64 = 5;
const EMBED_TRANSIENT_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStep {
    Ingest,
    Parse,
    LoadGraph,
    Embed,
}

impl JobStep {
    fn as_str(self) -> &'static str {
        match self {
            JobStep::Ingest => "INGEST",
            JobStep::Parse => "PARSE",
            JobStep::LoadGraph => "LOAD_GRAPH",
            JobStep::Embed => "EMBED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobType {
    IngestZip,
    IngestKgZip,
}

impl JobType {
    fn as_str(self) -> &'static str {
        match self {
            JobType::IngestZip => "PIPELINE_INGEST_ZIP",
            JobType::IngestKgZip => "PIPELINE_KG_INGEST_ZIP",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "PIPELINE_INGEST_ZIP" => Some(JobType::IngestZip),
            "PIPELINE_KG_INGEST_ZIP" => Some(JobType::IngestKgZip),
            _ => None,
        }
    }
}

/// A durable job row.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub repo_id: Uuid,
    pub job_type: String,
    pub status: String,
    pub progress: i32,
    pub current_step: String,
    pub attempts: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum JobEngineError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("archive step failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("parse step failed: {0}")]
    Parse(#[from] FactsError),

    #[error("graph store step failed: {0}")]
    Graph(#[from] GraphClientError),

    #[error("failed to read graph facts artifact at {path}: {source}")]
    ReadFacts {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode graph facts artifact at {path}: {source}")]
    DecodeFacts {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported job_type: {0}")]
    UnsupportedJobType(String),

    #[error("no supported source files found in repository")]
    ParseEmpty,

    #[error(
        "embed step failed after retries: attempts_used={attempts}, last_status={last_status:?}, detail={detail}"
    )]
    EmbedExhausted {
        attempts: u32,
        last_status: Option<u16>,
        detail: String,
    },
}

impl JobEngineError {
    /// These failures already exhausted their own retry budget (or can
    /// never succeed by retrying) — the engine marks the job `failed`
    /// immediately instead of requeuing.
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEngineError::EmbedExhausted { .. } | JobEngineError::ParseEmpty
        )
    }
}

/// Outcome of a single [`JobEngine::run`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Missing,
    AlreadyRunning,
    AlreadyCompleted,
    Completed,
    Requeued,
    Failed,
}

/// Filesystem layout and limits the engine partitions by `repo_id`.
#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub data_dir: PathBuf,
}

impl PipelinePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn repo_dir(&self, repo_id: Uuid) -> PathBuf {
        self.data_dir.join("repos").join(repo_id.to_string())
    }

    pub fn zip_path(&self, repo_id: Uuid) -> PathBuf {
        self.data_dir
            .join("uploads")
            .join(format!("{repo_id}.zip"))
    }

    pub fn facts_path(&self, repo_id: Uuid) -> PathBuf {
        self.data_dir
            .join("artifacts")
            .join(repo_id.to_string())
            .join("graph_facts.json")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EmbedRetryPolicy {
    pub max_retries: u32,
    pub backoff_base_secs: f64,
    pub backoff_max_secs: f64,
    pub enabled: bool,
}

impl Default for EmbedRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff_base_secs: 1.0,
            backoff_max_secs: 30.0,
            enabled: true,
        }
    }
}

pub struct JobEngine {
    pool: PgPool,
    paths: PipelinePaths,
    limits: ArchiveLimits,
    graph: GraphClient,
    embed_policy: EmbedRetryPolicy,
    max_snippet_chars: usize,
}

impl JobEngine {
    pub fn new(
        pool: PgPool,
        paths: PipelinePaths,
        limits: ArchiveLimits,
        graph: GraphClient,
        embed_policy: EmbedRetryPolicy,
        max_snippet_chars: usize,
    ) -> Self {
        Self {
            pool,
            paths,
            limits,
            graph,
            embed_policy,
            max_snippet_chars,
        }
    }

    /// Inserts a new queued job and returns its id.
    pub async fn create_job(
        &self,
        repo_id: Uuid,
        job_type: JobType,
    ) -> Result<Uuid, JobEngineError> {
        let job_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, repo_id, job_type, status, progress, current_step, attempts)
            VALUES ($1, $2, $3, 'queued', 0, 'INGEST', 0)
            "#,
        )
        .bind(job_id)
        .bind(repo_id)
        .bind(job_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(job_id)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<JobRecord, JobEngineError> {
        let row = sqlx::query(
            "SELECT job_id, repo_id, job_type, status, progress, current_step, attempts, error, created_at, updated_at FROM jobs WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(JobEngineError::NotFound(job_id))?;
        Ok(row_to_record(&row)?)
    }

    pub async fn list_jobs(&self, repo_id: Uuid) -> Result<Vec<JobRecord>, JobEngineError> {
        let rows = sqlx::query(
            "SELECT job_id, repo_id, job_type, status, progress, current_step, attempts, error, created_at, updated_at \
             FROM jobs WHERE repo_id = $1 ORDER BY created_at DESC",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        let records = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(records)
    }

    /// Runs one job to completion, failure, or requeue. Safe to call again
    /// for a `queued` job after a crash — every step is idempotent.
    pub async fn run(&self, job_id: Uuid) -> Result<RunOutcome, JobEngineError> {
        let claimed = self.claim(job_id).await?;
        match claimed {
            Claim::Missing => return Ok(RunOutcome::Missing),
            Claim::AlreadyCompleted => return Ok(RunOutcome::AlreadyCompleted),
            Claim::AlreadyRunning => return Ok(RunOutcome::AlreadyRunning),
            Claim::Claimed { repo_id, job_type } => {
                match self.run_pipeline(job_id, repo_id, &job_type).await {
                    Ok(()) => {
                        info!(job_id = %job_id, "job completed");
                        Ok(RunOutcome::Completed)
                    }
                    Err(err) => self.handle_failure(job_id, err).await,
                }
            }
        }
    }

    async fn claim(&self, job_id: Uuid) -> Result<Claim, JobEngineError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT status, repo_id, job_type FROM jobs WHERE job_id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(Claim::Missing);
        };

        let status: String = row.try_get("status")?;
        let repo_id: Uuid = row.try_get("repo_id")?;
        let job_type_raw: String = row.try_get("job_type")?;
        let job_type = JobType::from_str(&job_type_raw)
            .ok_or_else(|| JobEngineError::UnsupportedJobType(job_type_raw))?;

        if status == "completed" {
            tx.commit().await?;
            return Ok(Claim::AlreadyCompleted);
        }
        if status == "running" {
            tx.commit().await?;
            return Ok(Claim::AlreadyRunning);
        }

        sqlx::query(
            "UPDATE jobs SET status = 'running', error = NULL, current_step = 'INGEST', \
             progress = GREATEST(progress, 1), updated_at = now() WHERE job_id = $1",
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Claim::Claimed { repo_id, job_type })
    }

    async fn run_pipeline(
        &self,
        job_id: Uuid,
        repo_id: Uuid,
        job_type: &JobType,
    ) -> Result<(), JobEngineError> {
        self.step(job_id, JobStep::Ingest, 25, || {
            self.run_ingest(repo_id, job_type)
        })
        .await?;

        let facts_path = self
            .step(job_id, JobStep::Parse, 50, || self.run_parse(repo_id))
            .await?;
        info!(job_id = %job_id, facts_path = %facts_path.display(), "parse.artifact_written");

        self.step(job_id, JobStep::LoadGraph, 75, || {
            self.run_load_graph(repo_id)
        })
        .await?;

        self.step(job_id, JobStep::Embed, 90, || self.run_embed(repo_id))
            .await?;

        sqlx::query(
            "UPDATE jobs SET status = 'completed', progress = 100, current_step = 'EMBED', \
             error = NULL, updated_at = now() WHERE job_id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn step<T, F, Fut>(
        &self,
        job_id: Uuid,
        step: JobStep,
        milestone_progress: i32,
        f: F,
    ) -> Result<T, JobEngineError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, JobEngineError>>,
    {
        let out = f().await?;
        sqlx::query(
            "UPDATE jobs SET current_step = $2, progress = $3, updated_at = now() WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(step.as_str())
        .bind(milestone_progress)
        .execute(&self.pool)
        .await?;
        Ok(out)
    }

    async fn run_ingest(&self, repo_id: Uuid, job_type: &JobType) -> Result<(), JobEngineError> {
        match job_type {
            JobType::IngestZip | JobType::IngestKgZip => {
                let zip_path = self.paths.zip_path(repo_id);
                let repo_dir = self.paths.repo_dir(repo_id);
                extract_repo_archive(&zip_path, &repo_dir, &self.limits)?;
                Ok(())
            }
        }
    }

    async fn run_parse(&self, repo_id: Uuid) -> Result<PathBuf, JobEngineError> {
        let repo_dir = self.paths.repo_dir(repo_id);
        let facts = build_graph_facts(&repo_id.to_string(), &repo_dir, self.max_snippet_chars)?;
        if facts
            .nodes
            .iter()
            .all(|n| n.kind != codegraph_prep::NodeKind::File)
        {
            return Err(JobEngineError::ParseEmpty);
        }
        let facts_path = self.paths.facts_path(repo_id);
        write_graph_facts(&facts, &facts_path)?;
        Ok(facts_path)
    }

    async fn run_load_graph(&self, repo_id: Uuid) -> Result<(), JobEngineError> {
        let facts_path = self.paths.facts_path(repo_id);
        let facts_json =
            std::fs::read_to_string(&facts_path).map_err(|source| JobEngineError::ReadFacts {
                path: facts_path.display().to_string(),
                source,
            })?;
        let facts: codegraph_prep::GraphFacts =
            serde_json::from_str(&facts_json).map_err(|source| JobEngineError::DecodeFacts {
                path: facts_path.display().to_string(),
                source,
            })?;
        self.graph.load(&facts).await?;
        Ok(())
    }

    async fn run_embed(&self, repo_id: Uuid) -> Result<(), JobEngineError> {
        if !self.embed_policy.enabled {
            info!(repo_id = %repo_id, "embeddings disabled; skipping embed");
            return Ok(());
        }

        let repo_id_str = repo_id.to_string();
        let mut attempt: u32 = 0;
        let mut last_status: Option<u16> = None;
        let mut last_detail = String::new();

        loop {
            attempt += 1;
            match self.graph.embed(&repo_id_str).await {
                Ok(()) => return Ok(()),
                Err(GraphClientError::HttpStatus { status, snippet, .. }) => {
                    last_status = Some(status.as_u16());
                    last_detail = snippet;

                    if !EMBED_TRANSIENT_STATUSES.contains(&status.as_u16()) {
                        return Err(JobEngineError::EmbedExhausted {
                            attempts: attempt,
                            last_status,
                            detail: last_detail,
                        });
                    }
                }
                Err(err) => {
                    last_status = None;
                    last_detail = err.to_string();
                }
            }

            if attempt >= self.embed_policy.max_retries {
                return Err(JobEngineError::EmbedExhausted {
                    attempts: attempt,
                    last_status,
                    detail: last_detail,
                });
            }

            let sleep_secs = decorrelated_jitter_secs(
                attempt,
                self.embed_policy.backoff_base_secs,
                self.embed_policy.backoff_max_secs,
            );
            warn!(
                repo_id = %repo_id,
                attempt,
                max_attempts = self.embed_policy.max_retries,
                status = ?last_status,
                sleep_secs,
                detail = %last_detail,
                "embed retry scheduled"
            );
            tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
        }
    }

    async fn handle_failure(
        &self,
        job_id: Uuid,
        err: JobEngineError,
    ) -> Result<RunOutcome, JobEngineError> {
        let is_terminal = err.is_terminal();
        let error_text = err.to_string();

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT attempts FROM jobs WHERE job_id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.commit().await?;
            return Ok(RunOutcome::Missing);
        };
        let attempts: i32 = row.try_get("attempts")?;
        let attempts = attempts + 1;

        let should_requeue = !is_terminal && (attempts as u32) < MAX_ATTEMPTS;
        let new_status = if should_requeue { "queued" } else { "failed" };

        sqlx::query(
            "UPDATE jobs SET attempts = $2, error = $3, status = $4, updated_at = now() WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(attempts)
        .bind(&error_text)
        .bind(new_status)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if should_requeue {
            warn!(job_id = %job_id, attempts, error = %error_text, "job failed, retrying");
            Ok(RunOutcome::Requeued)
        } else {
            warn!(job_id = %job_id, attempts, error = %error_text, "job failed permanently");
            Ok(RunOutcome::Failed)
        }
    }
}

enum Claim {
    Missing,
    AlreadyCompleted,
    AlreadyRunning,
    Claimed { repo_id: Uuid, job_type: JobType },
}

fn decorrelated_jitter_secs(attempt: u32, base: f64, cap: f64) -> f64 {
    let exp = base * 2f64.powi((attempt.saturating_sub(1)) as i32);
    let upper = cap.min(exp).max(0.0);
    rand::thread_rng().gen_range(0.0..=upper)
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<JobRecord, sqlx::Error> {
    Ok(JobRecord {
        job_id: row.try_get("job_id")?,
        repo_id: row.try_get("repo_id")?,
        job_type: row.try_get("job_type")?,
        status: row.try_get("status")?,
        progress: row.try_get("progress")?,
        current_step: row.try_get("current_step")?,
        attempts: row.try_get("attempts")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_never_exceeds_cap() {
        for attempt in 1..20 {
            let s = decorrelated_jitter_secs(attempt, 1.0, 30.0);
            assert!(s >= 0.0);
            assert!(s <= 30.0);
        }
    }

    #[test]
    fn jitter_upper_bound_grows_with_attempt_before_cap() {
        assert!(decorrelated_jitter_secs(1, 1.0, 30.0) <= 1.0);
        assert!(decorrelated_jitter_secs(2, 1.0, 30.0) <= 2.0);
        assert!(decorrelated_jitter_secs(10, 1.0, 30.0) <= 30.0);
    }

    #[test]
    fn job_type_round_trips_through_db_string() {
        assert_eq!(JobType::from_str("PIPELINE_INGEST_ZIP"), Some(JobType::IngestZip));
        assert_eq!(JobType::IngestZip.as_str(), "PIPELINE_INGEST_ZIP");
        assert_eq!(JobType::from_str("PIPELINE_KG_INGEST_ZIP"), Some(JobType::IngestKgZip));
        assert_eq!(JobType::from_str("bogus"), None);
    }

    #[test]
    fn pipeline_paths_are_partitioned_by_repo_id() {
        let paths = PipelinePaths::new("/data");
        let repo_id = Uuid::nil();
        assert_eq!(paths.repo_dir(repo_id), PathBuf::from("/data/repos/00000000-0000-0000-0000-000000000000"));
        assert_eq!(paths.zip_path(repo_id), PathBuf::from("/data/uploads/00000000-0000-0000-0000-000000000000.zip"));
        assert_eq!(
            paths.facts_path(repo_id),
            PathBuf::from("/data/artifacts/00000000-0000-0000-0000-000000000000/graph_facts.json")
        );
    }
}
