//! Shared application state: one `AppState` per process, built once at
//! startup and handed to every handler via `State<Arc<AppState>>`.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use ai_llm_service::config::llm_model_config::LlmModelConfig;
use ai_llm_service::config::llm_provider::LlmProvider;
use ai_llm_service::error_handler::AiLlmError;
use ai_llm_service::service_profiles::LlmServiceProfiles;
use answer_composer::AnswerComposer;
use embed_client::EmbedClient;
use graph_client::{GraphClient, GraphClientError};
use hybrid_retriever::HybridRetriever;
use job_engine::{EmbedRetryPolicy, InProcessQueue, JobEngine, PipelinePaths, TaskQueue};

use super::config::AppConfig;

/// Number of background tasks draining the job dispatch channel. The
/// original runs pipeline jobs on a Celery worker pool; this is the
/// in-process equivalent for a single binary with no broker dependency.
const DISPATCH_WORKERS: usize = 4;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("could not connect to the job database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not reach the graph store: {0}")]
    Graph(#[from] GraphClientError),

    #[error("could not initialize the language model clients: {0}")]
    Llm(#[from] AiLlmError),
}

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub paths: PipelinePaths,
    pub jobs: Arc<JobEngine>,
    pub graph: Arc<GraphClient>,
    pub retriever: Arc<HybridRetriever>,
    pub composer: Arc<AnswerComposer>,
    /// Same profiles the composer holds (or doesn't), exposed separately
    /// for the structural router's query-generation step.
    pub chat: Option<Arc<LlmServiceProfiles>>,
    queue: Arc<dyn TaskQueue>,
}

fn provider_from_name(name: &str) -> LlmProvider {
    if name.eq_ignore_ascii_case("ollama") {
        LlmProvider::Ollama
    } else {
        LlmProvider::OpenAI
    }
}

fn default_endpoint(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAI => "https://api.openai.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Arc<Self>, StartupError> {
        let config = Arc::new(config);
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let graph = Arc::new(GraphClient::new(config.graph_service_url.clone())?);

        let chat_provider = provider_from_name(&config.chat_provider);
        let chat_config = LlmModelConfig {
            provider: chat_provider,
            model: config.chat_model.clone(),
            endpoint: config
                .chat_endpoint
                .clone()
                .unwrap_or_else(|| default_endpoint(chat_provider).to_string()),
            api_key: config.chat_api_key.clone(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(config.chat_timeout_sec),
        };
        let embed_provider = provider_from_name(&config.embed_provider);
        let embed_config = LlmModelConfig {
            provider: embed_provider,
            model: config.embed_model.clone(),
            endpoint: config
                .embed_endpoint
                .clone()
                .unwrap_or_else(|| default_endpoint(embed_provider).to_string()),
            api_key: config.embed_api_key.clone(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(config.embed_timeout_sec),
        };
        let profiles = Arc::new(LlmServiceProfiles::new(
            chat_config,
            None,
            embed_config,
            Some(config.embed_timeout_sec),
        )?);

        let paths = PipelinePaths::new(config.data_dir.clone());
        let embed_policy = EmbedRetryPolicy {
            max_retries: config.embed_max_retries,
            backoff_base_secs: config.embed_backoff_base_sec,
            backoff_max_secs: config.embed_backoff_max_sec,
            enabled: config.enable_embeddings,
        };
        let archive_limits = archive_sandbox::ArchiveLimits {
            max_zip_bytes: config.max_zip_mb * 1024 * 1024,
            max_files: config.max_files,
            max_total_uncompressed_bytes: config.max_total_unzipped_mb * 1024 * 1024,
        };
        let jobs = Arc::new(JobEngine::new(
            db,
            paths.clone(),
            archive_limits,
            (*graph).clone(),
            embed_policy,
            config.max_snippet_chars,
        ));

        let embedder = Arc::new(EmbedClient::new(Arc::clone(&profiles)));
        let retriever = Arc::new(HybridRetriever::new(
            Arc::clone(&graph),
            embedder,
            config.enable_embeddings,
        ));
        let chat = config.chat_enabled.then(|| Arc::clone(&profiles));
        let composer = Arc::new(AnswerComposer::new(chat.clone()));

        let queue: Arc<dyn TaskQueue> = Arc::new(InProcessQueue::new());
        let state = Arc::new(Self {
            config,
            paths,
            jobs,
            graph,
            retriever,
            composer,
            chat,
            queue,
        });
        state.spawn_dispatch_workers();
        Ok(state)
    }

    /// Hands a freshly created job to the queue; the job transitions
    /// through `JobEngine::run` on one of the dispatch workers.
    pub async fn dispatch(&self, job_id: Uuid) {
        self.queue.enqueue(job_id).await;
    }

    fn spawn_dispatch_workers(self: &Arc<Self>) {
        for worker in 0..DISPATCH_WORKERS {
            let queue = Arc::clone(&self.queue);
            let jobs = Arc::clone(&self.jobs);
            tokio::spawn(async move {
                while let Some(job_id) = queue.consume().await {
                    match jobs.run(job_id).await {
                        Ok(job_engine::RunOutcome::Requeued) => {
                            let queue = Arc::clone(&queue);
                            tokio::spawn(async move {
                                tokio::time::sleep(std::time::Duration::from_secs(
                                    job_engine::REQUEUE_DELAY_SECS,
                                ))
                                .await;
                                queue.enqueue(job_id).await;
                            });
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!(%job_id, worker, %err, "pipeline job run failed");
                        }
                    }
                }
            });
        }
    }
}
