use std::sync::Arc;

use agentctl_llm_openai::OpenAiProvider;
use agentctl_platform_k8s::{BuildJobConfig, KubernetesPlatform};
use agentctl_statestore::RedisStateStore;
use agentctl_storage::Database;
use agentctl_worker::{activities::Dependencies, build_registry, BuildConfig, DatabaseConfig, KvConfig, LlmConfig, PlatformConfig, TemporalWorker, WorkerConfig};
use temporal_sdk_core::CoreRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let worker_config = WorkerConfig::from_env();
    let database_config = DatabaseConfig::from_env()?;
    let kv_config = KvConfig::from_env()?;
    let build_config = BuildConfig::from_env();
    let platform_config = PlatformConfig::from_env();
    let llm_config = LlmConfig::from_env();

    let database = Database::from_url(database_config.database_url()).await?;
    database.migrate().await?;

    let state_store = RedisStateStore::connect(kv_config.redis_url(), "agentctl").await?;

    let k8s_client = kube::Client::try_default().await?;
    let build_job_config = BuildJobConfig {
        build_context_pvc_name: build_config.build_context_pvc_name().to_string(),
        build_registry_secret_name: build_config.build_registry_secret_name().to_string(),
        build_contexts_mount_path: build_config.build_contexts_path().to_string(),
    };
    let _ = platform_config.agents_namespace();
    let platform = KubernetesPlatform::new(k8s_client, build_job_config);

    let llm = OpenAiProvider::new(llm_config.openai_api_key()?);

    let dependencies = Dependencies {
        database: Arc::new(database),
        platform: Arc::new(platform),
        state_store: Arc::new(state_store),
        llm: Arc::new(llm),
    };

    let runtime = Arc::new(CoreRuntime::init(worker_config.temporal_address(), worker_config.temporal_namespace()).await?);
    let registry = build_registry();
    let worker = Arc::new(TemporalWorker::new(
        runtime,
        worker_config.temporal_task_queue(),
        registry,
        dependencies,
        worker_config.max_activities_per_worker() as usize,
    ));

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };
    worker.run(shutdown).await
}
