//! Environment-driven configuration. One struct per bounded context, each
//! with accessor methods supplying a default rather than baking it into the
//! stored value.

/// Temporal connection and worker tuning.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub temporal_address: Option<String>,
    pub temporal_namespace: Option<String>,
    pub temporal_task_queue: Option<String>,
    pub max_activities_per_worker: Option<usize>,
    pub activity_thread_pool_size: Option<usize>,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            temporal_address: std::env::var("TEMPORAL_ADDRESS").ok(),
            temporal_namespace: std::env::var("TEMPORAL_NAMESPACE").ok(),
            temporal_task_queue: std::env::var("TEMPORAL_TASK_QUEUE").ok(),
            max_activities_per_worker: std::env::var("TEMPORAL_WORKER_MAX_ACTIVITIES_PER_WORKER")
                .ok()
                .and_then(|v| v.parse().ok()),
            activity_thread_pool_size: std::env::var("TEMPORAL_WORKER_ACTIVITY_THREAD_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    pub fn temporal_address(&self) -> String {
        self.temporal_address.clone().unwrap_or_else(|| "localhost:7233".to_string())
    }

    pub fn temporal_namespace(&self) -> String {
        self.temporal_namespace.clone().unwrap_or_else(|| "default".to_string())
    }

    pub fn temporal_task_queue(&self) -> String {
        self.temporal_task_queue.clone().unwrap_or_else(|| "agentctl-agent-workflows".to_string())
    }

    pub fn max_activities_per_worker(&self) -> usize {
        self.max_activities_per_worker.unwrap_or(100)
    }

    pub fn activity_thread_pool_size(&self) -> usize {
        self.activity_thread_pool_size.unwrap_or(10)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub database_url: Option<String>,
}

impl DatabaseConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        Ok(Self { database_url: Some(database_url) })
    }

    pub fn database_url(&self) -> &str {
        self.database_url.as_deref().expect("DatabaseConfig constructed without DATABASE_URL")
    }
}

#[derive(Debug, Clone, Default)]
pub struct KvConfig {
    pub redis_url: Option<String>,
}

impl KvConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let redis_url = std::env::var("REDIS_URL").map_err(|_| anyhow::anyhow!("REDIS_URL must be set"))?;
        Ok(Self { redis_url: Some(redis_url) })
    }

    pub fn redis_url(&self) -> &str {
        self.redis_url.as_deref().expect("KvConfig constructed without REDIS_URL")
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    pub registry_url: Option<String>,
    pub build_contexts_path: Option<String>,
    pub build_context_pvc_name: Option<String>,
    pub build_registry_secret_name: Option<String>,
}

impl BuildConfig {
    pub fn from_env() -> Self {
        Self {
            registry_url: std::env::var("BUILD_REGISTRY_URL").ok(),
            build_contexts_path: std::env::var("BUILD_CONTEXTS_PATH").ok(),
            build_context_pvc_name: std::env::var("BUILD_CONTEXT_PVC_NAME").ok(),
            build_registry_secret_name: std::env::var("BUILD_REGISTRY_SECRET_NAME").ok(),
        }
    }

    pub fn registry_url(&self) -> String {
        self.registry_url.clone().unwrap_or_else(|| "registry.internal".to_string())
    }

    pub fn build_contexts_path(&self) -> String {
        self.build_contexts_path.clone().unwrap_or_else(|| "/workspace/contexts".to_string())
    }

    pub fn build_context_pvc_name(&self) -> String {
        self.build_context_pvc_name.clone().unwrap_or_else(|| "build-contexts".to_string())
    }

    pub fn build_registry_secret_name(&self) -> String {
        self.build_registry_secret_name.clone().unwrap_or_else(|| "build-registry-secret".to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlatformConfig {
    pub agents_namespace: Option<String>,
}

impl PlatformConfig {
    pub fn from_env() -> Self {
        Self { agents_namespace: std::env::var("AGENTS_NAMESPACE").ok() }
    }

    pub fn agents_namespace(&self) -> String {
        self.agents_namespace.clone().unwrap_or_else(|| "agents".to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self { openai_api_key: std::env::var("OPENAI_API_KEY").ok() }
    }

    pub fn openai_api_key(&self) -> anyhow::Result<&str> {
        self.openai_api_key.as_deref().ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_falls_back_to_documented_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.temporal_address(), "localhost:7233");
        assert_eq!(config.temporal_namespace(), "default");
        assert_eq!(config.max_activities_per_worker(), 100);
        assert_eq!(config.activity_thread_pool_size(), 10);
    }

    #[test]
    fn build_config_falls_back_to_documented_defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.build_contexts_path(), "/workspace/contexts");
        assert_eq!(config.build_context_pvc_name(), "build-contexts");
    }
}
