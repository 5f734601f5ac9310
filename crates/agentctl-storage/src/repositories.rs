//! Repository layer: one `Database` wrapper around a `PgPool`, with one
//! method per query. Every `UPDATE` uses `COALESCE` over an `Option<T>`
//! input struct so callers can patch a subset of columns.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::*;

/// Embedded at compile time from `migrations/`; run once at startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============================================
    // Agents
    // ============================================

    pub async fn create_agent(&self, input: CreateAgent) -> Result<AgentRow> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            INSERT INTO agents (id, name, description, workflow_name, workflow_queue_name, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING id, name, description, workflow_name, workflow_queue_name, docker_image,
                      status, status_reason, build_job_name, build_job_namespace, created_at, updated_at
            "#,
        )
        .bind(input.id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.workflow_name)
        .bind(&input.workflow_queue_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_agent(&self, id: Uuid) -> Result<Option<AgentRow>> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT id, name, description, workflow_name, workflow_queue_name, docker_image,
                   status, status_reason, build_job_name, build_job_namespace, created_at, updated_at
            FROM agents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_agent_by_name(&self, name: &str) -> Result<Option<AgentRow>> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT id, name, description, workflow_name, workflow_queue_name, docker_image,
                   status, status_reason, build_job_name, build_job_namespace, created_at, updated_at
            FROM agents
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn update_agent_status(&self, id: Uuid, input: UpdateAgentStatus) -> Result<Option<AgentRow>> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            UPDATE agents
            SET
                status = COALESCE($2, status),
                status_reason = COALESCE($3, status_reason),
                docker_image = COALESCE($4, docker_image),
                build_job_name = COALESCE($5, build_job_name),
                build_job_namespace = COALESCE($6, build_job_namespace),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, workflow_name, workflow_queue_name, docker_image,
                      status, status_reason, build_job_name, build_job_namespace, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&input.status)
        .bind(&input.status_reason)
        .bind(&input.docker_image)
        .bind(&input.build_job_name)
        .bind(&input.build_job_namespace)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentRow>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT id, name, description, workflow_name, workflow_queue_name, docker_image,
                   status, status_reason, build_job_name, build_job_namespace, created_at, updated_at
            FROM agents
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn delete_agent(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM agents WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    // ============================================
    // Tasks
    // ============================================

    pub async fn create_task(&self, input: CreateTask) -> Result<TaskRow> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO tasks (id, agent_id, prompt, require_approval)
            VALUES ($1, $2, $3, $4)
            RETURNING id, agent_id, prompt, require_approval, status, status_reason, created_at, updated_at
            "#,
        )
        .bind(input.id)
        .bind(input.agent_id)
        .bind(&input.prompt)
        .bind(input.require_approval)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<TaskRow>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, agent_id, prompt, require_approval, status, status_reason, created_at, updated_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn update_task_status(&self, id: Uuid, input: UpdateTaskStatus) -> Result<Option<TaskRow>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
            SET
                status = COALESCE($2, status),
                status_reason = COALESCE($3, status_reason),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, agent_id, prompt, require_approval, status, status_reason, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&input.status)
        .bind(&input.status_reason)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_tasks_for_agent(&self, agent_id: Uuid) -> Result<Vec<TaskRow>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, agent_id, prompt, require_approval, status, status_reason, created_at, updated_at
            FROM tasks
            WHERE agent_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
