//! Postgres-backed event log

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::warn;

use super::EventSink;
use crate::error::OrchestrationError;
use crate::models::{ThinkingEvent, WorkflowEvent};
use crate::Result;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct PgEventSink {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PgEventSink {
    /// Pool connects on first query.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(|e| OrchestrationError::Database(e.to_string()))?;

        Ok(Self {
            pool,
            schema_ready: OnceCell::new(),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS agent_thinking_logs (
                      id BIGSERIAL PRIMARY KEY,
                      agent_name TEXT NOT NULL,
                      thinking_stage TEXT NOT NULL,
                      thought_content TEXT NOT NULL,
                      conversation_id UUID NOT NULL,
                      session_id UUID NOT NULL,
                      agent_id TEXT NOT NULL,
                      model_deployment_name TEXT NOT NULL,
                      thread_id TEXT,
                      thinking_stage_output TEXT,
                      agent_output TEXT,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS agent_events (
                      id BIGSERIAL PRIMARY KEY,
                      agent_name TEXT NOT NULL,
                      action TEXT NOT NULL,
                      result_summary TEXT NOT NULL,
                      conversation_id UUID NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_agent_thinking_logs_conversation
                    ON agent_thinking_logs (conversation_id, created_at);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::Database(format!("Failed to initialize event log schema: {}", e))
            })?;

        Ok(())
    }

    /// Run `op` up to `MAX_ATTEMPTS` times, `RETRY_DELAY` apart.
    async fn with_retry<F, Fut>(&self, what: &str, mut op: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<(), sqlx::Error>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(()) => return Ok(()),
                Err(error) if attempt < MAX_ATTEMPTS => {
                    warn!(attempt, "Failed to write {}, retrying: {}", what, error);
                    tokio::time::sleep(RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(OrchestrationError::Database(format!(
                        "Failed to write {} after {} attempts: {}",
                        what, MAX_ATTEMPTS, error
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl EventSink for PgEventSink {
    async fn record_thinking(&self, event: ThinkingEvent) -> Result<()> {
        self.ensure_schema().await?;

        let pool = &self.pool;
        let event = &event;
        self.with_retry("thinking event", move || async move {
            sqlx::query(
                r#"
                INSERT INTO agent_thinking_logs (
                  agent_name, thinking_stage, thought_content, conversation_id,
                  session_id, agent_id, model_deployment_name, thread_id,
                  thinking_stage_output, agent_output, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(&event.agent_name)
            .bind(event.thinking_stage.as_str())
            .bind(&event.thought_content)
            .bind(event.conversation_id)
            .bind(event.session_id)
            .bind(&event.agent_id)
            .bind(&event.model_deployment_name)
            .bind(&event.thread_id)
            .bind(&event.thinking_stage_output)
            .bind(&event.agent_output)
            .bind(event.created_at)
            .execute(pool)
            .await
            .map(|_| ())
        })
        .await
    }

    async fn record_workflow_event(&self, event: WorkflowEvent) -> Result<()> {
        self.ensure_schema().await?;

        let pool = &self.pool;
        let event = &event;
        self.with_retry("workflow event", move || async move {
            sqlx::query(
                r#"
                INSERT INTO agent_events (
                  agent_name, action, result_summary, conversation_id, created_at
                )
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&event.agent_name)
            .bind(&event.action)
            .bind(&event.result_summary)
            .bind(event.conversation_id)
            .bind(event.created_at)
            .execute(pool)
            .await
            .map(|_| ())
        })
        .await
    }
}
