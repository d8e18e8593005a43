//! One agent turn: events, timeout, citation merge.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::agent::AgentHandle;
use crate::audit::EventSink;
use crate::citation::CitationCache;
use crate::error::OrchestrationError;
use crate::models::{RunContext, ThinkingEvent, ThinkingStage};
use crate::Result;

/// Shared by both executors so a turn looks the same on either path.
#[derive(Clone)]
pub struct TurnRunner {
    events: Arc<dyn EventSink>,
    citations: Arc<CitationCache>,
    timeout: Duration,
}

impl TurnRunner {
    pub fn new(events: Arc<dyn EventSink>, citations: Arc<CitationCache>, timeout: Duration) -> Self {
        Self {
            events,
            citations,
            timeout,
        }
    }

    /// Run one turn. A timeout is a model invocation failure for that turn.
    pub async fn run(
        &self,
        ctx: &RunContext,
        agent: &dyn AgentHandle,
        prompt: &str,
        search_query: Option<&str>,
    ) -> Result<String> {
        self.run_call(ctx, agent, search_query, agent.respond(prompt)).await
    }

    /// Same as `run`, with the model call supplied by the caller (chat
    /// sessions continue a thread instead of sending a single prompt).
    pub async fn run_call<F>(
        &self,
        ctx: &RunContext,
        agent: &dyn AgentHandle,
        search_query: Option<&str>,
        call: F,
    ) -> Result<String>
    where
        F: Future<Output = Result<String>> + Send,
    {
        let role = agent.role();

        self.emit(
            ctx,
            agent,
            role.opening_stage(),
            format!("{} started its turn", agent.definition().display_name),
            None,
            None,
        )
        .await;

        if let Some(query) = search_query {
            self.emit(
                ctx,
                agent,
                ThinkingStage::SearchAttempt,
                format!("Searching {} risk", role.search_key().unwrap_or("risk")),
                Some(query.to_string()),
                None,
            )
            .await;
        }

        let output = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(OrchestrationError::ModelInvocation(format!(
                    "{} did not respond within {}s",
                    role,
                    self.timeout.as_secs_f32()
                )))
            }
        };

        let output = if role.is_risk() {
            let key = agent
                .thread_id()
                .unwrap_or_else(|| agent.definition().agent_id());
            self.citations.enhance_for(&key, &output).await
        } else {
            output
        };

        debug!(agent = %role, chars = output.len(), "Turn finished");

        self.emit(
            ctx,
            agent,
            role.closing_stage(),
            format!("{} finished its turn", agent.definition().display_name),
            None,
            Some(output.clone()),
        )
        .await;

        Ok(output)
    }

    async fn emit(
        &self,
        ctx: &RunContext,
        agent: &dyn AgentHandle,
        stage: ThinkingStage,
        thought: String,
        stage_output: Option<String>,
        agent_output: Option<String>,
    ) {
        let definition = agent.definition();
        let event = ThinkingEvent {
            agent_name: definition.role.as_str().to_string(),
            thinking_stage: stage,
            thought_content: thought,
            conversation_id: ctx.workflow_run_id,
            session_id: ctx.session_id,
            agent_id: definition.agent_id(),
            model_deployment_name: definition.bound_model.clone(),
            thread_id: agent.thread_id(),
            thinking_stage_output: stage_output,
            agent_output,
            created_at: chrono::Utc::now(),
        };

        if let Err(error) = self.events.record_thinking(event).await {
            warn!(stage = stage.as_str(), "Failed to record thinking event: {}", error);
        }
    }
}
