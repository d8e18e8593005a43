//! Thinking and workflow event log
//!
//! Every agent turn leaves a trail of thinking events; every run leaves
//! workflow lifecycle events. Both are keyed by the run's correlation ids.

pub mod postgres;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::models::{ThinkingEvent, WorkflowEvent};
use crate::Result;

pub use postgres::PgEventSink;

/// Destination for audit events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record_thinking(&self, event: ThinkingEvent) -> Result<()>;
    async fn record_workflow_event(&self, event: WorkflowEvent) -> Result<()>;
}

/// Default number of events of each kind kept in memory.
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

/// In-memory event log for development and tests. Bounded: once full, the
/// oldest event of the same kind is dropped.
pub struct InMemoryEventSink {
    capacity: usize,
    thinking: RwLock<VecDeque<ThinkingEvent>>,
    workflow: RwLock<VecDeque<WorkflowEvent>>,
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            thinking: RwLock::new(VecDeque::new()),
            workflow: RwLock::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn thinking_events(&self) -> Vec<ThinkingEvent> {
        self.thinking.read().await.iter().cloned().collect()
    }

    /// Thinking events of one run, in emission order
    pub async fn thinking_for_run(&self, run_id: Uuid) -> Vec<ThinkingEvent> {
        self.thinking
            .read()
            .await
            .iter()
            .filter(|e| e.conversation_id == run_id)
            .cloned()
            .collect()
    }

    pub async fn workflow_events(&self) -> Vec<WorkflowEvent> {
        self.workflow.read().await.iter().cloned().collect()
    }
}

fn push_bounded<T>(log: &mut VecDeque<T>, item: T, capacity: usize) {
    while log.len() >= capacity {
        log.pop_front();
    }
    log.push_back(item);
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn record_thinking(&self, event: ThinkingEvent) -> Result<()> {
        push_bounded(&mut *self.thinking.write().await, event, self.capacity);
        Ok(())
    }

    async fn record_workflow_event(&self, event: WorkflowEvent) -> Result<()> {
        push_bounded(&mut *self.workflow.write().await, event, self.capacity);
        Ok(())
    }
}

/// Postgres when a postgres URL is configured, memory otherwise.
pub fn build_event_sink(settings: &Settings) -> Arc<dyn EventSink> {
    if let Some(url) = settings.postgres_url() {
        match PgEventSink::connect_lazy(url) {
            Ok(sink) => {
                info!("Event log backend: postgres");
                return Arc::new(sink);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres event log, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!(capacity = settings.event_log_capacity, "Event log backend: in-memory");
    Arc::new(InMemoryEventSink::with_capacity(settings.event_log_capacity))
}

/// Record a workflow event; failures are logged, never propagated.
pub async fn record_workflow(sink: &dyn EventSink, event: WorkflowEvent) {
    let action = event.action.clone();
    if let Err(error) = sink.record_workflow_event(event).await {
        warn!(action = %action, "Failed to record workflow event: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThinkingStage;
    use chrono::Utc;

    fn thinking(run: Uuid, stage: ThinkingStage) -> ThinkingEvent {
        ThinkingEvent {
            agent_name: "SCHEDULER_AGENT".into(),
            thinking_stage: stage,
            thought_content: "thinking".into(),
            conversation_id: run,
            session_id: Uuid::new_v4(),
            agent_id: "local-SCHEDULER_AGENT".into(),
            model_deployment_name: "m".into(),
            thread_id: None,
            thinking_stage_output: None,
            agent_output: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_filters_by_run() {
        let sink = InMemoryEventSink::new();
        let run = Uuid::new_v4();

        sink.record_thinking(thinking(run, ThinkingStage::AnalysisStart)).await.unwrap();
        sink.record_thinking(thinking(Uuid::new_v4(), ThinkingStage::AnalysisStart)).await.unwrap();
        sink.record_thinking(thinking(run, ThinkingStage::Recommendations)).await.unwrap();

        let events = sink.thinking_for_run(run).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].thinking_stage, ThinkingStage::Recommendations);
        assert_eq!(sink.thinking_events().await.len(), 3);
    }

    #[tokio::test]
    async fn test_record_workflow_keeps_order() {
        let sink = InMemoryEventSink::new();
        let run = Uuid::new_v4();

        record_workflow(&sink, WorkflowEvent::orchestrator("Start Workflow", "started", run)).await;
        record_workflow(&sink, WorkflowEvent::orchestrator("Complete Workflow", "done", run)).await;

        let actions: Vec<String> = sink
            .workflow_events()
            .await
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["Start Workflow", "Complete Workflow"]);
    }

    #[tokio::test]
    async fn test_in_memory_drops_oldest_when_full() {
        let sink = InMemoryEventSink::with_capacity(2);
        let run = Uuid::new_v4();

        for stage in [
            ThinkingStage::AnalysisStart,
            ThinkingStage::SearchAttempt,
            ThinkingStage::Recommendations,
        ] {
            sink.record_thinking(thinking(run, stage)).await.unwrap();
        }
        for action in ["Start Workflow", "Complete Workflow", "Start Workflow"] {
            record_workflow(&sink, WorkflowEvent::orchestrator(action, "x", run)).await;
        }

        let stages: Vec<ThinkingStage> = sink
            .thinking_events()
            .await
            .iter()
            .map(|e| e.thinking_stage)
            .collect();
        assert_eq!(
            stages,
            vec![ThinkingStage::SearchAttempt, ThinkingStage::Recommendations]
        );
        assert_eq!(sink.workflow_events().await.len(), 2);
    }

    #[test]
    fn test_default_sink_is_bounded() {
        assert_eq!(InMemoryEventSink::new().capacity(), DEFAULT_EVENT_CAPACITY);
        assert_eq!(InMemoryEventSink::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn test_builds_memory_sink_without_postgres() {
        let mut settings = Settings::default();
        settings.database_url = Some("sqlite:///local.db".into());
        // Only checks construction does not panic or touch the network.
        let _sink = build_event_sink(&settings);
    }
}
