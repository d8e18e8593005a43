//! Workflow manager - one entry point per run and per chat message
//!
//! Owns the process-wide pieces (settings, model client provider, event
//! sink, report store) and builds everything per-run from them.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::{AgentDefinition, AgentHandle, AgentRoster, InstructionSet, ModelAgent, ThreadedAgent};
use crate::audit::{record_workflow, EventSink};
use crate::citation::CitationCache;
use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::gemini::ModelClientProvider;
use crate::models::{AgentRole, RunContext, RunStatus, WorkflowEvent, WorkflowRun};
use crate::orchestrator::{
    Orchestrator, OrchestratorBuild, OrchestratorOptions, SequentialFallbackExecutor, TurnRunner,
    WorkflowExecutor,
};
use crate::prompt;
use crate::report::{apply_envelope, ReportStore};
use crate::Result;

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: Uuid,
    pub conversation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub response: String,
}

struct ChatSession {
    conversation_id: Uuid,
    agent: Arc<ThreadedAgent>,
    last_active: Mutex<Instant>,
}

impl ChatSession {
    async fn touch(&self) {
        *self.last_active.lock().await = Instant::now();
    }

    async fn idle_for(&self) -> Duration {
        self.last_active.lock().await.elapsed()
    }
}

pub struct WorkflowManager {
    settings: Arc<Settings>,
    instructions: Arc<InstructionSet>,
    provider: Arc<dyn ModelClientProvider>,
    events: Arc<dyn EventSink>,
    reports: Option<Arc<dyn ReportStore>>,
    sessions: RwLock<HashMap<Uuid, Arc<ChatSession>>>,
}

impl WorkflowManager {
    pub fn new(
        settings: Arc<Settings>,
        provider: Arc<dyn ModelClientProvider>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let instructions = Arc::new(InstructionSet::from_settings(&settings));
        Self {
            settings,
            instructions,
            provider,
            events,
            reports: None,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Save successful reports and append the result envelope.
    pub fn with_report_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.reports = Some(store);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn turn_runner(&self, citations: Arc<CitationCache>) -> TurnRunner {
        TurnRunner::new(Arc::clone(&self.events), citations, self.settings.turn_timeout)
    }

    /// Run one workflow with fresh correlation ids.
    pub async fn run_workflow(&self, cancel: &CancellationToken) -> WorkflowRun {
        self.run_workflow_with(RunContext::new(), cancel).await
    }

    pub async fn run_workflow_with(&self, ctx: RunContext, cancel: &CancellationToken) -> WorkflowRun {
        info!(
            workflow_run_id = %ctx.workflow_run_id,
            session_id = %ctx.session_id,
            "Workflow starting"
        );
        record_workflow(
            self.events.as_ref(),
            WorkflowEvent::orchestrator("Start Workflow", "Workflow run started", ctx.workflow_run_id),
        )
        .await;

        let executor = match self.prepare(&ctx).await {
            Ok(executor) => executor,
            Err(e) => {
                error!(workflow_run_id = %ctx.workflow_run_id, "Workflow setup failed: {}", e);
                record_workflow(
                    self.events.as_ref(),
                    WorkflowEvent::orchestrator("Workflow Setup Error", e.to_string(), ctx.workflow_run_id),
                )
                .await;
                return WorkflowRun::start(&ctx, None).fail(&e, Vec::new());
            }
        };

        let initial = prompt::initial_message(&ctx, &self.settings.model_name);
        let mut run = executor.execute(&ctx, &initial, cancel).await;

        if run.status == RunStatus::Success {
            if let (Some(store), Some(report)) = (&self.reports, run.report.as_deref()) {
                let saved = store.save(&ctx, report).await;
                run.report = Some(apply_envelope(report, &saved));
            }
        }

        let (action, summary) = match run.status {
            RunStatus::Success => (
                "Complete Workflow",
                format!("Workflow completed via {:?}", executor.path()),
            ),
            _ => (
                "Workflow Error",
                run.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            ),
        };
        record_workflow(
            self.events.as_ref(),
            WorkflowEvent::orchestrator(action, summary, ctx.workflow_run_id),
        )
        .await;

        info!(
            workflow_run_id = %ctx.workflow_run_id,
            status = ?run.status,
            turns = run.history.len(),
            "Workflow finished"
        );
        run
    }

    /// Client, roster, citation cache and executor for one run.
    async fn prepare(&self, ctx: &RunContext) -> Result<Box<dyn WorkflowExecutor>> {
        let client = self.provider.client().await?;
        let roster = AgentRoster::build(client, &self.instructions, &self.settings);
        let turns = self.turn_runner(Arc::new(CitationCache::new()));
        let options = OrchestratorOptions::from_settings(&self.settings);

        match Orchestrator::build(&roster, &options, turns.clone()) {
            OrchestratorBuild::Ready(orchestrator) => Ok(Box::new(orchestrator)),
            OrchestratorBuild::Unavailable(reason) => {
                warn!(
                    workflow_run_id = %ctx.workflow_run_id,
                    "{}; using sequential fallback",
                    OrchestrationError::OrchestratorUnavailable(reason)
                );
                Ok(Box::new(SequentialFallbackExecutor::from_roster(&roster, turns)?))
            }
        }
    }

    async fn session(&self, session_id: Uuid) -> Result<Arc<ChatSession>> {
        if let Some(session) = self.sessions.read().await.get(&session_id).cloned() {
            session.touch().await;
            return Ok(session);
        }

        let client = self.provider.client().await?;
        let definition = AgentDefinition::new(
            AgentRole::Assistant,
            &self.settings.model_name,
            self.instructions.for_role(AgentRole::Assistant),
        );
        let template: Arc<dyn AgentHandle> = Arc::new(ModelAgent::new(definition, client));

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(session_id).or_insert_with(|| {
            Arc::new(ChatSession {
                conversation_id: Uuid::new_v4(),
                agent: Arc::new(ThreadedAgent::new(template)),
                last_active: Mutex::new(Instant::now()),
            })
        });
        Ok(Arc::clone(session))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle for at least `max_idle`. Returns how many went.
    pub async fn prune_idle_sessions(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut stale = Vec::new();
        for (id, session) in sessions.iter() {
            if session.idle_for().await >= max_idle {
                stale.push(*id);
            }
        }
        for id in &stale {
            sessions.remove(id);
        }
        if !stale.is_empty() {
            info!(pruned = stale.len(), remaining = sessions.len(), "Pruned idle chat sessions");
        }
        stale.len()
    }

    /// Drop every chat session. Called on shutdown.
    pub async fn cleanup_all_sessions(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        info!(count, "Cleaned up all chat sessions");
        count
    }

    /// Answer one chat message. A missing session id starts a new session;
    /// each session keeps a single thread.
    pub async fn chat(&self, session_id: Option<Uuid>, message: &str) -> Result<ChatReply> {
        let session_id = session_id.unwrap_or_else(Uuid::new_v4);
        let session = self.session(session_id).await?;
        let ctx = RunContext {
            workflow_run_id: session.conversation_id,
            session_id,
        };

        let agent = Arc::clone(&session.agent);
        let response = self
            .turn_runner(Arc::new(CitationCache::new()))
            .run_call(&ctx, agent.as_ref(), None, async {
                agent.send(message).await.map(|reply| reply.content)
            })
            .await?;

        Ok(ChatReply {
            session_id,
            conversation_id: session.conversation_id,
            thread_id: agent.thread_id(),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::ScriptedClient;
    use crate::audit::InMemoryEventSink;
    use crate::gemini::{GeminiProvider, ModelClient};
    use crate::report::{FileReportStore, FAILURE_MARKER, SUCCESS_MARKER};
    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    const SCHEDULE: &str =
        r#"{"searchQuery": {"political": "Q1", "tariff": "Q2", "logistics": "Q3"}}"#;

    struct FixedProvider(Arc<ScriptedClient>);

    #[async_trait]
    impl ModelClientProvider for FixedProvider {
        async fn client(&self) -> Result<Arc<dyn ModelClient>> {
            Ok(self.0.clone())
        }
    }

    fn manager(client: ScriptedClient, settings: Settings) -> (WorkflowManager, Arc<ScriptedClient>, Arc<InMemoryEventSink>) {
        let client = Arc::new(client);
        let events = Arc::new(InMemoryEventSink::new());
        let manager = WorkflowManager::new(
            Arc::new(settings),
            Arc::new(FixedProvider(client.clone())),
            events.clone(),
        );
        (manager, client, events)
    }

    fn full_script() -> ScriptedClient {
        ScriptedClient::new()
            .reply(AgentRole::Scheduler, SCHEDULE)
            .reply(AgentRole::PoliticalRisk, "P")
            .reply(AgentRole::TariffRisk, "T")
            .reply(AgentRole::LogisticsRisk, "L")
            .reply(AgentRole::Reporting, "# Report")
    }

    async fn actions(events: &InMemoryEventSink) -> Vec<String> {
        events
            .workflow_events()
            .await
            .into_iter()
            .map(|e| e.action)
            .collect()
    }

    #[tokio::test]
    async fn test_client_failure_reports_setup_error() {
        let events = Arc::new(InMemoryEventSink::new());
        let manager = WorkflowManager::new(
            Arc::new(Settings::default()),
            Arc::new(GeminiProvider::new(Arc::new(Settings::default()))),
            events.clone(),
        );

        let run = manager.run_workflow(&CancellationToken::new()).await;
        let json = serde_json::to_value(run.result()).unwrap();

        assert_eq!(json["status"], "error");
        assert!(!json["error"].as_str().unwrap().is_empty());
        assert_eq!(json["workflow_run_id"], run.workflow_run_id.to_string());
        assert!(run.history.is_empty());
        assert!(events.thinking_events().await.is_empty());
        assert_eq!(actions(&events).await, vec!["Start Workflow", "Workflow Setup Error"]);
    }

    #[tokio::test]
    async fn test_group_chat_run_records_lifecycle() {
        let (manager, _client, events) = manager(full_script(), Settings::default());

        let run = manager.run_workflow(&CancellationToken::new()).await;

        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.report.as_deref(), Some("# Report"));
        assert_eq!(actions(&events).await, vec!["Start Workflow", "Complete Workflow"]);

        let thinking = events.thinking_for_run(run.workflow_run_id).await;
        assert!(!thinking.is_empty());
        assert!(thinking.iter().all(|e| e.session_id == run.session_id));
    }

    #[tokio::test]
    async fn test_disabled_group_chat_uses_fallback() {
        let mut settings = Settings::default();
        settings.group_chat_enabled = false;
        let client = ScriptedClient::new()
            .reply(AgentRole::Scheduler, SCHEDULE)
            .reply(AgentRole::Reporting, "# Fallback report");
        let (manager, client, _events) = manager(client, settings);

        let run = manager.run_workflow(&CancellationToken::new()).await;

        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.report.as_deref(), Some("# Fallback report"));
        assert!(client.calls_for(AgentRole::TariffRisk).is_empty());
    }

    #[tokio::test]
    async fn test_envelope_applied_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _client, _events) = manager(full_script(), Settings::default());
        let manager = manager.with_report_store(Arc::new(FileReportStore::new(dir.path(), None)));

        let run = manager.run_workflow(&CancellationToken::new()).await;
        let report = run.report.unwrap();

        assert!(report.starts_with("# Report"));
        assert!(report.contains(SUCCESS_MARKER));
        assert!(report.contains("Filename: risk_report_"));
    }

    #[tokio::test]
    async fn test_envelope_failure_notice() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let (manager, _client, _events) = manager(full_script(), Settings::default());
        let manager = manager.with_report_store(Arc::new(FileReportStore::new(&blocker, None)));

        let run = manager.run_workflow(&CancellationToken::new()).await;
        assert_eq!(run.status, RunStatus::Success);
        assert!(run.report.unwrap().contains(FAILURE_MARKER));
    }

    #[tokio::test]
    async fn test_failed_run_records_error_event() {
        let client = ScriptedClient::new().fail(AgentRole::Scheduler, "model down");
        let (manager, _client, events) = manager(client, Settings::default());

        let run = manager.run_workflow(&CancellationToken::new()).await;

        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(actions(&events).await, vec!["Start Workflow", "Workflow Error"]);
        let last = events.workflow_events().await.pop().unwrap();
        assert!(last.result_summary.contains("model down"));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let mut script = ScriptedClient::new();
        for _ in 0..2 {
            script = script
                .reply(AgentRole::Scheduler, SCHEDULE)
                .reply(AgentRole::Reporting, "# Report");
        }
        let mut settings = Settings::default();
        settings.risk_agents_enabled = false;
        let (manager, _client, _events) = manager(script, settings);

        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(manager.run_workflow(&cancel), manager.run_workflow(&cancel));

        assert_eq!(a.status, RunStatus::Success);
        assert_eq!(b.status, RunStatus::Success);
        assert_ne!(a.workflow_run_id, b.workflow_run_id);
    }

    #[tokio::test]
    async fn test_chat_keeps_one_thread_per_session() {
        let client = ScriptedClient::new()
            .reply(AgentRole::Assistant, "Hello.")
            .reply(AgentRole::Assistant, "Still here.");
        let (manager, client, events) = manager(client, Settings::default());

        let first = assert_ok!(manager.chat(None, "hi").await);
        let second = assert_ok!(manager.chat(Some(first.session_id), "and now?").await);

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(first.thread_id, second.thread_id);
        assert_eq!(second.response, "Still here.");
        assert!(client.calls_for(AgentRole::Assistant)[1].prompt.contains("Hello."));

        let stages: Vec<_> = events
            .thinking_for_run(first.conversation_id)
            .await
            .into_iter()
            .map(|e| e.thinking_stage)
            .collect();
        assert_eq!(stages.len(), 4);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_pruned() {
        let client = ScriptedClient::new()
            .reply(AgentRole::Assistant, "a")
            .reply(AgentRole::Assistant, "b");
        let (manager, _client, _events) = manager(client, Settings::default());

        assert_ok!(manager.chat(None, "one").await);
        assert_ok!(manager.chat(None, "two").await);
        assert_eq!(manager.session_count().await, 2);

        assert_eq!(manager.prune_idle_sessions(Duration::from_secs(3600)).await, 0);
        assert_eq!(manager.session_count().await, 2);

        assert_eq!(manager.prune_idle_sessions(Duration::ZERO).await, 2);
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_all_sessions_starts_fresh_threads() {
        let client = ScriptedClient::new()
            .reply(AgentRole::Assistant, "first")
            .reply(AgentRole::Assistant, "second");
        let (manager, client, _events) = manager(client, Settings::default());

        let before = assert_ok!(manager.chat(None, "hi").await);
        assert_eq!(manager.cleanup_all_sessions().await, 1);
        assert_eq!(manager.session_count().await, 0);

        let after = assert_ok!(manager.chat(Some(before.session_id), "hi again").await);
        assert_ne!(after.conversation_id, before.conversation_id);
        assert_ne!(after.thread_id, before.thread_id);
        assert_eq!(client.calls_for(AgentRole::Assistant)[1].prompt, "hi again");
    }

    #[tokio::test]
    async fn test_chat_error_propagates() {
        let client = ScriptedClient::new().fail(AgentRole::Assistant, "quota");
        let (manager, _client, _events) = manager(client, Settings::default());
        assert_err!(manager.chat(None, "hi").await);
    }
}
