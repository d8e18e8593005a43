//! Group-chat orchestrator - drives the turn loop
//!
//! SELECT → RESPOND → APPEND → TERMINATE?
//!
//! Construction is a two-stage factory: `Orchestrator::build` returns either
//! a ready orchestrator or the reason it is unavailable, and the caller picks
//! the sequential fallback on `Unavailable`.

pub mod fallback;
pub mod turn;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::{AgentHandle, AgentRoster, ThreadedAgent};
use crate::config::Settings;
use crate::conversation::{ConversationState, Phase, Speaker};
use crate::error::OrchestrationError;
use crate::models::{AgentRole, ExecutionPath, RunContext, WorkflowRun};
use crate::prompt;
use crate::schedule::StructuredScheduleOutput;
use crate::strategy::{
    PhaseSelection, SelectionStrategy, TerminalAgentTermination, Termination, TerminationStrategy,
};
use crate::Result;

pub use fallback::SequentialFallbackExecutor;
pub use turn::TurnRunner;

/// Anything that can take a run from its initial prompt to a terminal
/// `WorkflowRun`. Never returns a bare error: failures end up in the run.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    fn path(&self) -> ExecutionPath;

    async fn execute(
        &self,
        ctx: &RunContext,
        initial_prompt: &str,
        cancel: &CancellationToken,
    ) -> WorkflowRun;
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub enabled: bool,
    pub max_turns: usize,
    pub turn_timeout: Duration,
}

impl OrchestratorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enabled: settings.group_chat_enabled,
            max_turns: settings.max_turns,
            turn_timeout: settings.turn_timeout,
        }
    }
}

pub enum OrchestratorBuild {
    Ready(Orchestrator),
    Unavailable(String),
}

pub struct Orchestrator {
    agents: HashMap<AgentRole, Arc<dyn AgentHandle>>,
    selection: Box<dyn SelectionStrategy>,
    termination: Box<dyn TerminationStrategy>,
    turns: TurnRunner,
}

impl Orchestrator {
    /// Bind the roster for one run. Every agent gets its own thread adapter,
    /// so a run has exactly one thread per agent.
    pub fn build(roster: &AgentRoster, options: &OrchestratorOptions, turns: TurnRunner) -> OrchestratorBuild {
        if !options.enabled {
            return OrchestratorBuild::Unavailable("group chat is disabled".to_string());
        }
        if options.max_turns == 0 {
            return OrchestratorBuild::Unavailable("max_turns must be at least 1".to_string());
        }

        let roles = roster.roles();
        let mut seen = HashSet::new();
        if let Some(dup) = roles.iter().find(|r| !seen.insert(**r)) {
            return OrchestratorBuild::Unavailable(format!("{} is registered twice", dup));
        }
        for required in [AgentRole::Scheduler, AgentRole::Reporting] {
            if !roster.contains(required) {
                return OrchestratorBuild::Unavailable(format!("{} is not in the roster", required));
            }
        }

        let agents = roster
            .iter()
            .map(|template| {
                let bound: Arc<dyn AgentHandle> = Arc::new(ThreadedAgent::new(Arc::clone(template)));
                (template.role(), bound)
            })
            .collect();

        OrchestratorBuild::Ready(Self {
            agents,
            selection: Box::new(PhaseSelection::new(roles)),
            termination: Box::new(TerminalAgentTermination::new(
                AgentRole::Reporting,
                options.max_turns,
            )),
            turns,
        })
    }

    /// The risk agent's own query from the latest scheduler output.
    fn search_query_for(state: &ConversationState, role: AgentRole) -> Result<String> {
        let schedule = state.last_turn_by(AgentRole::Scheduler).ok_or_else(|| {
            OrchestrationError::ContractViolation("no scheduler output to read searchQuery from".to_string())
        })?;
        let parsed = StructuredScheduleOutput::parse(&schedule.content)?;
        Ok(parsed.search_query.for_role(role)?.to_string())
    }

    async fn take_turn(
        &self,
        ctx: &RunContext,
        state: &mut ConversationState,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(OrchestrationError::Cancelled(
                "run cancelled between turns".to_string(),
            ));
        }

        match self.termination.evaluate(state.turns()) {
            Termination::Continue => {}
            Termination::Complete => {
                state.set_phase(Phase::Done);
                return Ok(false);
            }
            Termination::TurnLimitExceeded { turns, max } => {
                return Err(OrchestrationError::TurnLimitExceeded { turns, max });
            }
        }

        let selection = self.selection.select(state.turns(), state.phase())?;
        state.set_phase(selection.phase);

        let agent = self.agents.get(&selection.agent).ok_or_else(|| {
            OrchestrationError::InvalidState(format!("{} was selected but is not bound", selection.agent))
        })?;

        let search_query = if selection.agent.is_risk() {
            Some(Self::search_query_for(state, selection.agent)?)
        } else {
            None
        };

        let model = &agent.definition().bound_model;
        let prompt = prompt::turn_prompt(
            ctx,
            model,
            selection.phase,
            selection.agent,
            state.turns(),
            search_query.as_deref(),
        );

        info!(
            workflow_run_id = %ctx.workflow_run_id,
            agent = %selection.agent,
            phase = %selection.phase,
            turn = state.agent_turn_count() + 1,
            "Agent turn"
        );

        let output = self
            .turns
            .run(ctx, agent.as_ref(), &prompt, search_query.as_deref())
            .await?;
        state.append(Speaker::Agent(selection.agent), output);

        Ok(true)
    }
}

#[async_trait]
impl WorkflowExecutor for Orchestrator {
    fn path(&self) -> ExecutionPath {
        ExecutionPath::GroupChat
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        initial_prompt: &str,
        cancel: &CancellationToken,
    ) -> WorkflowRun {
        let run = WorkflowRun::start(ctx, Some(self.path()));
        let mut state = ConversationState::with_initial_message(ctx.workflow_run_id, initial_prompt);

        info!(
            workflow_run_id = %ctx.workflow_run_id,
            session_id = %ctx.session_id,
            agents = self.agents.len(),
            "Group chat started"
        );

        loop {
            match self.take_turn(ctx, &mut state, cancel).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    error!(
                        workflow_run_id = %ctx.workflow_run_id,
                        phase = %state.phase(),
                        turns = state.agent_turn_count(),
                        "Group chat aborted: {}", e
                    );
                    return run.fail(&e, state.into_turns());
                }
            }
        }

        let report = state
            .last_turn_by(AgentRole::Reporting)
            .map(|turn| turn.content.clone());

        match report {
            Some(report) => {
                info!(
                    workflow_run_id = %ctx.workflow_run_id,
                    turns = state.agent_turn_count(),
                    "Group chat completed"
                );
                run.complete(report, state.into_turns())
            }
            None => {
                warn!(workflow_run_id = %ctx.workflow_run_id, "Group chat ended without a report");
                let e = OrchestrationError::InvalidState("run finished without a report".to_string());
                run.fail(&e, state.into_turns())
            }
        }
    }
}
