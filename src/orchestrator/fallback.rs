//! Deterministic scheduler → reporting pipeline
//!
//! Used whenever the group chat cannot be built. Same inputs and the same
//! `WorkflowRun` shape as the orchestrator, no strategies involved.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{TurnRunner, WorkflowExecutor};
use crate::agent::{AgentHandle, AgentRoster};
use crate::conversation::{ConversationState, Phase, Speaker};
use crate::error::OrchestrationError;
use crate::models::{AgentRole, ExecutionPath, RunContext, WorkflowRun};
use crate::prompt;
use crate::Result;

pub struct SequentialFallbackExecutor {
    scheduler: Arc<dyn AgentHandle>,
    reporting: Arc<dyn AgentHandle>,
    turns: TurnRunner,
}

impl SequentialFallbackExecutor {
    pub fn new(scheduler: Arc<dyn AgentHandle>, reporting: Arc<dyn AgentHandle>, turns: TurnRunner) -> Self {
        Self {
            scheduler,
            reporting,
            turns,
        }
    }

    pub fn from_roster(roster: &AgentRoster, turns: TurnRunner) -> Result<Self> {
        let pick = |role: AgentRole| {
            roster.get(role).cloned().ok_or_else(|| {
                OrchestrationError::InvalidState(format!("fallback pipeline needs {}", role))
            })
        };
        Ok(Self::new(pick(AgentRole::Scheduler)?, pick(AgentRole::Reporting)?, turns))
    }

    async fn run_stages(
        &self,
        ctx: &RunContext,
        state: &mut ConversationState,
        initial_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        ensure_not_cancelled(cancel)?;

        state.set_phase(Phase::Scheduling);
        let schedule = self
            .turns
            .run(ctx, self.scheduler.as_ref(), initial_prompt, None)
            .await?;
        state.append(Speaker::Agent(AgentRole::Scheduler), schedule.clone());

        ensure_not_cancelled(cancel)?;

        state.set_phase(Phase::Reporting);
        let reporting_prompt = prompt::fallback_reporting_prompt(&schedule, ctx);
        let report = self
            .turns
            .run(ctx, self.reporting.as_ref(), &reporting_prompt, None)
            .await?;
        state.append(Speaker::Agent(AgentRole::Reporting), report.clone());
        state.set_phase(Phase::Done);

        Ok(report)
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(OrchestrationError::Cancelled(
            "run cancelled between turns".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl WorkflowExecutor for SequentialFallbackExecutor {
    fn path(&self) -> ExecutionPath {
        ExecutionPath::SequentialFallback
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        initial_prompt: &str,
        cancel: &CancellationToken,
    ) -> WorkflowRun {
        let run = WorkflowRun::start(ctx, Some(self.path()));
        let mut state = ConversationState::with_initial_message(ctx.workflow_run_id, initial_prompt);

        info!(workflow_run_id = %ctx.workflow_run_id, "Sequential fallback started");

        match self.run_stages(ctx, &mut state, initial_prompt, cancel).await {
            Ok(report) => {
                info!(workflow_run_id = %ctx.workflow_run_id, "Sequential fallback completed");
                run.complete(report, state.into_turns())
            }
            Err(e) => {
                error!(
                    workflow_run_id = %ctx.workflow_run_id,
                    phase = %state.phase(),
                    "Sequential fallback aborted: {}", e
                );
                run.fail(&e, state.into_turns())
            }
        }
    }
}
