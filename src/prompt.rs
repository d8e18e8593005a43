//! Prompt construction
//!
//! Every prompt carries the run's correlation identifiers and the bound
//! model name, so anything an agent logs can be attributed to its run.

use crate::conversation::{Phase, Speaker, Turn};
use crate::models::{AgentRole, RunContext};

pub const WORKFLOW_START_MESSAGE: &str =
    "Start the equipment schedule risk analysis workflow. Analyze the current equipment \
     schedule, research political, tariff and logistics risks for it, and produce a \
     consolidated risk report.";

fn correlation_block(ctx: &RunContext, model: &str) -> String {
    format!(
        "conversation_id: {}\nsession_id: {}\nmodel_deployment_name: {}",
        ctx.workflow_run_id, ctx.session_id, model
    )
}

/// The user message that opens a run.
pub fn initial_message(ctx: &RunContext, model: &str) -> String {
    format!(
        "{}\n\n{}",
        WORKFLOW_START_MESSAGE,
        correlation_block(ctx, model)
    )
}

fn speaker_label(speaker: &Speaker) -> &'static str {
    match speaker {
        Speaker::User => "USER",
        Speaker::Agent(role) => role.as_str(),
    }
}

/// Prompt for one group-chat turn: correlation header, the conversation so
/// far, and for risk agents their own search query.
pub fn turn_prompt(
    ctx: &RunContext,
    model: &str,
    phase: Phase,
    role: AgentRole,
    history: &[Turn],
    search_query: Option<&str>,
) -> String {
    let mut prompt = format!(
        "{}\nphase: {}\nspeaker: {}\n\nConversation so far:\n",
        correlation_block(ctx, model),
        phase,
        role
    );

    for turn in history {
        prompt.push_str(&format!(
            "[{}] {} > {}\n",
            turn.sequence,
            speaker_label(&turn.speaker),
            turn.content
        ));
    }

    if let Some(query) = search_query {
        prompt.push_str(&format!("\nSearch query: {}\n", query));
    }

    prompt
}

/// Reporting prompt for the sequential path.
pub fn fallback_reporting_prompt(scheduler_output: &str, ctx: &RunContext) -> String {
    format!(
        "Please generate a professional risk report based on the following scheduler output:\n\n\
         {}\n\n\
         Use conversation_id: {} and session_id: {} as context.",
        scheduler_output, ctx.workflow_run_id, ctx.session_id
    )
}
