//! Conversation state for one workflow run
//!
//! Append-only ordered history of turns plus the active phase cursor.
//! History is the audit trail of a run: it is never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::AgentRole;

/// Who produced a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent(AgentRole),
}

impl Speaker {
    pub fn agent(&self) -> Option<AgentRole> {
        match self {
            Speaker::Agent(role) => Some(*role),
            Speaker::User => None,
        }
    }
}

/// Named phases of the workflow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Scheduling,
    RiskAnalysis,
    Reporting,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Scheduling => "scheduling",
            Phase::RiskAnalysis => "risk_analysis",
            Phase::Reporting => "reporting",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// A single contribution to the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub sequence: u64,
    pub speaker: Speaker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub run_id: Uuid,
    turns: Vec<Turn>,
    phase: Phase,
}

impl ConversationState {
    /// Empty history in the `scheduling` phase.
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            turns: Vec::new(),
            phase: Phase::Scheduling,
        }
    }

    /// History seeded with the user message that starts the run.
    pub fn with_initial_message(run_id: Uuid, message: impl Into<String>) -> Self {
        let mut state = Self::new(run_id);
        state.append(Speaker::User, message);
        state
    }

    /// Append a turn. Sequence numbers start at 1 and strictly increase.
    pub fn append(&mut self, speaker: Speaker, content: impl Into<String>) -> &Turn {
        let sequence = self.turns.last().map(|t| t.sequence + 1).unwrap_or(1);
        self.turns.push(Turn {
            sequence,
            speaker,
            content: content.into(),
            timestamp: Utc::now(),
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Number of turns produced by agents (the user message is not counted).
    pub fn agent_turn_count(&self) -> usize {
        agent_turn_count(&self.turns)
    }

    /// Most recent turn spoken by `role`.
    pub fn last_turn_by(&self, role: AgentRole) -> Option<&Turn> {
        last_turn_by(&self.turns, role)
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

// =============================
// Slice helpers (shared with the strategies)
// =============================

pub fn agent_turn_count(turns: &[Turn]) -> usize {
    turns.iter().filter(|t| t.speaker.agent().is_some()).count()
}

pub fn last_agent_turn(turns: &[Turn]) -> Option<&Turn> {
    turns.iter().rev().find(|t| t.speaker.agent().is_some())
}

pub fn last_turn_by(turns: &[Turn], role: AgentRole) -> Option<&Turn> {
    turns
        .iter()
        .rev()
        .find(|t| t.speaker == Speaker::Agent(role))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_numbers_strictly_increase() {
        let mut state = ConversationState::with_initial_message(Uuid::new_v4(), "start");
        state.append(Speaker::Agent(AgentRole::Scheduler), "a");
        state.append(Speaker::Agent(AgentRole::Reporting), "b");

        let sequences: Vec<u64> = state.turns().iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(state.agent_turn_count(), 2);
    }

    #[test]
    fn test_last_turn_by_role() {
        let mut state = ConversationState::new(Uuid::new_v4());
        state.append(Speaker::Agent(AgentRole::Scheduler), "first");
        state.append(Speaker::Agent(AgentRole::PoliticalRisk), "risk");
        state.append(Speaker::Agent(AgentRole::Scheduler), "second");

        assert_eq!(
            state.last_turn_by(AgentRole::Scheduler).map(|t| t.content.as_str()),
            Some("second")
        );
        assert!(state.last_turn_by(AgentRole::Reporting).is_none());
        assert_eq!(
            last_agent_turn(state.turns()).map(|t| t.sequence),
            Some(3)
        );
    }

    #[test]
    fn test_initial_phase_is_scheduling() {
        let state = ConversationState::new(Uuid::new_v4());
        assert_eq!(state.phase(), Phase::Scheduling);
        assert_eq!(Phase::RiskAnalysis.to_string(), "risk_analysis");
    }
}
