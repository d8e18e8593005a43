//! Turn-taking strategies
//!
//! Both strategies are pure over the conversation history: same history in,
//! same decision out, no state touched.

pub mod selection;
pub mod termination;

use crate::conversation::{Phase, Turn};
use crate::models::AgentRole;
use crate::Result;

pub use selection::PhaseSelection;
pub use termination::TerminalAgentTermination;

/// Next speaker and the phase it speaks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub phase: Phase,
    pub agent: AgentRole,
}

pub trait SelectionStrategy: Send + Sync {
    fn select(&self, history: &[Turn], phase: Phase) -> Result<Selection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Continue,
    /// The terminal agent has spoken.
    Complete,
    TurnLimitExceeded { turns: usize, max: usize },
}

impl Termination {
    pub fn should_stop(&self) -> bool {
        !matches!(self, Termination::Continue)
    }
}

pub trait TerminationStrategy: Send + Sync {
    fn evaluate(&self, history: &[Turn]) -> Termination;
}
