use super::{Termination, TerminationStrategy};
use crate::conversation::{agent_turn_count, last_turn_by, Turn};
use crate::models::AgentRole;

/// Stops once the terminal agent has spoken, or once more than `max_turns`
/// agent turns have been taken. A spoken terminal agent wins over the limit.
#[derive(Debug, Clone)]
pub struct TerminalAgentTermination {
    terminal: AgentRole,
    max_turns: usize,
}

impl TerminalAgentTermination {
    pub fn new(terminal: AgentRole, max_turns: usize) -> Self {
        Self {
            terminal,
            max_turns,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}

impl TerminationStrategy for TerminalAgentTermination {
    fn evaluate(&self, history: &[Turn]) -> Termination {
        if last_turn_by(history, self.terminal).is_some() {
            return Termination::Complete;
        }

        let turns = agent_turn_count(history);
        if turns > self.max_turns {
            return Termination::TurnLimitExceeded {
                turns,
                max: self.max_turns,
            };
        }

        Termination::Continue
    }
}
