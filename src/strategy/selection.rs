//! Phase-driven speaker selection
//!
//! scheduling -> risk_analysis -> reporting -> done. The scheduler speaks
//! until its output carries a `searchQuery` object; risk agents then speak
//! once each in `RISK_PRIORITY` order; reporting closes the run.

use super::{Selection, SelectionStrategy};
use crate::conversation::{last_agent_turn, Phase, Speaker, Turn};
use crate::error::OrchestrationError;
use crate::models::{AgentRole, RISK_PRIORITY};
use crate::schedule::has_search_query;
use crate::Result;

#[derive(Debug, Clone)]
pub struct PhaseSelection {
    available: Vec<AgentRole>,
}

impl PhaseSelection {
    /// `available` is the roster; risk agents missing from it are skipped.
    pub fn new(available: Vec<AgentRole>) -> Self {
        Self { available }
    }

    fn next_risk_agent(&self, history: &[Turn]) -> Option<AgentRole> {
        let since_schedule = history
            .iter()
            .rposition(|t| t.speaker == Speaker::Agent(AgentRole::Scheduler))
            .map(|i| &history[i + 1..])
            .unwrap_or(history);

        RISK_PRIORITY.into_iter().find(|role| {
            self.available.contains(role)
                && !since_schedule
                    .iter()
                    .any(|t| t.speaker == Speaker::Agent(*role))
        })
    }

    fn risk_or_reporting(&self, history: &[Turn]) -> Selection {
        match self.next_risk_agent(history) {
            Some(agent) => Selection {
                phase: Phase::RiskAnalysis,
                agent,
            },
            None => Selection {
                phase: Phase::Reporting,
                agent: AgentRole::Reporting,
            },
        }
    }
}

impl SelectionStrategy for PhaseSelection {
    fn select(&self, history: &[Turn], phase: Phase) -> Result<Selection> {
        if phase == Phase::Done {
            return Err(OrchestrationError::InvalidState(
                "selection invoked after the workflow finished".to_string(),
            ));
        }

        let Some(last) = last_agent_turn(history) else {
            return Ok(Selection {
                phase: Phase::Scheduling,
                agent: AgentRole::Scheduler,
            });
        };

        match last.speaker.agent() {
            Some(AgentRole::Scheduler) if has_search_query(&last.content) => {
                Ok(self.risk_or_reporting(history))
            }
            Some(AgentRole::Scheduler) => Ok(Selection {
                phase: Phase::Scheduling,
                agent: AgentRole::Scheduler,
            }),
            Some(role) if role.is_risk() => Ok(self.risk_or_reporting(history)),
            Some(role) => Err(OrchestrationError::InvalidState(format!(
                "no speaker follows {}",
                role
            ))),
            None => Err(OrchestrationError::InvalidState(
                "last agent turn has no agent speaker".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationState;
    use uuid::Uuid;

    const SCHEDULE: &str =
        r#"{"searchQuery": {"political": "Q1", "tariff": "Q2", "logistics": "Q3"}}"#;

    fn full() -> PhaseSelection {
        PhaseSelection::new(vec![
            AgentRole::Scheduler,
            AgentRole::PoliticalRisk,
            AgentRole::TariffRisk,
            AgentRole::LogisticsRisk,
            AgentRole::Reporting,
        ])
    }

    fn history(turns: &[(AgentRole, &str)]) -> ConversationState {
        let mut state = ConversationState::with_initial_message(Uuid::new_v4(), "start");
        for (role, content) in turns {
            state.append(Speaker::Agent(*role), *content);
        }
        state
    }

    #[test]
    fn test_scheduler_opens() {
        let state = history(&[]);
        let s = full().select(state.turns(), Phase::Scheduling).unwrap();
        assert_eq!(s.agent, AgentRole::Scheduler);
        assert_eq!(s.phase, Phase::Scheduling);
    }

    #[test]
    fn test_full_order() {
        let strategy = full();
        let mut state = history(&[(AgentRole::Scheduler, SCHEDULE)]);
        let mut order = Vec::new();

        loop {
            let s = strategy.select(state.turns(), state.phase()).unwrap();
            order.push(s.agent);
            state.set_phase(s.phase);
            if s.agent == AgentRole::Reporting {
                break;
            }
            state.append(Speaker::Agent(s.agent), "analysis");
        }

        assert_eq!(
            order,
            vec![
                AgentRole::PoliticalRisk,
                AgentRole::TariffRisk,
                AgentRole::LogisticsRisk,
                AgentRole::Reporting,
            ]
        );
    }

    #[test]
    fn test_scheduler_repeats_without_search_query() {
        let state = history(&[(AgentRole::Scheduler, "I need more detail.")]);
        let s = full().select(state.turns(), Phase::Scheduling).unwrap();
        assert_eq!(s.agent, AgentRole::Scheduler);
    }

    #[test]
    fn test_missing_risk_agents_are_skipped() {
        let strategy = PhaseSelection::new(vec![
            AgentRole::Scheduler,
            AgentRole::LogisticsRisk,
            AgentRole::Reporting,
        ]);
        let state = history(&[(AgentRole::Scheduler, SCHEDULE)]);
        assert_eq!(
            strategy.select(state.turns(), Phase::Scheduling).unwrap().agent,
            AgentRole::LogisticsRisk
        );

        let bare = PhaseSelection::new(vec![AgentRole::Scheduler, AgentRole::Reporting]);
        let s = bare.select(state.turns(), Phase::Scheduling).unwrap();
        assert_eq!(s.agent, AgentRole::Reporting);
        assert_eq!(s.phase, Phase::Reporting);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let strategy = full();
        let state = history(&[
            (AgentRole::Scheduler, SCHEDULE),
            (AgentRole::PoliticalRisk, "p"),
        ]);

        let a = strategy.select(state.turns(), Phase::RiskAnalysis).unwrap();
        let b = strategy.select(state.turns(), Phase::RiskAnalysis).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.agent, AgentRole::TariffRisk);
    }

    #[test]
    fn test_done_and_terminal_speaker_are_invalid() {
        let state = history(&[(AgentRole::Scheduler, SCHEDULE), (AgentRole::Reporting, "r")]);
        assert!(full().select(state.turns(), Phase::Done).is_err());
        assert!(matches!(
            full().select(state.turns(), Phase::Reporting),
            Err(OrchestrationError::InvalidState(_))
        ));
    }
}
