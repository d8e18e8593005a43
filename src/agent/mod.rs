//! Agents
//!
//! An agent is a stateless template: identity, bound model, instructions and
//! the capabilities it may use. One template is shared across turns and runs.
//! Per-conversation state (thread identity) lives in `ThreadedAgent`.

pub mod instructions;
pub mod thread;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::gemini::ModelClient;
use crate::models::AgentRole;
use crate::Result;

pub use instructions::InstructionSet;
pub use thread::{AuthorRole, ChatMessage, ThreadedAgent};

/// Host functions an agent may call during a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ScheduleData,
    RiskSearch,
    ThinkingLog,
    Citations,
    ReportStorage,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ScheduleData => "schedule_data",
            Capability::RiskSearch => "risk_search",
            Capability::ThinkingLog => "thinking_log",
            Capability::Citations => "citations",
            Capability::ReportStorage => "report_storage",
        }
    }

    /// Default capability set for a role.
    pub fn defaults_for(role: AgentRole) -> Vec<Capability> {
        match role {
            AgentRole::Scheduler => vec![Capability::ScheduleData, Capability::ThinkingLog],
            AgentRole::PoliticalRisk | AgentRole::TariffRisk | AgentRole::LogisticsRisk => vec![
                Capability::RiskSearch,
                Capability::Citations,
                Capability::ThinkingLog,
            ],
            AgentRole::Reporting => vec![
                Capability::ReportStorage,
                Capability::Citations,
                Capability::ThinkingLog,
            ],
            AgentRole::Assistant => vec![Capability::ScheduleData, Capability::ThinkingLog],
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub role: AgentRole,
    pub display_name: String,
    pub bound_model: String,
    pub instructions: String,
    pub capabilities: Vec<Capability>,
}

impl AgentDefinition {
    pub fn new(role: AgentRole, bound_model: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            role,
            display_name: role.display_name().to_string(),
            bound_model: bound_model.into(),
            instructions: instructions.into(),
            capabilities: Capability::defaults_for(role),
        }
    }

    /// Stable id used in thinking events.
    pub fn agent_id(&self) -> String {
        format!("local-{}", self.role.as_str())
    }

    /// Instructions followed by the capability list, sent as the system
    /// instruction of every call.
    pub fn system_prompt(&self) -> String {
        let capabilities: Vec<&str> = self.capabilities.iter().map(Capability::as_str).collect();
        format!(
            "{}\n\nagent_id: {}\nAvailable capabilities: {}",
            self.instructions.trim_end(),
            self.agent_id(),
            capabilities.join(", ")
        )
    }
}

/// The single capability every agent exposes: turn a prompt into text.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    fn definition(&self) -> &AgentDefinition;

    async fn respond(&self, prompt: &str) -> Result<String>;

    /// Conversation thread, if this variant tracks one and it exists yet.
    fn thread_id(&self) -> Option<String> {
        None
    }

    fn role(&self) -> AgentRole {
        self.definition().role
    }
}

/// Bare wrapper: one model call per `respond`.
pub struct ModelAgent {
    definition: AgentDefinition,
    client: Arc<dyn ModelClient>,
}

impl ModelAgent {
    pub fn new(definition: AgentDefinition, client: Arc<dyn ModelClient>) -> Self {
        Self { definition, client }
    }
}

#[async_trait]
impl AgentHandle for ModelAgent {
    fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    async fn respond(&self, prompt: &str) -> Result<String> {
        debug!(agent = %self.definition.role, chars = prompt.len(), "Agent responding");

        let text = self
            .client
            .generate(
                &self.definition.bound_model,
                Some(&self.definition.system_prompt()),
                prompt,
            )
            .await?;

        if text.trim().is_empty() {
            return Err(OrchestrationError::ModelInvocation(format!(
                "{} returned no text",
                self.definition.role
            )));
        }

        Ok(text)
    }
}

/// Agents taking part in a workflow, in declaration order.
#[derive(Clone, Default)]
pub struct AgentRoster {
    agents: Vec<Arc<dyn AgentHandle>>,
}

impl AgentRoster {
    pub fn new(agents: Vec<Arc<dyn AgentHandle>>) -> Self {
        Self { agents }
    }

    /// Scheduler, the risk agents (unless disabled) and the reporting agent,
    /// all bound to the configured model.
    pub fn build(
        client: Arc<dyn ModelClient>,
        instructions: &InstructionSet,
        settings: &Settings,
    ) -> Self {
        let mut roles = vec![AgentRole::Scheduler];
        if settings.risk_agents_enabled {
            roles.extend(crate::models::RISK_PRIORITY);
        }
        roles.push(AgentRole::Reporting);

        let agents = roles
            .into_iter()
            .map(|role| {
                let definition =
                    AgentDefinition::new(role, &settings.model_name, instructions.for_role(role));
                Arc::new(ModelAgent::new(definition, Arc::clone(&client))) as Arc<dyn AgentHandle>
            })
            .collect();

        Self { agents }
    }

    pub fn get(&self, role: AgentRole) -> Option<&Arc<dyn AgentHandle>> {
        self.agents.iter().find(|a| a.role() == role)
    }

    pub fn contains(&self, role: AgentRole) -> bool {
        self.get(role).is_some()
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        self.agents.iter().map(|a| a.role()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AgentHandle>> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
