//! Agent instruction texts, built once at startup from `Settings`.

use crate::config::Settings;
use crate::models::AgentRole;

#[derive(Debug, Clone)]
pub struct InstructionSet {
    pub scheduler: String,
    pub political: String,
    pub tariff: String,
    pub logistics: String,
    pub reporting: String,
    pub assistant: String,
}

impl InstructionSet {
    pub fn from_settings(settings: &Settings) -> Self {
        let search = search_block(&settings.search_provider);

        Self {
            scheduler: format!(
                "SCHEDULER_AGENT > You are an expert in equipment schedule analysis.\n\
                 - Produce a JSON object with `schedule_items` and a `searchQuery` object with\n\
                   exactly the keys `political`, `tariff` and `logistics`, each a search query string.\n\
                 - Thinking stages: {}.\n\
                 Return only the structured JSON object.",
                stages(AgentRole::Scheduler)
            ),
            political: risk_block(
                "POLITICAL_RISK_AGENT > You are a Political Risk Intelligence Agent.",
                "political",
                &search,
                AgentRole::PoliticalRisk,
            ),
            tariff: risk_block(
                "TARIFF_RISK_AGENT > You are a Tariff Risk Intelligence Agent.",
                "tariff",
                &search,
                AgentRole::TariffRisk,
            ),
            logistics: risk_block(
                "LOGISTICS_RISK_AGENT > You are a Logistics Risk Intelligence Agent.",
                "logistics",
                &search,
                AgentRole::LogisticsRisk,
            ),
            reporting: format!(
                "REPORTING_AGENT > You consolidate the scheduler and risk agent outputs into one\n\
                 professional markdown risk report with an executive summary, a risk table per\n\
                 category, recommendations and a `### References` section.\n\
                 - Thinking stages: {}.",
                stages(AgentRole::Reporting)
            ),
            assistant: format!(
                "ASSISTANT_AGENT > You answer questions about equipment schedules and supply chain\n\
                 risk concisely, using the conversation so far.\n\
                 - Thinking stages: {}.",
                stages(AgentRole::Assistant)
            ),
        }
    }

    pub fn for_role(&self, role: AgentRole) -> &str {
        match role {
            AgentRole::Scheduler => &self.scheduler,
            AgentRole::PoliticalRisk => &self.political,
            AgentRole::TariffRisk => &self.tariff,
            AgentRole::LogisticsRisk => &self.logistics,
            AgentRole::Reporting => &self.reporting,
            AgentRole::Assistant => &self.assistant,
        }
    }
}

fn stages(role: AgentRole) -> String {
    role.thinking_stages()
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn search_block(provider: &str) -> String {
    format!(
        "Use the configured search provider ({}) with the exact query you are given, and\n\
         record full citation metadata (title, url, source, published date) for every source.",
        provider
    )
}

fn risk_block(header: &str, key: &str, search: &str, role: AgentRole) -> String {
    format!(
        "{}\n\
         - Use only the scheduler's `searchQuery.{}` value as your search input.\n\
         - {}\n\
         - Thinking stages: {}.\n\
         End with a `### References` section.",
        header,
        key,
        search,
        stages(role)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_risk_role_names_its_own_key() {
        let set = InstructionSet::from_settings(&Settings::default());
        assert!(set.for_role(AgentRole::PoliticalRisk).contains("searchQuery.political"));
        assert!(set.for_role(AgentRole::TariffRisk).contains("searchQuery.tariff"));
        assert!(!set.for_role(AgentRole::TariffRisk).contains("searchQuery.logistics"));
        assert!(set.for_role(AgentRole::LogisticsRisk).contains("serper"));
    }

    #[test]
    fn test_stage_lists_come_from_roles() {
        let set = InstructionSet::from_settings(&Settings::default());
        assert!(set.scheduler.contains("data_review"));
        assert!(set.reporting.contains("file_saving"));
    }
}
