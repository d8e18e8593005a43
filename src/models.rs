//! Core data models for the risk agent workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::conversation::Turn;
use crate::error::OrchestrationError;

//
// ================= Agents =================
//

/// Identity of an agent. Immutable once an agent is created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AgentRole {
    #[serde(rename = "SCHEDULER_AGENT")]
    Scheduler,
    #[serde(rename = "POLITICAL_RISK_AGENT")]
    PoliticalRisk,
    #[serde(rename = "TARIFF_RISK_AGENT")]
    TariffRisk,
    #[serde(rename = "LOGISTICS_RISK_AGENT")]
    LogisticsRisk,
    #[serde(rename = "REPORTING_AGENT")]
    Reporting,
    #[serde(rename = "ASSISTANT_AGENT")]
    Assistant,
}

/// Fixed speaking order inside the risk analysis phase.
pub const RISK_PRIORITY: [AgentRole; 3] = [
    AgentRole::PoliticalRisk,
    AgentRole::TariffRisk,
    AgentRole::LogisticsRisk,
];

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Scheduler => "SCHEDULER_AGENT",
            AgentRole::PoliticalRisk => "POLITICAL_RISK_AGENT",
            AgentRole::TariffRisk => "TARIFF_RISK_AGENT",
            AgentRole::LogisticsRisk => "LOGISTICS_RISK_AGENT",
            AgentRole::Reporting => "REPORTING_AGENT",
            AgentRole::Assistant => "ASSISTANT_AGENT",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::Scheduler => "Scheduler",
            AgentRole::PoliticalRisk => "Political Risk Analyst",
            AgentRole::TariffRisk => "Tariff Risk Analyst",
            AgentRole::LogisticsRisk => "Logistics Risk Analyst",
            AgentRole::Reporting => "Reporting Consolidator",
            AgentRole::Assistant => "Assistant",
        }
    }

    pub fn is_risk(&self) -> bool {
        self.search_key().is_some()
    }

    /// The `searchQuery` key this agent consumes, if any.
    pub fn search_key(&self) -> Option<&'static str> {
        match self {
            AgentRole::PoliticalRisk => Some("political"),
            AgentRole::TariffRisk => Some("tariff"),
            AgentRole::LogisticsRisk => Some("logistics"),
            _ => None,
        }
    }

    /// Thinking stages this role may log, in workflow order.
    pub fn thinking_stages(&self) -> &'static [ThinkingStage] {
        use ThinkingStage::*;
        match self {
            AgentRole::Scheduler => &[
                AnalysisStart,
                DataReview,
                RiskCalculation,
                Categorization,
                Recommendations,
            ],
            AgentRole::PoliticalRisk => &[
                AnalysisStart,
                JsonExtraction,
                SearchAttempt,
                SearchResults,
                RiskIdentification,
                RiskAssessment,
                Recommendations,
            ],
            AgentRole::TariffRisk => &[
                AnalysisStart,
                LocationExtraction,
                SearchAttempt,
                SearchResults,
                TariffResearch,
                RiskAssessment,
                Recommendations,
            ],
            AgentRole::LogisticsRisk => &[
                AnalysisStart,
                PortExtraction,
                SearchAttempt,
                SearchResults,
                LogisticsResearch,
                RiskAssessment,
                Recommendations,
            ],
            AgentRole::Reporting => &[
                AnalysisStart,
                DataCollection,
                RiskConsolidation,
                ReportStructure,
                Recommendations,
                FileSaving,
            ],
            AgentRole::Assistant => &[
                QueryUnderstanding,
                PlanFormulation,
                InsightExtraction,
                ResponsePreparation,
            ],
        }
    }

    /// First stage logged when a turn starts.
    pub fn opening_stage(&self) -> ThinkingStage {
        self.thinking_stages()[0]
    }

    /// Stage that carries the agent's full output when a turn ends.
    pub fn closing_stage(&self) -> ThinkingStage {
        match self {
            AgentRole::Reporting => ThinkingStage::ReportStructure,
            AgentRole::Assistant => ThinkingStage::ResponsePreparation,
            _ => ThinkingStage::Recommendations,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Thinking Events =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingStage {
    AnalysisStart,
    DataReview,
    RiskCalculation,
    Categorization,
    JsonExtraction,
    LocationExtraction,
    PortExtraction,
    SearchAttempt,
    SearchResults,
    RiskIdentification,
    TariffResearch,
    LogisticsResearch,
    RiskAssessment,
    Recommendations,
    DataCollection,
    RiskConsolidation,
    ReportStructure,
    FileSaving,
    QueryUnderstanding,
    PlanFormulation,
    InsightExtraction,
    ResponsePreparation,
}

impl ThinkingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingStage::AnalysisStart => "analysis_start",
            ThinkingStage::DataReview => "data_review",
            ThinkingStage::RiskCalculation => "risk_calculation",
            ThinkingStage::Categorization => "categorization",
            ThinkingStage::JsonExtraction => "json_extraction",
            ThinkingStage::LocationExtraction => "location_extraction",
            ThinkingStage::PortExtraction => "port_extraction",
            ThinkingStage::SearchAttempt => "search_attempt",
            ThinkingStage::SearchResults => "search_results",
            ThinkingStage::RiskIdentification => "risk_identification",
            ThinkingStage::TariffResearch => "tariff_research",
            ThinkingStage::LogisticsResearch => "logistics_research",
            ThinkingStage::RiskAssessment => "risk_assessment",
            ThinkingStage::Recommendations => "recommendations",
            ThinkingStage::DataCollection => "data_collection",
            ThinkingStage::RiskConsolidation => "risk_consolidation",
            ThinkingStage::ReportStructure => "report_structure",
            ThinkingStage::FileSaving => "file_saving",
            ThinkingStage::QueryUnderstanding => "query_understanding",
            ThinkingStage::PlanFormulation => "plan_formulation",
            ThinkingStage::InsightExtraction => "insight_extraction",
            ThinkingStage::ResponsePreparation => "response_preparation",
        }
    }
}

/// One logged thinking step of an agent turn.
///
/// `conversation_id` is always the workflow run id and `session_id` the run's
/// session, unchanged for every event of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingEvent {
    pub agent_name: String,
    pub thinking_stage: ThinkingStage,
    pub thought_content: String,
    pub conversation_id: Uuid,
    pub session_id: Uuid,
    pub agent_id: String,
    pub model_deployment_name: String,
    pub thread_id: Option<String>,
    pub thinking_stage_output: Option<String>,
    pub agent_output: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Coarse workflow lifecycle event ("Start Workflow", "Workflow Error", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub agent_name: String,
    pub action: String,
    pub result_summary: String,
    pub conversation_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn orchestrator(action: &str, result_summary: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            agent_name: "Orchestrator".to_string(),
            action: action.to_string(),
            result_summary: result_summary.into(),
            conversation_id: run_id,
            created_at: Utc::now(),
        }
    }
}

//
// ================= Workflow Run =================
//

/// Correlation identifiers shared by every prompt and event of one run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunContext {
    pub workflow_run_id: Uuid,
    pub session_id: Uuid,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            workflow_run_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

/// Which executor drove the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    GroupChat,
    SequentialFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow_run_id: Uuid,
    pub session_id: Uuid,
    pub status: RunStatus,
    pub report: Option<String>,
    pub error: Option<String>,
    pub path: Option<ExecutionPath>,
    pub history: Vec<Turn>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn start(ctx: &RunContext, path: Option<ExecutionPath>) -> Self {
        Self {
            workflow_run_id: ctx.workflow_run_id,
            session_id: ctx.session_id,
            status: RunStatus::Running,
            report: None,
            error: None,
            path,
            history: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// Move to `success`. A run that already left `running` is returned unchanged.
    pub fn complete(mut self, report: String, history: Vec<Turn>) -> Self {
        if self.is_terminal() {
            return self;
        }
        self.status = RunStatus::Success;
        self.report = Some(report);
        self.history = history;
        self.finished_at = Some(Utc::now());
        self
    }

    /// Move to `error`, keeping whatever history was collected.
    pub fn fail(mut self, error: &OrchestrationError, history: Vec<Turn>) -> Self {
        if self.is_terminal() {
            return self;
        }
        self.status = RunStatus::Error;
        self.error = Some(error.to_string());
        self.history = history;
        self.finished_at = Some(Utc::now());
        self
    }

    /// The shape handed to external callers.
    pub fn result(&self) -> WorkflowResult {
        WorkflowResult {
            status: self.status,
            report: self.report.clone(),
            error: self.error.clone(),
            workflow_run_id: self.workflow_run_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowResult {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub workflow_run_id: String,
}
