//! Risk Agent Orchestrator
//!
//! Runs a fixed team of model-backed agents over a supply-chain schedule:
//! - a scheduler that reads the schedule and writes per-domain search queries
//! - political, tariff and logistics risk analysts
//! - a reporting agent that writes the final markdown report
//!
//! Agents take turns in a group chat driven by a selection strategy and a
//! termination strategy. When the group chat cannot be built the run falls
//! back to a plain scheduler → reporting pipeline with the same result shape.

pub mod agent;
pub mod api;
pub mod audit;
pub mod citation;
pub mod config;
pub mod conversation;
pub mod error;
pub mod gemini;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod report;
pub mod schedule;
pub mod strategy;
pub mod workflow;

pub use error::{OrchestrationError, Result};

pub use models::{AgentRole, RunContext, RunStatus, WorkflowResult, WorkflowRun};
pub use orchestrator::{Orchestrator, OrchestratorBuild, SequentialFallbackExecutor, WorkflowExecutor};
pub use workflow::WorkflowManager;
