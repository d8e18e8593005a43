//! Error types for the risk agent orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Workflow Errors
    // =============================

    /// The model call failed, timed out, or the client is unconfigured.
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),

    /// The turn-taking engine could not be built. Recovered via fallback.
    #[error("Orchestrator unavailable: {0}")]
    OrchestratorUnavailable(String),

    #[error("Turn limit exceeded: {turns} agent turns taken, limit is {max}")]
    TurnLimitExceeded { turns: usize, max: usize },

    /// A required field of an inter-agent payload is missing.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Workflow cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid workflow state: {0}")]
    InvalidState(String),

    // =============================
    // Infrastructure Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Report storage error: {0}")]
    Storage(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
