//! Error types for ao-core

use thiserror::Error;

/// Main error type for ao-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: String,
        to: String,
    },

    #[error("Operation timed out after {0}s")]
    Timeout(u64),

    #[error("Dependency cycle among tasks: {}", unresolved.join(", "))]
    DependencyCycle {
        /// Task ids that could never become ready.
        unresolved: Vec<String>,
        /// Results collected before the cycle was detected, keyed by task id.
        partial: std::collections::HashMap<String, crate::orchestrator::SubAgentResult>,
    },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for ao-core
pub type Result<T> = std::result::Result<T, Error>;
