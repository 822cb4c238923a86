//! Sub-agent task and result types
//!
//! Defines the in-process orchestration model:
//! - SubAgentTask: one node in a dependency graph of operations
//! - SubAgentResult: outcome of executing a node
//! - OrchestrationReport: aggregate view over a whole run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Status of a sub-agent execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SubAgentStatus {
    /// Whether this status counts as a successful execution
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// One node in an orchestrated operation graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentTask {
    /// Unique task identifier within a run
    pub task_id: String,
    /// Which kind of agent should execute this node
    pub agent_type: String,
    /// Operation payload handed to the agent
    pub operation_data: JsonValue,
    /// Task ids that must complete before this node runs
    pub dependencies: Vec<String>,
    /// Per-task timeout; 0 means use the orchestrator default
    pub timeout_seconds: u64,
    /// Higher priority nodes are launched first within a wave
    pub priority: i32,
    /// Key-value context visible to the agent; dependency outputs are
    /// injected here as "output_<task_id>" before the node runs
    pub context: HashMap<String, JsonValue>,
}

impl SubAgentTask {
    /// Create a new task with default settings
    pub fn new(agent_type: impl Into<String>, operation_data: JsonValue) -> Self {
        Self {
            task_id: uuid::Uuid::now_v7().to_string(),
            agent_type: agent_type.into(),
            operation_data,
            dependencies: vec![],
            timeout_seconds: 0,
            priority: 0,
            context: HashMap::new(),
        }
    }

    /// Override the generated task id
    pub fn with_task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = id.into();
        self
    }

    /// Set upstream dependencies
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set the per-task timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }

    /// Set launch priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Add a context entry
    pub fn with_context_value(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Result from executing one graph node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentResult {
    /// Instance id of the executing agent
    pub agent_id: String,
    /// Agent kind that handled (or would have handled) the node
    pub agent_type: String,
    /// Final status
    pub status: SubAgentStatus,
    /// Agent output; Null unless completed
    pub output: JsonValue,
    /// Error message if not completed
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds
    pub execution_time_ms: u64,
    /// Agent confidence in the output
    pub confidence: f64,
    /// When the result was produced
    pub timestamp: DateTime<Utc>,
}

impl SubAgentResult {
    /// Create a successful result
    pub fn success(
        agent_id: impl Into<String>,
        agent_type: impl Into<String>,
        output: JsonValue,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            status: SubAgentStatus::Completed,
            output,
            error: None,
            execution_time_ms,
            confidence: 1.0,
            timestamp: Utc::now(),
        }
    }

    /// Create a failed result
    pub fn failure(
        agent_id: impl Into<String>,
        agent_type: impl Into<String>,
        error: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            status: SubAgentStatus::Failed,
            output: JsonValue::Null,
            error: Some(error.into()),
            execution_time_ms,
            confidence: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// Create a result for a node that exceeded its time budget
    pub fn timeout(
        agent_id: impl Into<String>,
        agent_type: impl Into<String>,
        timeout_secs: u64,
        execution_time_ms: u64,
    ) -> Self {
        Self::failure(
            agent_id,
            agent_type,
            crate::Error::Timeout(timeout_secs).to_string(),
            execution_time_ms,
        )
    }

    /// Create a cancelled result for a node that never ran
    pub fn cancelled(
        agent_id: impl Into<String>,
        agent_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut result = Self::failure(agent_id, agent_type, reason, 0);
        result.status = SubAgentStatus::Cancelled;
        result
    }
}

/// Per-agent-type outcome counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentTypeStats {
    pub succeeded: usize,
    pub failed: usize,
}

/// Aggregate view over one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationReport {
    /// Per-node results keyed by task id
    pub results: HashMap<String, SubAgentResult>,
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    /// Ids of tasks that did not complete, sorted
    pub failed_task_ids: Vec<String>,
    pub by_agent_type: HashMap<String, AgentTypeStats>,
    /// Sum of node execution times
    pub total_execution_ms: u64,
    /// Mean node execution time, 0.0 for an empty run
    pub avg_execution_ms: f64,
    /// Of the nodes that declared dependencies, the fraction whose
    /// dependencies all completed. 1.0 when no node declares any.
    pub coordination_effectiveness: f64,
}

impl OrchestrationReport {
    /// Build a report from per-node results and the submitted graph
    pub fn from_results(results: HashMap<String, SubAgentResult>, tasks: &[SubAgentTask]) -> Self {
        let total_tasks = results.len();
        let completed = results.values().filter(|r| r.status.is_success()).count();
        let failed = total_tasks - completed;

        let mut failed_task_ids: Vec<String> = results
            .iter()
            .filter(|(_, r)| !r.status.is_success())
            .map(|(id, _)| id.clone())
            .collect();
        failed_task_ids.sort();

        let mut by_agent_type: HashMap<String, AgentTypeStats> = HashMap::new();
        for result in results.values() {
            let entry = by_agent_type.entry(result.agent_type.clone()).or_default();
            if result.status.is_success() {
                entry.succeeded += 1;
            } else {
                entry.failed += 1;
            }
        }

        let total_execution_ms: u64 = results.values().map(|r| r.execution_time_ms).sum();
        let avg_execution_ms = if total_tasks > 0 {
            total_execution_ms as f64 / total_tasks as f64
        } else {
            0.0
        };

        let dependent: Vec<&SubAgentTask> =
            tasks.iter().filter(|t| !t.dependencies.is_empty()).collect();
        let coordinated = dependent
            .iter()
            .filter(|t| {
                t.dependencies.iter().all(|d| {
                    results
                        .get(d)
                        .map(|r| r.status.is_success())
                        .unwrap_or(false)
                })
            })
            .count();
        let coordination_effectiveness = if dependent.is_empty() {
            1.0
        } else {
            coordinated as f64 / dependent.len() as f64
        };

        Self {
            results,
            total_tasks,
            completed,
            failed,
            failed_task_ids,
            by_agent_type,
            total_execution_ms,
            avg_execution_ms,
            coordination_effectiveness,
        }
    }
}
