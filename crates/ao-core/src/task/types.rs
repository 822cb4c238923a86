//! Task types for the orchestration queue
//!
//! Defines the core task model:
//! - Task: a unit of work tracked through its lifecycle
//! - TaskStatus / TaskPriority: lifecycle and scheduling enums
//! - TaskFilter: query predicate for task lookups
//! - QueueStatistics: aggregate counters over the queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority level for task scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    /// Numeric weight used for queue ordering (higher runs first)
    pub fn weight(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 5,
            Self::High => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Lifecycle status of a task
///
/// Valid transitions: Pending -> Assigned -> Running -> Completed | Failed.
/// A retryable failure moves the task back to Pending; a permanent failure
/// of a dependency moves dependents to Blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Blocked,
}

impl TaskStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Blocked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// A unit of work tracked by the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: String,
    /// Task description/payload
    pub content: String,
    /// Category used for routing and reporting
    pub task_type: String,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Scheduling priority
    pub priority: TaskPriority,
    /// Capabilities an agent must have to take this task (all required)
    pub requirements: Vec<String>,
    /// Ids of tasks that must complete before this one is polled
    pub dependencies: Vec<String>,
    /// Agent currently holding the task (set while Assigned/Running)
    pub assigned_to: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last assignment
    pub assigned_at: Option<DateTime<Utc>>,
    /// Timestamp execution started
    pub started_at: Option<DateTime<Utc>>,
    /// Timestamp the task reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Earliest time a retried task may be polled again
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Output recorded on completion
    pub result: Option<String>,
    /// Error recorded on failure
    pub error: Option<String>,
    /// Number of times the task has been retried
    pub retry_count: u32,
    /// Wall-clock execution time reported on completion
    pub execution_duration_ms: Option<u64>,
}

impl Task {
    /// Create a new pending task
    pub fn new(content: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            task_type: task_type.into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            requirements: Vec::new(),
            dependencies: Vec::new(),
            assigned_to: None,
            created_at: Utc::now(),
            assigned_at: None,
            started_at: None,
            completed_at: None,
            next_attempt_at: None,
            result: None,
            error: None,
            retry_count: 0,
            execution_duration_ms: None,
        }
    }

    /// Set task priority
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set required capabilities
    pub fn with_requirements(mut self, requirements: Vec<String>) -> Self {
        self.requirements = requirements;
        self
    }

    /// Set upstream task dependencies
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Whether the task currently holds an assignment
    pub fn is_assigned(&self) -> bool {
        matches!(self.status, TaskStatus::Assigned | TaskStatus::Running)
    }
}

/// Query predicate for task lookups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<String>,
    pub task_type: Option<String>,
    pub priority: Option<TaskPriority>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn assigned_to(mut self, agent_id: impl Into<String>) -> Self {
        self.assigned_to = Some(agent_id.into());
        self
    }

    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn created_after(mut self, ts: DateTime<Utc>) -> Self {
        self.created_after = Some(ts);
        self
    }

    pub fn created_before(mut self, ts: DateTime<Utc>) -> Self {
        self.created_before = Some(ts);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Aggregate counters over the queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStatistics {
    pub pending: usize,
    pub assigned: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub total: usize,
    /// completed / (completed + failed), 0.0 when neither has occurred
    pub success_rate: f64,
    /// Mean execution_duration_ms over completed tasks that reported one
    pub avg_execution_ms: f64,
}
