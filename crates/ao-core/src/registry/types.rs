//! Agent registry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// A worker registered with the orchestration core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier
    pub id: String,
    /// Capability tags this agent offers
    pub capabilities: Vec<String>,
    /// Concurrent tasks the agent is willing to hold
    pub max_concurrent_tasks: u32,
    /// completed / (completed + failed), 1.0 before any outcome
    pub success_rate: f64,
    /// Mean duration of successful tasks in milliseconds
    pub avg_completion_ms: f64,
    /// Tasks currently assigned or running on this agent
    pub current_load: u32,
    /// Lifetime successful task count
    pub total_completed: u64,
    /// Lifetime failed task count
    pub total_failed: u64,
    /// Free-form metadata supplied at registration
    pub metadata: JsonValue,
    /// Registration timestamp
    pub registered_at: DateTime<Utc>,
}

impl Agent {
    /// Register-time constructor with default performance history
    pub fn new(id: impl Into<String>, capabilities: Vec<String>) -> Self {
        Self {
            id: id.into(),
            capabilities,
            max_concurrent_tasks: 5,
            success_rate: 1.0,
            avg_completion_ms: 0.0,
            current_load: 0,
            total_completed: 0,
            total_failed: 0,
            metadata: JsonValue::Null,
            registered_at: Utc::now(),
        }
    }

    /// Set the concurrent task capacity
    pub fn with_max_concurrent_tasks(mut self, max: u32) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Attach registration metadata
    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    /// Fraction of capacity in use; an agent with zero capacity counts as full
    pub fn utilization(&self) -> f64 {
        if self.max_concurrent_tasks == 0 {
            return 1.0;
        }
        self.current_load as f64 / self.max_concurrent_tasks as f64
    }

    /// Whether the agent holds every required capability
    pub fn has_capabilities(&self, required: &[String]) -> bool {
        required.iter().all(|r| self.capabilities.contains(r))
    }
}

/// Health snapshot for a single agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_id: String,
    /// True when success_rate is above 0.8
    pub healthy: bool,
    pub success_rate: f64,
    pub current_load: u32,
    pub max_concurrent_tasks: u32,
    pub utilization: f64,
}

/// Fleet-wide registry summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStatistics {
    pub total_agents: usize,
    pub avg_success_rate: f64,
    pub total_current_load: u64,
    /// capability tag -> number of agents carrying it
    pub skill_distribution: HashMap<String, usize>,
}
