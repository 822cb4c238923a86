//! Routing decision types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a routing request ended the way it did.
///
/// Empty fleets and saturated fleets are ordinary outcomes here, not
/// errors; callers decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingOutcome {
    /// A candidate was selected
    Selected,
    /// No registered agent carries every required capability
    NoCapableAgents,
    /// Capable agents exist but all are at or over capacity
    AllAtCapacity,
}

/// One ranked candidate considered during routing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub agent_id: String,
    /// success_rate * (1 - min(utilization, 1.0))
    pub score: f64,
    pub success_rate: f64,
    pub utilization: f64,
}

/// Outcome of a single route_task call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub task_id: String,
    pub selected_agent: Option<String>,
    pub outcome: RoutingOutcome,
    /// All capable candidates, best first
    pub candidates: Vec<CandidateScore>,
    pub decided_at: DateTime<Utc>,
}

/// Counters over the router's lifetime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingStatistics {
    pub total_requests: u64,
    pub assigned: u64,
    /// assigned / total_requests, 0.0 before any request
    pub assignment_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&RoutingOutcome::NoCapableAgents).unwrap();
        assert_eq!(json, "\"no_capable_agents\"");
    }
}
