//! Capability-based task routing
//!
//! Ranks capable agents by quality score and picks the best one that
//! still has headroom. Scoring favors agents with a strong track record
//! and a light current load.

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tracing::debug;

use crate::registry::{Agent, AgentRegistry};
use crate::routing::types::{CandidateScore, RoutingDecision, RoutingOutcome, RoutingStatistics};
use crate::task::Task;
use crate::Result;

/// Utilization spread beyond which the fleet is considered skewed
const REBALANCE_THRESHOLD: f64 = 0.5;

/// Router over the agent registry
pub struct CapabilityRouter {
    registry: Arc<AgentRegistry>,
    total_requests: AtomicU64,
    total_assigned: AtomicU64,
}

impl CapabilityRouter {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            total_requests: AtomicU64::new(0),
            total_assigned: AtomicU64::new(0),
        }
    }

    /// Decide which agent should take a task.
    ///
    /// "Nobody can" and "everybody is full" are reported in the decision's
    /// outcome; the call itself only fails on storage errors.
    pub async fn route_task(&self, task: &Task, exclude: &[String]) -> Result<RoutingDecision> {
        self.total_requests.fetch_add(1, AtomicOrdering::Relaxed);

        let capable = self
            .registry
            .get_agents_by_capability(&task.requirements, exclude)
            .await?;

        if capable.is_empty() {
            debug!(
                "No capable agent for task {} (requires {:?})",
                task.id, task.requirements
            );
            return Ok(RoutingDecision {
                task_id: task.id.clone(),
                selected_agent: None,
                outcome: RoutingOutcome::NoCapableAgents,
                candidates: vec![],
                decided_at: chrono::Utc::now(),
            });
        }

        let candidates = rank_candidates(&capable);

        // An agent at or over capacity is never selected while one with
        // headroom exists.
        let selected = candidates
            .iter()
            .find(|c| c.utilization < 1.0)
            .map(|c| c.agent_id.clone());

        let outcome = match &selected {
            Some(agent_id) => {
                self.total_assigned.fetch_add(1, AtomicOrdering::Relaxed);
                debug!("Task {} routed to {}", task.id, agent_id);
                RoutingOutcome::Selected
            }
            None => {
                debug!("All capable agents at capacity for task {}", task.id);
                RoutingOutcome::AllAtCapacity
            }
        };

        Ok(RoutingDecision {
            task_id: task.id.clone(),
            selected_agent: selected,
            outcome,
            candidates,
            decided_at: chrono::Utc::now(),
        })
    }

    /// Whether the utilization spread across the fleet warrants
    /// redistributing work. Needs at least two agents to mean anything.
    pub async fn should_rebalance(&self) -> Result<bool> {
        let agents = self.registry.list_agents().await?;
        if agents.len() < 2 {
            return Ok(false);
        }

        let mut min_util = f64::MAX;
        let mut max_util = f64::MIN;
        for agent in &agents {
            let util = agent.utilization();
            min_util = min_util.min(util);
            max_util = max_util.max(util);
        }

        Ok(max_util - min_util > REBALANCE_THRESHOLD)
    }

    /// Lifetime routing counters
    pub fn get_routing_statistics(&self) -> RoutingStatistics {
        let total = self.total_requests.load(AtomicOrdering::Relaxed);
        let assigned = self.total_assigned.load(AtomicOrdering::Relaxed);
        RoutingStatistics {
            total_requests: total,
            assigned,
            assignment_rate: if total > 0 {
                assigned as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Score and sort candidates, best first.
///
/// score = success_rate * (1 - min(utilization, 1.0)); ties fall back to
/// agent id so repeated calls rank identically.
pub fn rank_candidates(agents: &[Agent]) -> Vec<CandidateScore> {
    let mut scored: Vec<CandidateScore> = agents
        .iter()
        .map(|agent| {
            let utilization = agent.utilization();
            CandidateScore {
                agent_id: agent.id.clone(),
                score: agent.success_rate * (1.0 - utilization.min(1.0)),
                success_rate: agent.success_rate,
                utilization,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    });
    scored
}
