//! Agent registry
//!
//! Tracks the agent fleet: registration, capability lookups, performance
//! counters and health. Capability matching is exact tag membership; an
//! agent qualifies only when it carries every required tag.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::registry::store::AgentRepository;
use crate::registry::types::{Agent, AgentHealth, AgentStatistics};
use crate::{Error, Result};

/// Success rate above which an agent is considered healthy
const HEALTH_THRESHOLD: f64 = 0.8;

/// Registry over a pluggable agent store
pub struct AgentRegistry {
    store: Arc<dyn AgentRepository>,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn AgentRepository>) -> Self {
        Self { store }
    }

    /// Register a new agent. Fails when the id is already taken.
    pub async fn register_agent(&self, agent: Agent) -> Result<()> {
        if self.store.get(&agent.id).await?.is_some() {
            return Err(Error::DuplicateAgent(agent.id));
        }
        info!(
            "Registering agent {} with capabilities {:?}",
            agent.id, agent.capabilities
        );
        self.store.insert(&agent).await
    }

    /// Load an agent by id
    pub async fn get_agent(&self, id: &str) -> Result<Agent> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::AgentNotFound(id.to_string()))
    }

    /// List every registered agent
    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.store.list().await
    }

    /// Agents carrying every required capability tag.
    ///
    /// An empty requirement list matches all agents. Agents named in
    /// `exclude` are dropped from the result either way.
    pub async fn get_agents_by_capability(
        &self,
        required: &[String],
        exclude: &[String],
    ) -> Result<Vec<Agent>> {
        let agents = self.store.list().await?;
        Ok(agents
            .into_iter()
            .filter(|a| !exclude.contains(&a.id))
            .filter(|a| a.has_capabilities(required))
            .collect())
    }

    /// Fold a task outcome into the agent's performance counters
    pub async fn update_agent_performance(
        &self,
        id: &str,
        success: bool,
        duration_ms: u64,
    ) -> Result<Agent> {
        let agent = self
            .store
            .record_outcome(id, success, duration_ms)
            .await?
            .ok_or_else(|| Error::AgentNotFound(id.to_string()))?;
        debug!(
            "Agent {} outcome recorded: success={} rate={:.3} avg={:.1}ms",
            id, success, agent.success_rate, agent.avg_completion_ms
        );
        Ok(agent)
    }

    /// Health snapshot for one agent
    pub async fn get_agent_health(&self, id: &str) -> Result<AgentHealth> {
        let agent = self.get_agent(id).await?;
        Ok(health_of(&agent))
    }

    /// Health snapshots for the whole fleet
    pub async fn get_fleet_health(&self) -> Result<Vec<AgentHealth>> {
        let agents = self.store.list().await?;
        Ok(agents.iter().map(health_of).collect())
    }

    /// Teach an agent a new capability tag; repeat calls are no-ops
    pub async fn learn_new_capability(&self, id: &str, capability: &str) -> Result<Agent> {
        self.store
            .add_capability(id, capability)
            .await?
            .ok_or_else(|| Error::AgentNotFound(id.to_string()))
    }

    /// Remove an agent. Removing an unknown id is not an error.
    pub async fn deregister_agent(&self, id: &str) -> Result<()> {
        if self.store.remove(id).await? {
            info!("Agent {} deregistered", id);
        } else {
            debug!("Deregister of unknown agent {} ignored", id);
        }
        Ok(())
    }

    /// Fleet summary with per-capability counts
    pub async fn get_agent_statistics(&self) -> Result<AgentStatistics> {
        let agents = self.store.list().await?;

        let mut stats = AgentStatistics {
            total_agents: agents.len(),
            ..Default::default()
        };
        let mut skills: HashMap<String, usize> = HashMap::new();
        let mut rate_sum = 0.0;

        for agent in &agents {
            rate_sum += agent.success_rate;
            stats.total_current_load += agent.current_load as u64;
            for cap in &agent.capabilities {
                *skills.entry(cap.clone()).or_insert(0) += 1;
            }
        }

        stats.avg_success_rate = if agents.is_empty() {
            0.0
        } else {
            rate_sum / agents.len() as f64
        };
        stats.skill_distribution = skills;
        Ok(stats)
    }

    /// Count an assignment against the agent's load
    pub async fn increment_load(&self, id: &str) -> Result<()> {
        if !self.store.increment_load(id).await? {
            warn!("Load increment for unknown agent {}", id);
        }
        Ok(())
    }

    /// Release one unit of agent load
    pub async fn decrement_load(&self, id: &str) -> Result<()> {
        if !self.store.decrement_load(id).await? {
            warn!("Load decrement for unknown agent {}", id);
        }
        Ok(())
    }
}

fn health_of(agent: &Agent) -> AgentHealth {
    AgentHealth {
        agent_id: agent.id.clone(),
        healthy: agent.success_rate > HEALTH_THRESHOLD,
        success_rate: agent.success_rate,
        current_load: agent.current_load,
        max_concurrent_tasks: agent.max_concurrent_tasks,
        utilization: agent.utilization(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::store::SqliteAgentStore;

    fn registry() -> AgentRegistry {
        let store = SqliteAgentStore::in_memory().unwrap();
        AgentRegistry::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let registry = registry();
        registry
            .register_agent(Agent::new("agent-1", vec![]))
            .await
            .unwrap();

        let err = registry
            .register_agent(Agent::new("agent-1", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAgent(id) if id == "agent-1"));
    }

    #[tokio::test]
    async fn test_get_agent_not_found() {
        let registry = registry();
        let err = registry.get_agent("ghost").await.unwrap_err();
        assert!(matches!(err, Error::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_capability_matching_over_all_subsets() {
        // Every subset of a three-tag universe becomes one agent; every
        // subset becomes one query. The result must be exactly the agents
        // whose tag set is a superset of the query.
        let universe = ["alpha", "beta", "gamma"];
        let registry = registry();

        for mask in 0u32..8 {
            let caps: Vec<String> = universe
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, c)| c.to_string())
                .collect();
            registry
                .register_agent(Agent::new(format!("agent-{}", mask), caps))
                .await
                .unwrap();
        }

        for query_mask in 0u32..8 {
            let required: Vec<String> = universe
                .iter()
                .enumerate()
                .filter(|(i, _)| query_mask & (1 << i) != 0)
                .map(|(_, c)| c.to_string())
                .collect();

            let matched = registry
                .get_agents_by_capability(&required, &[])
                .await
                .unwrap();
            let matched_masks: Vec<u32> = matched
                .iter()
                .map(|a| a.id.trim_start_matches("agent-").parse().unwrap())
                .collect();

            for agent_mask in 0u32..8 {
                let is_superset = agent_mask & query_mask == query_mask;
                assert_eq!(
                    matched_masks.contains(&agent_mask),
                    is_superset,
                    "query {:03b} vs agent {:03b}",
                    query_mask,
                    agent_mask
                );
            }
        }
    }

    #[tokio::test]
    async fn test_empty_requirements_return_all_minus_excluded() {
        let registry = registry();
        registry
            .register_agent(Agent::new("a", vec!["x".to_string()]))
            .await
            .unwrap();
        registry
            .register_agent(Agent::new("b", vec!["y".to_string()]))
            .await
            .unwrap();

        let all = registry.get_agents_by_capability(&[], &[]).await.unwrap();
        assert_eq!(all.len(), 2);

        let minus_a = registry
            .get_agents_by_capability(&[], &["a".to_string()])
            .await
            .unwrap();
        assert_eq!(minus_a.len(), 1);
        assert_eq!(minus_a[0].id, "b");
    }

    #[tokio::test]
    async fn test_health_threshold() {
        let registry = registry();
        registry
            .register_agent(Agent::new("agent-1", vec![]))
            .await
            .unwrap();

        // 4 successes, 1 failure: rate exactly 0.8 is not healthy.
        for _ in 0..4 {
            registry
                .update_agent_performance("agent-1", true, 50)
                .await
                .unwrap();
        }
        registry
            .update_agent_performance("agent-1", false, 0)
            .await
            .unwrap();
        let health = registry.get_agent_health("agent-1").await.unwrap();
        assert!((health.success_rate - 0.8).abs() < f64::EPSILON);
        assert!(!health.healthy);

        // One more success pushes it above the bar.
        registry
            .update_agent_performance("agent-1", true, 50)
            .await
            .unwrap();
        let health = registry.get_agent_health("agent-1").await.unwrap();
        assert!(health.healthy);
    }

    #[tokio::test]
    async fn test_health_unknown_agent_is_error() {
        let registry = registry();
        assert!(matches!(
            registry.get_agent_health("ghost").await.unwrap_err(),
            Error::AgentNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_learn_capability_idempotent() {
        let registry = registry();
        registry
            .register_agent(Agent::new("agent-1", vec!["nlp".to_string()]))
            .await
            .unwrap();

        registry
            .learn_new_capability("agent-1", "vision")
            .await
            .unwrap();
        let agent = registry
            .learn_new_capability("agent-1", "vision")
            .await
            .unwrap();
        assert_eq!(agent.capabilities, vec!["nlp", "vision"]);

        assert!(matches!(
            registry
                .learn_new_capability("ghost", "vision")
                .await
                .unwrap_err(),
            Error::AgentNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_deregister_idempotent() {
        let registry = registry();
        registry
            .register_agent(Agent::new("agent-1", vec![]))
            .await
            .unwrap();

        registry.deregister_agent("agent-1").await.unwrap();
        // Second removal silently succeeds.
        registry.deregister_agent("agent-1").await.unwrap();
        assert!(registry.get_agent("agent-1").await.is_err());
    }

    #[tokio::test]
    async fn test_statistics_skill_distribution() {
        let registry = registry();
        registry
            .register_agent(Agent::new(
                "a",
                vec!["nlp".to_string(), "ocr".to_string()],
            ))
            .await
            .unwrap();
        registry
            .register_agent(Agent::new("b", vec!["nlp".to_string()]))
            .await
            .unwrap();

        let stats = registry.get_agent_statistics().await.unwrap();
        assert_eq!(stats.total_agents, 2);
        assert_eq!(stats.skill_distribution.get("nlp"), Some(&2));
        assert_eq!(stats.skill_distribution.get("ocr"), Some(&1));
        assert!((stats.avg_success_rate - 1.0).abs() < f64::EPSILON);
    }
}
