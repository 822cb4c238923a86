//! Wave-based parallel executor for sub-agent task graphs

use super::agent::{SubAgent, SubAgentHandle};
use super::types::{OrchestrationReport, SubAgentResult, SubAgentTask};
use crate::config::OrchestratorConfig;
use crate::{Error, Result};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Coordinates a fleet of in-process sub-agents over dependency graphs
///
/// Tasks run in waves: every node whose dependencies have all completed
/// is launched concurrently (bounded by a semaphore), each wave joins
/// fully before the next is computed. A failed node never aborts its
/// siblings; its dependents are cancelled instead.
pub struct SubAgentOrchestrator {
    agents: HashMap<String, Arc<SubAgentHandle>>,
    config: OrchestratorConfig,
    semaphore: Arc<Semaphore>,
}

impl SubAgentOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            agents: HashMap::new(),
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Register a worker for its agent type, replacing any previous one
    pub fn register(&mut self, agent: Arc<dyn SubAgent>) -> Arc<SubAgentHandle> {
        let handle = Arc::new(SubAgentHandle::new(agent));
        debug!(
            agent_type = handle.agent_type(),
            agent_id = handle.id(),
            "registered sub-agent"
        );
        self.agents
            .insert(handle.agent_type().to_string(), handle.clone());
        handle
    }

    /// Registered agent types, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.agents.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_handle(&self, agent_type: &str) -> Option<Arc<SubAgentHandle>> {
        self.agents.get(agent_type).cloned()
    }

    /// Execute a full task graph and aggregate the outcome
    ///
    /// Nodes with an unregistered agent type or an unknown dependency id
    /// fail up front without running. If at any point no node is ready
    /// and no progress is possible, the submitted graph held a cycle and
    /// the run aborts with the results gathered so far.
    pub async fn execute_parallel(&self, tasks: Vec<SubAgentTask>) -> Result<OrchestrationReport> {
        let mut known_ids = HashSet::new();
        for task in &tasks {
            if !known_ids.insert(task.task_id.clone()) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate sub-task id: {}",
                    task.task_id
                )));
            }
        }

        let mut results: HashMap<String, SubAgentResult> = HashMap::new();
        let mut remaining: Vec<SubAgentTask> = Vec::new();

        for task in &tasks {
            if let Some(missing) = task
                .dependencies
                .iter()
                .find(|dep| !known_ids.contains(*dep))
            {
                results.insert(
                    task.task_id.clone(),
                    SubAgentResult::failure(
                        self.agent_id_for(&task.agent_type),
                        &task.agent_type,
                        format!("unknown dependency: {}", missing),
                        0,
                    ),
                );
            } else if !self.agents.contains_key(&task.agent_type) {
                results.insert(
                    task.task_id.clone(),
                    SubAgentResult::failure(
                        self.agent_id_for(&task.agent_type),
                        &task.agent_type,
                        format!("no agent registered for type: {}", task.agent_type),
                        0,
                    ),
                );
            } else {
                remaining.push(task.clone());
            }
        }

        let default_timeout = Duration::from_secs(self.config.default_timeout_secs);

        while !remaining.is_empty() {
            self.cancel_doomed(&mut remaining, &mut results);
            if remaining.is_empty() {
                break;
            }

            // every dependency still in results is a success at this point
            let mut wave: Vec<SubAgentTask> = Vec::new();
            remaining.retain(|task| {
                let ready = task.dependencies.iter().all(|dep| results.contains_key(dep));
                if ready {
                    wave.push(task.clone());
                }
                !ready
            });

            if wave.is_empty() {
                let mut unresolved: Vec<String> =
                    remaining.iter().map(|t| t.task_id.clone()).collect();
                unresolved.sort();
                warn!(?unresolved, "no runnable sub-tasks left, dependency cycle");
                return Err(Error::DependencyCycle {
                    unresolved,
                    partial: results,
                });
            }

            wave.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.task_id.cmp(&b.task_id))
            });
            debug!(wave_size = wave.len(), "launching wave");

            let mut join_set = JoinSet::new();
            for task in &wave {
                let mut task = task.clone();
                if self.config.feedback_enabled {
                    for dep in task.dependencies.clone() {
                        if let Some(dep_result) = results.get(&dep) {
                            task.context
                                .insert(format!("output_{}", dep), dep_result.output.clone());
                        }
                    }
                }

                let handle = self
                    .agents
                    .get(&task.agent_type)
                    .cloned()
                    .ok_or_else(|| Error::AgentNotFound(task.agent_type.clone()))?;
                let permit = self.semaphore.clone().acquire_owned().await.unwrap();
                join_set.spawn(async move {
                    let result = handle.execute(&task, default_timeout).await;
                    drop(permit);
                    (task.task_id, result)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((task_id, result)) => {
                        results.insert(task_id, result);
                    }
                    Err(e) => {
                        warn!("sub-task aborted before producing a result: {}", e);
                    }
                }
            }

            // a panicked node leaves no entry; record it as failed
            for task in &wave {
                if !results.contains_key(&task.task_id) {
                    results.insert(
                        task.task_id.clone(),
                        SubAgentResult::failure(
                            self.agent_id_for(&task.agent_type),
                            &task.agent_type,
                            "sub-task panicked",
                            0,
                        ),
                    );
                }
            }
        }

        let report = OrchestrationReport::from_results(results, &tasks);
        info!(
            total = report.total_tasks,
            completed = report.completed,
            failed = report.failed,
            "orchestration run finished"
        );
        Ok(report)
    }

    /// Fan one operation out to several agent types at once
    ///
    /// Builds one independent sub-task per requested type, earlier types
    /// launching first, and runs them as a single-wave graph.
    pub async fn execute_operation(
        &self,
        operation_type: &str,
        operation_data: JsonValue,
        agent_types: &[String],
    ) -> Result<OrchestrationReport> {
        if agent_types.is_empty() {
            return Err(Error::InvalidArgument(
                "no agent types requested for operation".to_string(),
            ));
        }

        let total = agent_types.len() as i32;
        let tasks: Vec<SubAgentTask> = agent_types
            .iter()
            .enumerate()
            .map(|(i, agent_type)| {
                SubAgentTask::new(agent_type.clone(), operation_data.clone())
                    .with_task_id(format!("{}-{}", operation_type, agent_type))
                    .with_priority(total - i as i32)
                    .with_context_value(
                        "operation_type",
                        JsonValue::String(operation_type.to_string()),
                    )
            })
            .collect();

        info!(
            operation = operation_type,
            fanout = agent_types.len(),
            "executing fan-out operation"
        );
        self.execute_parallel(tasks).await
    }

    /// Cancel every pending node with a dependency that did not complete,
    /// cascading until a fixpoint
    fn cancel_doomed(
        &self,
        remaining: &mut Vec<SubAgentTask>,
        results: &mut HashMap<String, SubAgentResult>,
    ) {
        loop {
            let mut doomed: Vec<SubAgentTask> = Vec::new();
            remaining.retain(|task| {
                let blocked = task.dependencies.iter().any(|dep| {
                    results
                        .get(dep)
                        .map(|r| !r.status.is_success())
                        .unwrap_or(false)
                });
                if blocked {
                    doomed.push(task.clone());
                }
                !blocked
            });
            if doomed.is_empty() {
                break;
            }
            for task in doomed {
                let culprit = task
                    .dependencies
                    .iter()
                    .find(|dep| {
                        results
                            .get(*dep)
                            .map(|r| !r.status.is_success())
                            .unwrap_or(false)
                    })
                    .cloned()
                    .unwrap_or_default();
                debug!(task_id = %task.task_id, dependency = %culprit, "cancelling sub-task");
                results.insert(
                    task.task_id.clone(),
                    SubAgentResult::cancelled(
                        self.agent_id_for(&task.agent_type),
                        &task.agent_type,
                        format!("dependency {} did not complete", culprit),
                    ),
                );
            }
        }
    }

    fn agent_id_for(&self, agent_type: &str) -> String {
        self.agents
            .get(agent_type)
            .map(|h| h.id().to_string())
            .unwrap_or_else(|| agent_type.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::super::SubAgentStatus;
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn test_config(max_concurrency: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrency,
            default_timeout_secs: 10,
            feedback_enabled: true,
        }
    }

    /// Logs execution order and echoes its id and visible context
    struct TracingAgent {
        kind: String,
        log: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl SubAgent for TracingAgent {
        fn agent_type(&self) -> &str {
            &self.kind
        }

        async fn do_work(&self, task: &SubAgentTask) -> Result<JsonValue> {
            self.log.lock().unwrap().push(task.task_id.clone());
            Ok(json!({"id": task.task_id, "context": task.context}))
        }
    }

    struct FailingAgent;

    #[async_trait]
    impl SubAgent for FailingAgent {
        fn agent_type(&self) -> &str {
            "failing"
        }

        async fn do_work(&self, _task: &SubAgentTask) -> Result<JsonValue> {
            Err(Error::Other("simulated failure".to_string()))
        }
    }

    /// Tracks how many executions overlap
    struct CountingAgent {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SubAgent for CountingAgent {
        fn agent_type(&self) -> &str {
            "counting"
        }

        async fn do_work(&self, _task: &SubAgentTask) -> Result<JsonValue> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(JsonValue::Null)
        }
    }

    fn tracing_orchestrator(
        max_concurrency: usize,
    ) -> (SubAgentOrchestrator, Arc<StdMutex<Vec<String>>>) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut orchestrator = SubAgentOrchestrator::new(test_config(max_concurrency));
        orchestrator.register(Arc::new(TracingAgent {
            kind: "worker".to_string(),
            log: log.clone(),
        }));
        (orchestrator, log)
    }

    #[tokio::test]
    async fn test_single_task_completes() -> Result<()> {
        let (orchestrator, _log) = tracing_orchestrator(4);
        let task = SubAgentTask::new("worker", json!({"n": 1})).with_task_id("only");

        let report = orchestrator.execute_parallel(vec![task]).await?;
        assert_eq!(report.total_tasks, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.results["only"].status, SubAgentStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_chain_runs_in_order_with_feedback() -> Result<()> {
        let (orchestrator, log) = tracing_orchestrator(4);
        let tasks = vec![
            SubAgentTask::new("worker", json!({})).with_task_id("a"),
            SubAgentTask::new("worker", json!({}))
                .with_task_id("b")
                .with_dependencies(vec!["a".to_string()]),
            SubAgentTask::new("worker", json!({}))
                .with_task_id("c")
                .with_dependencies(vec!["b".to_string()]),
        ];

        let report = orchestrator.execute_parallel(tasks).await?;
        assert_eq!(report.completed, 3);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);

        // b saw a's output, c saw b's
        let b_ctx = &report.results["b"].output["context"];
        assert_eq!(b_ctx["output_a"]["id"], json!("a"));
        let c_ctx = &report.results["c"].output["context"];
        assert_eq!(c_ctx["output_b"]["id"], json!("b"));
        assert!((report.coordination_effectiveness - 1.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[tokio::test]
    async fn test_feedback_can_be_disabled() -> Result<()> {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut config = test_config(4);
        config.feedback_enabled = false;
        let mut orchestrator = SubAgentOrchestrator::new(config);
        orchestrator.register(Arc::new(TracingAgent {
            kind: "worker".to_string(),
            log,
        }));

        let tasks = vec![
            SubAgentTask::new("worker", json!({})).with_task_id("a"),
            SubAgentTask::new("worker", json!({}))
                .with_task_id("b")
                .with_dependencies(vec!["a".to_string()]),
        ];

        let report = orchestrator.execute_parallel(tasks).await?;
        let b_ctx = &report.results["b"].output["context"];
        assert!(b_ctx.get("output_a").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrency_cap_respected() -> Result<()> {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut orchestrator = SubAgentOrchestrator::new(test_config(1));
        orchestrator.register(Arc::new(CountingAgent {
            current: current.clone(),
            peak: peak.clone(),
        }));

        let tasks: Vec<SubAgentTask> = (0..3)
            .map(|i| SubAgentTask::new("counting", json!({})).with_task_id(format!("t{}", i)))
            .collect();

        let report = orchestrator.execute_parallel(tasks).await?;
        assert_eq!(report.completed, 3);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_priority_orders_launch_within_wave() -> Result<()> {
        let (orchestrator, log) = tracing_orchestrator(1);
        let tasks = vec![
            SubAgentTask::new("worker", json!({}))
                .with_task_id("low")
                .with_priority(1),
            SubAgentTask::new("worker", json!({}))
                .with_task_id("high")
                .with_priority(5),
            SubAgentTask::new("worker", json!({}))
                .with_task_id("mid")
                .with_priority(3),
        ];

        orchestrator.execute_parallel(tasks).await?;
        assert_eq!(*log.lock().unwrap(), vec!["high", "mid", "low"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_isolation_and_cascade() -> Result<()> {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut orchestrator = SubAgentOrchestrator::new(test_config(4));
        orchestrator.register(Arc::new(TracingAgent {
            kind: "worker".to_string(),
            log: log.clone(),
        }));
        orchestrator.register(Arc::new(FailingAgent));

        let tasks = vec![
            SubAgentTask::new("failing", json!({})).with_task_id("a"),
            SubAgentTask::new("worker", json!({})).with_task_id("b"),
            SubAgentTask::new("worker", json!({}))
                .with_task_id("c")
                .with_dependencies(vec!["a".to_string()]),
        ];

        let report = orchestrator.execute_parallel(tasks).await?;
        assert_eq!(report.results["a"].status, SubAgentStatus::Failed);
        assert_eq!(report.results["b"].status, SubAgentStatus::Completed);
        assert_eq!(report.results["c"].status, SubAgentStatus::Cancelled);
        assert!(report.results["c"]
            .error
            .as_ref()
            .unwrap()
            .contains("dependency a"));
        assert_eq!(
            report.failed_task_ids,
            vec!["a".to_string(), "c".to_string()]
        );
        // the sibling ran, the dependent never did
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
        assert!((report.coordination_effectiveness - 0.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[tokio::test]
    async fn test_cascade_spans_multiple_levels() -> Result<()> {
        let mut orchestrator = SubAgentOrchestrator::new(test_config(4));
        let log = Arc::new(StdMutex::new(Vec::new()));
        orchestrator.register(Arc::new(TracingAgent {
            kind: "worker".to_string(),
            log,
        }));
        orchestrator.register(Arc::new(FailingAgent));

        let tasks = vec![
            SubAgentTask::new("failing", json!({})).with_task_id("root"),
            SubAgentTask::new("worker", json!({}))
                .with_task_id("mid")
                .with_dependencies(vec!["root".to_string()]),
            SubAgentTask::new("worker", json!({}))
                .with_task_id("leaf")
                .with_dependencies(vec!["mid".to_string()]),
        ];

        let report = orchestrator.execute_parallel(tasks).await?;
        assert_eq!(report.results["mid"].status, SubAgentStatus::Cancelled);
        assert_eq!(report.results["leaf"].status, SubAgentStatus::Cancelled);
        Ok(())
    }

    #[tokio::test]
    async fn test_cycle_detection_returns_partials() {
        let (orchestrator, _log) = tracing_orchestrator(4);
        let tasks = vec![
            SubAgentTask::new("worker", json!({}))
                .with_task_id("a")
                .with_dependencies(vec!["b".to_string()]),
            SubAgentTask::new("worker", json!({}))
                .with_task_id("b")
                .with_dependencies(vec!["a".to_string()]),
            SubAgentTask::new("worker", json!({})).with_task_id("c"),
        ];

        let err = orchestrator.execute_parallel(tasks).await.unwrap_err();
        match err {
            Error::DependencyCycle { unresolved, partial } => {
                assert_eq!(unresolved, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(partial["c"].status, SubAgentStatus::Completed);
            }
            other => panic!("expected DependencyCycle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_agent_type_fails_only_that_task() -> Result<()> {
        let (orchestrator, _log) = tracing_orchestrator(4);
        let tasks = vec![
            SubAgentTask::new("ghost", json!({})).with_task_id("a"),
            SubAgentTask::new("worker", json!({})).with_task_id("b"),
        ];

        let report = orchestrator.execute_parallel(tasks).await?;
        assert_eq!(report.results["a"].status, SubAgentStatus::Failed);
        assert!(report.results["a"]
            .error
            .as_ref()
            .unwrap()
            .contains("no agent registered"));
        assert_eq!(report.results["b"].status, SubAgentStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_dependency_fails_immediately() -> Result<()> {
        let (orchestrator, _log) = tracing_orchestrator(4);
        let task = SubAgentTask::new("worker", json!({}))
            .with_task_id("a")
            .with_dependencies(vec!["nope".to_string()]);

        let report = orchestrator.execute_parallel(vec![task]).await?;
        assert_eq!(report.results["a"].status, SubAgentStatus::Failed);
        assert!(report.results["a"]
            .error
            .as_ref()
            .unwrap()
            .contains("unknown dependency"));
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_task_ids_rejected() {
        let (orchestrator, _log) = tracing_orchestrator(4);
        let tasks = vec![
            SubAgentTask::new("worker", json!({})).with_task_id("x"),
            SubAgentTask::new("worker", json!({})).with_task_id("x"),
        ];

        let err = orchestrator.execute_parallel(tasks).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_execute_operation_fans_out() -> Result<()> {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut orchestrator = SubAgentOrchestrator::new(test_config(4));
        for kind in ["analysis", "synthesis"] {
            orchestrator.register(Arc::new(TracingAgent {
                kind: kind.to_string(),
                log: log.clone(),
            }));
        }

        let report = orchestrator
            .execute_operation(
                "audit",
                json!({"target": "ledger"}),
                &["analysis".to_string(), "synthesis".to_string()],
            )
            .await?;

        assert_eq!(report.total_tasks, 2);
        assert_eq!(report.completed, 2);
        assert!(report.results.contains_key("audit-analysis"));
        assert!(report.results.contains_key("audit-synthesis"));
        assert_eq!(report.by_agent_type["analysis"].succeeded, 1);
        assert_eq!(report.by_agent_type["synthesis"].succeeded, 1);

        // the operation type is visible to every worker
        let ctx = &report.results["audit-analysis"].output["context"];
        assert_eq!(ctx["operation_type"], json!("audit"));
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_operation_rejects_empty_fanout() {
        let (orchestrator, _log) = tracing_orchestrator(4);
        let err = orchestrator
            .execute_operation("audit", json!({}), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_handle_counters_visible_after_run() -> Result<()> {
        let (orchestrator, _log) = tracing_orchestrator(4);
        let tasks: Vec<SubAgentTask> = (0..4)
            .map(|i| SubAgentTask::new("worker", json!({})).with_task_id(format!("t{}", i)))
            .collect();
        orchestrator.execute_parallel(tasks).await?;

        let handle = orchestrator.get_handle("worker").unwrap();
        assert_eq!(handle.attempts(), 4);
        assert!((handle.get_success_rate() - 1.0).abs() < f64::EPSILON);
        Ok(())
    }
}
