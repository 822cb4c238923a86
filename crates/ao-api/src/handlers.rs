//! HTTP API handlers
//!
//! Request handlers for the task queue, agent registry and router.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use ao_core::registry::{Agent, AgentHealth, AgentStatistics};
use ao_core::routing::{RoutingDecision, RoutingStatistics};
use ao_core::task::{QueueStatistics, Task, TaskFilter, TaskPriority, TaskStatus};

use crate::error::ApiError;
use crate::server::AppState;

/// Pending backlog size above which more capacity is suggested
const QUEUE_DEPTH_WARN: usize = 50;
/// Fleet success rate below which investigation is suggested
const FLEET_SUCCESS_WARN: f64 = 0.8;

// ============================================================================
// Request/Response types
// ============================================================================

/// Task creation payload
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    /// Task description/payload
    pub content: String,
    /// Category used for routing and reporting
    pub task_type: String,
    /// "low" | "medium" | "high", defaults to medium
    pub priority: Option<String>,
    /// Capabilities an agent must have to take this task
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Task ids that must complete first
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Task list query parameters
#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    pub status: Option<String>,
    pub task_type: Option<String>,
    pub assigned_to: Option<String>,
    pub priority: Option<String>,
    pub limit: Option<usize>,
}

/// Poll query parameters
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub agent_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// Assignment payload
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub agent_id: String,
}

/// Completion payload
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    #[serde(default)]
    pub result: String,
    /// Measured execution time; derived from the start time when omitted
    pub duration_ms: Option<u64>,
}

/// Failure payload
#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub error: String,
    #[serde(default = "default_should_retry")]
    pub should_retry: bool,
}

fn default_should_retry() -> bool {
    true
}

/// Agent registration payload
#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub max_concurrent_tasks: Option<u32>,
    pub metadata: Option<JsonValue>,
}

/// Performance update payload
#[derive(Debug, Deserialize)]
pub struct PerformanceRequest {
    pub success: bool,
    pub duration_ms: u64,
}

/// Capability learning payload
#[derive(Debug, Deserialize)]
pub struct CapabilityRequest {
    pub capability: String,
}

/// Capability search query parameters
#[derive(Debug, Deserialize)]
pub struct CapableQuery {
    /// Comma-separated capability tags, all required
    pub requirements: Option<String>,
    /// Comma-separated agent ids to skip
    pub exclude: Option<String>,
}

/// Aggregate health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub total_agents: usize,
    pub healthy_agents: usize,
    pub timestamp: String,
}

/// Routing endpoint response
#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub decision: RoutingDecision,
    /// Present when the decision led to an assignment
    pub task: Option<Task>,
}

/// One operational hint
#[derive(Debug, Serialize)]
pub struct Recommendation {
    pub category: String,
    pub message: String,
}

/// Recommendations response
#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<Recommendation>,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Aggregate health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut degraded = false;

    let (total_agents, healthy_agents) = match state.registry.get_fleet_health().await {
        Ok(fleet) => {
            let healthy = fleet.iter().filter(|h| h.healthy).count();
            if healthy < fleet.len() {
                degraded = true;
            }
            (fleet.len(), healthy)
        }
        Err(e) => {
            warn!("Fleet health unavailable: {}", e);
            degraded = true;
            (0, 0)
        }
    };

    if let Err(e) = state.queue.get_queue_statistics().await {
        warn!("Queue statistics unavailable: {}", e);
        degraded = true;
    }

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        total_agents,
        healthy_agents,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Create a new task
pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    debug!("Create task request: {:?}", req);
    let priority = parse_priority(req.priority.as_deref())?;
    let task = state
        .queue
        .create_task(
            req.content,
            req.task_type,
            priority,
            req.requirements,
            req.dependencies,
        )
        .await?;
    Ok(Json(task))
}

/// Query tasks with filters
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TasksQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let mut filter = TaskFilter::new();
    if let Some(status) = parse_status(query.status.as_deref())? {
        filter = filter.status(status);
    }
    if let Some(task_type) = query.task_type {
        filter = filter.task_type(task_type);
    }
    if let Some(assigned_to) = query.assigned_to {
        filter = filter.assigned_to(assigned_to);
    }
    if let Some(priority) = query.priority.as_deref() {
        let priority = TaskPriority::parse(priority)
            .ok_or_else(|| ApiError::InvalidRequest(format!("unknown priority: {}", priority)))?;
        filter = filter.priority(priority);
    }
    if let Some(limit) = query.limit {
        filter = filter.limit(limit);
    }

    let tasks = state.queue.query_tasks(&filter).await?;
    Ok(Json(tasks))
}

/// Poll dispatch-ready tasks
pub async fn poll_tasks(
    State(state): State<AppState>,
    Query(query): Query<PollQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let status = parse_status(query.status.as_deref())?;
    let tasks = state
        .queue
        .poll_tasks(query.agent_id.as_deref(), status, query.limit)
        .await?;
    Ok(Json(tasks))
}

/// Get one task by id
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state.queue.get_task(&task_id).await?;
    Ok(Json(task))
}

/// Assign a task to a specific agent
pub async fn assign_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = state.queue.assign_task(&task_id, &req.agent_id).await?;
    Ok(Json(task))
}

/// Move an assigned task into execution
pub async fn start_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state.queue.start_task(&task_id).await?;
    Ok(Json(task))
}

/// Record successful completion
pub async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .queue
        .complete_task(&task_id, &req.result, req.duration_ms)
        .await?;
    Ok(Json(task))
}

/// Record a failure, with optional retry
pub async fn fail_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(req): Json<FailRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .queue
        .fail_task(&task_id, &req.error, req.should_retry)
        .await?;
    Ok(Json(task))
}

/// Route a task to the best available agent and assign it
pub async fn route_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<RouteResponse>, ApiError> {
    let task = state.queue.get_task(&task_id).await?;
    let decision = state.router.route_task(&task, &[]).await?;

    let task = match &decision.selected_agent {
        Some(agent_id) => {
            info!("Routing task {} to agent {}", task_id, agent_id);
            Some(state.queue.assign_task(&task_id, agent_id).await?)
        }
        None => {
            debug!(
                "No placement for task {}: {:?}",
                task_id, decision.outcome
            );
            None
        }
    };

    Ok(Json(RouteResponse { decision, task }))
}

/// Register a new agent
pub async fn register_agent(
    State(state): State<AppState>,
    Json(req): Json<RegisterAgentRequest>,
) -> Result<Json<Agent>, ApiError> {
    if req.id.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "agent id must not be empty".to_string(),
        ));
    }

    let mut agent = Agent::new(req.id, req.capabilities);
    if let Some(max) = req.max_concurrent_tasks {
        agent = agent.with_max_concurrent_tasks(max);
    }
    if let Some(metadata) = req.metadata {
        agent = agent.with_metadata(metadata);
    }

    state.registry.register_agent(agent.clone()).await?;
    info!("Registered agent {}", agent.id);
    Ok(Json(agent))
}

/// List all registered agents
pub async fn list_agents(
    State(state): State<AppState>,
) -> Result<Json<Vec<Agent>>, ApiError> {
    let agents = state.registry.list_agents().await?;
    Ok(Json(agents))
}

/// Get one agent by id
pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    let agent = state.registry.get_agent(&agent_id).await?;
    Ok(Json(agent))
}

/// Remove an agent from the registry
pub async fn deregister_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.deregister_agent(&agent_id).await?;
    info!("Deregistered agent {}", agent_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Health snapshot for one agent
pub async fn agent_health(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentHealth>, ApiError> {
    let health = state.registry.get_agent_health(&agent_id).await?;
    Ok(Json(health))
}

/// Health snapshots for the whole fleet
pub async fn fleet_health(
    State(state): State<AppState>,
) -> Result<Json<Vec<AgentHealth>>, ApiError> {
    let fleet = state.registry.get_fleet_health().await?;
    Ok(Json(fleet))
}

/// Fold a task outcome into an agent's performance counters
pub async fn update_performance(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(req): Json<PerformanceRequest>,
) -> Result<Json<Agent>, ApiError> {
    let agent = state
        .registry
        .update_agent_performance(&agent_id, req.success, req.duration_ms)
        .await?;
    Ok(Json(agent))
}

/// Add a capability tag to an agent
pub async fn learn_capability(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(req): Json<CapabilityRequest>,
) -> Result<Json<Agent>, ApiError> {
    if req.capability.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "capability must not be empty".to_string(),
        ));
    }
    let agent = state
        .registry
        .learn_new_capability(&agent_id, &req.capability)
        .await?;
    Ok(Json(agent))
}

/// Find agents carrying every required capability
pub async fn capable_agents(
    State(state): State<AppState>,
    Query(query): Query<CapableQuery>,
) -> Result<Json<Vec<Agent>>, ApiError> {
    let requirements = split_csv(query.requirements.as_deref().unwrap_or(""));
    let exclude = split_csv(query.exclude.as_deref().unwrap_or(""));
    let agents = state
        .registry
        .get_agents_by_capability(&requirements, &exclude)
        .await?;
    Ok(Json(agents))
}

/// Router lifetime counters
pub async fn routing_stats(State(state): State<AppState>) -> Json<RoutingStatistics> {
    Json(state.router.get_routing_statistics())
}

/// Aggregate queue counters
pub async fn queue_metrics(
    State(state): State<AppState>,
) -> Result<Json<QueueStatistics>, ApiError> {
    let stats = state.queue.get_queue_statistics().await?;
    Ok(Json(stats))
}

/// Heuristic operational hints
pub async fn recommendations(
    State(state): State<AppState>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let queue_stats = state.queue.get_queue_statistics().await?;
    let agent_stats = state.registry.get_agent_statistics().await?;
    let rebalance = state.router.should_rebalance().await?;

    Ok(Json(RecommendationsResponse {
        recommendations: build_recommendations(&queue_stats, &agent_stats, rebalance),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_priority(s: Option<&str>) -> Result<TaskPriority, ApiError> {
    match s {
        None => Ok(TaskPriority::Medium),
        Some(v) => TaskPriority::parse(v)
            .ok_or_else(|| ApiError::InvalidRequest(format!("unknown priority: {}", v))),
    }
}

fn parse_status(s: Option<&str>) -> Result<Option<TaskStatus>, ApiError> {
    match s {
        None => Ok(None),
        Some(v) => TaskStatus::parse(v)
            .map(Some)
            .ok_or_else(|| ApiError::InvalidRequest(format!("unknown status: {}", v))),
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

fn build_recommendations(
    queue: &QueueStatistics,
    agents: &AgentStatistics,
    rebalance: bool,
) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    if agents.total_agents == 0 && queue.pending > 0 {
        recs.push(Recommendation {
            category: "no_agents".to_string(),
            message: format!(
                "{} tasks are pending but no agents are registered",
                queue.pending
            ),
        });
    }
    if rebalance {
        recs.push(Recommendation {
            category: "load_balance".to_string(),
            message: "Agent load is heavily skewed; consider rebalancing assigned work"
                .to_string(),
        });
    }
    if queue.pending > QUEUE_DEPTH_WARN {
        recs.push(Recommendation {
            category: "queue_depth".to_string(),
            message: format!(
                "{} pending tasks exceed the {} watermark; add agents or capacity",
                queue.pending, QUEUE_DEPTH_WARN
            ),
        });
    }
    if agents.total_agents > 0 && agents.avg_success_rate < FLEET_SUCCESS_WARN {
        recs.push(Recommendation {
            category: "fleet_health".to_string(),
            message: format!(
                "Fleet success rate {:.2} is below {:.2}; inspect failing agents",
                agents.avg_success_rate, FLEET_SUCCESS_WARN
            ),
        });
    }

    recs
}
