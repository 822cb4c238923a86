//! Route definitions
//!
//! Defines all HTTP API endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers::{
    agent_health, assign_task, capable_agents, complete_task, create_task, deregister_agent,
    fail_task, fleet_health, get_agent, get_task, health, learn_capability, list_agents,
    list_tasks, poll_tasks, queue_metrics, recommendations, register_agent, route_task,
    routing_stats, start_task, update_performance,
};
use crate::server::AppState;

/// Create the API router
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Task lifecycle
        .route("/api/tasks", post(create_task))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/poll", get(poll_tasks))
        .route("/api/tasks/{task_id}", get(get_task))
        .route("/api/tasks/{task_id}/assign", post(assign_task))
        .route("/api/tasks/{task_id}/start", post(start_task))
        .route("/api/tasks/{task_id}/complete", post(complete_task))
        .route("/api/tasks/{task_id}/fail", post(fail_task))
        .route("/api/tasks/{task_id}/route", post(route_task))
        // Agent registry
        .route("/api/agents", post(register_agent))
        .route("/api/agents", get(list_agents))
        .route("/api/agents/capable", get(capable_agents))
        .route("/api/agents/health", get(fleet_health))
        .route("/api/agents/{agent_id}", get(get_agent))
        .route("/api/agents/{agent_id}", delete(deregister_agent))
        .route("/api/agents/{agent_id}/health", get(agent_health))
        .route("/api/agents/{agent_id}/performance", post(update_performance))
        .route("/api/agents/{agent_id}/capability", post(learn_capability))
        // Routing and monitoring
        .route("/api/routing/stats", get(routing_stats))
        .route("/api/queue/metrics", get(queue_metrics))
        .route("/api/recommendations", get(recommendations))
}
