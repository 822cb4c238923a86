//! ao-core: Agent Orchestration Core Library
//!
//! Persistent task queue, agent registry, capability routing and
//! in-process sub-agent orchestration for the gateway.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod routing;
pub mod task;

pub use config::{ApiConfig, Config, OrchestratorConfig, QueueConfig, StorageConfig};
pub use error::{Error, Result};
pub use orchestrator::{
    OrchestrationReport, SubAgent, SubAgentOrchestrator, SubAgentResult, SubAgentTask,
};
pub use registry::{Agent, AgentRegistry, AgentRepository, SqliteAgentStore};
pub use routing::{CapabilityRouter, RoutingDecision, RoutingStatistics};
pub use task::{
    QueueStatistics, SqliteTaskStore, Task, TaskFilter, TaskPriority, TaskQueue, TaskRepository,
    TaskStatus,
};
