//! Sub-Agent Orchestration
//!
//! This module runs dependency graphs of sub-tasks across a fleet of
//! in-process sub-agents, with bounded concurrency and result feedback.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   SubAgentOrchestrator                       │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐    │
//! │  │ Worker A │  │ Worker B │  │ Worker C │  │ Worker N │    │
//! │  └────┬─────┘  └────┬─────┘  └────┬─────┘  └────┬─────┘    │
//! └───────┼─────────────┼─────────────┼─────────────┼───────────┘
//!         │             │             │             │
//!         ▼             ▼             ▼             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Wave scheduler                           │
//! │  - Dependency resolution                                     │
//! │  - Bounded parallel launch                                   │
//! │  - Output feedback into dependent context                    │
//! └─────────────────────────────────────────────────────────────┘
//!         │
//!         ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   OrchestrationReport                        │
//! │  - Per-node results                                          │
//! │  - Per-agent-type statistics                                 │
//! │  - Coordination effectiveness                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ao_core::orchestrator::{SubAgent, SubAgentOrchestrator, SubAgentTask};
//! use ao_core::config::OrchestratorConfig;
//! use std::sync::Arc;
//!
//! let mut orchestrator = SubAgentOrchestrator::new(OrchestratorConfig::default());
//! orchestrator.register(Arc::new(AnalysisAgent::new()));
//! orchestrator.register(Arc::new(ReportAgent::new()));
//!
//! let analyze = SubAgentTask::new("analysis", serde_json::json!({"target": "logs"}))
//!     .with_task_id("analyze");
//! let summarize = SubAgentTask::new("report", serde_json::json!({}))
//!     .with_task_id("summarize")
//!     .with_dependencies(vec!["analyze".into()]);
//!
//! let report = orchestrator.execute_parallel(vec![analyze, summarize]).await?;
//! println!("completed {}/{}", report.completed, report.total_tasks);
//! ```

pub mod agent;
pub mod engine;
pub mod types;

// Re-exports
pub use agent::{SubAgent, SubAgentHandle};
pub use engine::SubAgentOrchestrator;
pub use types::{
    AgentTypeStats, OrchestrationReport, SubAgentResult, SubAgentStatus, SubAgentTask,
};
