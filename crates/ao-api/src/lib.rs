//! ao-api: HTTP API for the Agent Orchestration Gateway
//!
//! Provides REST API endpoints for task submission, agent registration
//! and capability routing. Built with axum for async HTTP handling.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{start_server, AppState};
