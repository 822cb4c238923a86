//! Capability routing module
//!
//! Scores capable agents against their current load and picks the best
//! placement for a task.

mod router;
mod types;

pub use router::{CapabilityRouter, rank_candidates};
pub use types::{CandidateScore, RoutingDecision, RoutingOutcome, RoutingStatistics};
