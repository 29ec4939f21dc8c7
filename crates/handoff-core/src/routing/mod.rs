//! Human-agent routing: weighted scoring, hard filters, and selection.
//!
//! Selection is snapshot -> hard filters -> weighted category scores ->
//! claim/commit, with a fresh re-score on a lost commit race. The weight
//! row comes from the request priority, optionally swapped wholesale by a
//! deterministic A/B experiment variant.

pub mod filters;
pub mod score;
pub mod select;

pub use filters::{FilterReason, hard_filter};
pub use score::{CategoryScores, CustomerFactors, RoutingDemand, score_agent};
pub use select::{RouteOutcome, peek_for_agent, select_agent};
