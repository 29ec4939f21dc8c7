//! Wait-queue records: [`QueueEntry`], [`Priority`], [`Complexity`].
//!
//! The queue itself lives in `handoff-core`; this module holds the
//! serializable record types and the priority-rank rule the queue order
//! is built on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::FrustrationLevel;

/// Request urgency bucket. Drives the routing weight table and the queue
/// ordering; distinct from an agent's wellbeing filters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Routine question, no urgency signals.
    Low,
    /// Default bucket.
    Medium,
    /// Elevated frustration or explicit urgency.
    High,
    /// Must be handled immediately; never rejected by backpressure.
    Critical,
}

impl Priority {
    /// Numeric rank used by the queue ordering: critical=3 .. low=0.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    /// All priorities, lowest rank first.
    pub fn all() -> [Priority; 4] {
        [
            Priority::Low,
            Priority::Medium,
            Priority::High,
            Priority::Critical,
        ]
    }
}

/// Request complexity estimate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Single-step, well-covered by templates.
    Low,
    /// Default bucket.
    Medium,
    /// Multi-step or specialist work; counts as difficult for wellbeing.
    High,
}

/// Lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for an agent.
    Queued,
    /// Handed to an agent.
    Assigned,
    /// The assignment finished.
    Completed,
    /// The customer abandoned the request.
    Cancelled,
}

/// Record representing a request awaiting human assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique entry id.
    pub entry_id: Uuid,
    /// The request this entry belongs to.
    pub request_id: Uuid,
    /// Urgency bucket; the primary ordering key.
    pub priority: Priority,
    /// Complexity estimate carried for agent matching.
    pub complexity: Complexity,
    /// Skills the handling agent should have.
    pub required_skills: Vec<String>,
    /// Frustration level at enqueue time.
    pub frustration_level: FrustrationLevel,
    /// When the entry was enqueued; the secondary ordering key.
    pub enqueued_at: DateTime<Utc>,
    /// Wait budget before the entry is considered overdue.
    pub max_wait_seconds: u64,
    /// 1-based position in the queue order; recomputed on reassessment.
    pub position: usize,
    /// Little's-law estimate of when an agent will pick this up.
    pub estimated_assignment_at: Option<DateTime<Utc>>,
    /// Agent the entry was handed to, once assigned.
    pub assigned_agent_id: Option<String>,
    /// Entry lifecycle status.
    pub status: EntryStatus,
}
