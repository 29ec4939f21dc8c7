//! The globally ordered wait queue for human assignment.
//!
//! Entries are keyed by `(priority_rank DESC, enqueued_at ASC, seq ASC)`;
//! the sequence number makes the order total and stable under equal
//! timestamps. A single mutex guards the structure; every operation is
//! `O(log n)` against the ordered map plus an `O(n)` position
//! reassessment.
//!
//! Backpressure: above the configured overflow limit new LOW-priority
//! entries are rejected with `queue_full`; CRITICAL entries are never
//! rejected.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use handoff_types::error::{HandoffError, Result};
use handoff_types::config::QueueConfig;
use handoff_types::queue::{Complexity, EntryStatus, Priority, QueueEntry};
use handoff_types::request::FrustrationLevel;

/// Service-time EWMA smoothing factor.
const SERVICE_ALPHA: f64 = 0.2;

/// Ordering key: higher priority first, then FIFO by enqueue time, with
/// a monotone sequence number as the total-order tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderKey {
    rank: u8,
    enqueued_at: DateTime<Utc>,
    seq: u64,
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // rank DESC, enqueued_at ASC, seq ASC.
        other
            .rank
            .cmp(&self.rank)
            .then(self.enqueued_at.cmp(&other.enqueued_at))
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// What the caller wants enqueued.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    /// The request awaiting a human.
    pub request_id: Uuid,
    /// Urgency bucket.
    pub priority: Priority,
    /// Complexity estimate.
    pub complexity: Complexity,
    /// Skills the handling agent should have.
    pub required_skills: Vec<String>,
    /// Frustration level at enqueue time.
    pub frustration_level: FrustrationLevel,
}

struct Inner {
    entries: BTreeMap<OrderKey, QueueEntry>,
    by_entry: HashMap<Uuid, OrderKey>,
    by_request: HashMap<Uuid, Uuid>,
    seq: u64,
    /// Rolling mean service seconds per priority rank.
    service_secs: HashMap<u8, f64>,
    /// Agents currently able to take work; feeds the wait estimate.
    active_agents: usize,
}

/// The wait queue.
pub struct WaitQueue {
    inner: Mutex<Inner>,
}

impl WaitQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                by_entry: HashMap::new(),
                by_request: HashMap::new(),
                seq: 0,
                service_secs: HashMap::new(),
                active_agents: 1,
            }),
        }
    }

    /// Insert a new entry, assigning its position and wait estimate.
    ///
    /// # Errors
    ///
    /// [`HandoffError::QueueFull`] when the queue is over the overflow
    /// limit and the entry is LOW priority. CRITICAL is never rejected.
    pub fn enqueue(&self, req: EnqueueRequest, config: &QueueConfig) -> Result<QueueEntry> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let length = inner.entries.len();
        if length >= config.overflow_limit && req.priority == Priority::Low {
            debug!(length, "rejecting low-priority entry under backpressure");
            return Err(HandoffError::QueueFull { length });
        }

        inner.seq += 1;
        let key = OrderKey {
            rank: req.priority.rank(),
            enqueued_at: Utc::now(),
            seq: inner.seq,
        };
        let entry = QueueEntry {
            entry_id: Uuid::new_v4(),
            request_id: req.request_id,
            priority: req.priority,
            complexity: req.complexity,
            required_skills: req.required_skills,
            frustration_level: req.frustration_level,
            enqueued_at: key.enqueued_at,
            max_wait_seconds: config.default_max_wait_secs,
            position: 0,
            estimated_assignment_at: None,
            assigned_agent_id: None,
            status: EntryStatus::Queued,
        };
        inner.by_entry.insert(entry.entry_id, key);
        inner.by_request.insert(entry.request_id, entry.entry_id);
        inner.entries.insert(key, entry.clone());
        Self::reassess_locked(&mut inner, config);

        let entry = inner.entries[&key].clone();
        info!(
            entry_id = %entry.entry_id,
            request_id = %entry.request_id,
            priority = ?entry.priority,
            position = entry.position,
            "request enqueued"
        );
        Ok(entry)
    }

    /// Cancel an entry (customer abandonment). Idempotent; returns the
    /// cancelled entry if it was still waiting.
    pub fn cancel(&self, entry_id: Uuid, config: &QueueConfig) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = inner.by_entry.remove(&entry_id)?;
        let mut entry = inner.entries.remove(&key)?;
        inner.by_request.remove(&entry.request_id);
        entry.status = EntryStatus::Cancelled;
        Self::reassess_locked(&mut inner, config);
        info!(entry_id = %entry_id, "queue entry cancelled");
        Some(entry)
    }

    /// Cancel by request id. Idempotent.
    pub fn cancel_by_request(&self, request_id: Uuid, config: &QueueConfig) -> Option<QueueEntry> {
        let entry_id = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.by_request.get(&request_id).copied()
        }?;
        self.cancel(entry_id, config)
    }

    /// Remove an entry for assignment to `agent_id`. Returns the entry
    /// marked assigned, or `None` when it was already taken or cancelled.
    pub fn take(
        &self,
        entry_id: Uuid,
        agent_id: &str,
        config: &QueueConfig,
    ) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = inner.by_entry.remove(&entry_id)?;
        let mut entry = inner.entries.remove(&key)?;
        inner.by_request.remove(&entry.request_id);
        entry.status = EntryStatus::Assigned;
        entry.assigned_agent_id = Some(agent_id.to_string());
        Self::reassess_locked(&mut inner, config);
        info!(entry_id = %entry_id, agent_id, "queue entry assigned");
        Some(entry)
    }

    /// The waiting entries in queue order. Positions reflect the last
    /// reassessment.
    pub fn waiting(&self) -> Vec<QueueEntry> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.values().cloned().collect()
    }

    /// Queue length.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue length per priority.
    pub fn len_by_priority(&self) -> HashMap<Priority, usize> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut counts = HashMap::new();
        for entry in inner.entries.values() {
            *counts.entry(entry.priority).or_insert(0) += 1;
        }
        counts
    }

    /// Whether a request currently has a waiting entry.
    pub fn position_of(&self, request_id: Uuid) -> Option<(usize, Option<DateTime<Utc>>)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry_id = inner.by_request.get(&request_id)?;
        let key = inner.by_entry.get(entry_id)?;
        let entry = inner.entries.get(key)?;
        Some((entry.position, entry.estimated_assignment_at))
    }

    /// Record an observed service time for the wait estimator.
    pub fn record_service_time(&self, priority: Priority, seconds: f64, config: &QueueConfig) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let seed = config.initial_service_time_secs;
        let mean = inner
            .service_secs
            .entry(priority.rank())
            .or_insert(seed);
        *mean = SERVICE_ALPHA * seconds.max(0.0) + (1.0 - SERVICE_ALPHA) * *mean;
    }

    /// Update the active-agent count used by the wait estimator and
    /// refresh positions.
    pub fn set_active_agents(&self, count: usize, config: &QueueConfig) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.active_agents = count.max(1);
        Self::reassess_locked(&mut inner, config);
    }

    /// Recompute positions and wait estimates for every waiting entry.
    ///
    /// Position is 1-based in queue order. The estimate is Little's-law
    /// shaped: `position * mean_service(priority) / active_agents`.
    fn reassess_locked(inner: &mut Inner, config: &QueueConfig) {
        let active = inner.active_agents.max(1) as f64;
        let now = Utc::now();
        let service_secs = inner.service_secs.clone();
        for (position, entry) in inner.entries.values_mut().enumerate() {
            entry.position = position + 1;
            let mean = service_secs
                .get(&entry.priority.rank())
                .copied()
                .unwrap_or(config.initial_service_time_secs);
            let wait_secs = (entry.position as f64) * mean / active;
            entry.estimated_assignment_at =
                Some(now + ChronoDuration::seconds(wait_secs.round() as i64));
        }
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
