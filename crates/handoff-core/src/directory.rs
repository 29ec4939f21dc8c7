//! The human-agent directory.
//!
//! Holds every agent's immutable profile and mutable real-time state.
//! All state mutations go through per-agent exclusive sections (one
//! mutex per agent, never held across await points), so directory
//! writes are serializable per agent while reads of different agents
//! never contend.
//!
//! Assignment is two-phase: [`AgentDirectory::claim_for_assignment`]
//! takes a short-lived exclusive claim (re-checking capacity and
//! presence under the lock), and [`AgentDirectory::commit_assignment`]
//! turns the claim into a workload increment atomically. A scorer that
//! loses the race gets a [`ClaimError`] and re-scores against a fresh
//! snapshot.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use handoff_types::agent::{AgentProfile, AgentSnapshot, AgentState, AgentStatus};
use handoff_types::config::AgentSeed;
use handoff_types::error::{HandoffError, Result};
use handoff_types::queue::Complexity;
use handoff_types::request::FrustrationLevel;

/// Satisfaction / resolution-time EWMA smoothing factor.
const ROLLING_ALPHA: f64 = 0.2;

/// Claims older than this are considered leaked and ignored.
const CLAIM_TTL: Duration = Duration::from_secs(5);

/// Why a claim was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// The agent id is not in the directory.
    #[error("agent not found")]
    NotFound,
    /// The agent signed off between snapshot and claim.
    #[error("agent offline")]
    Offline,
    /// The agent reached capacity between snapshot and claim.
    #[error("agent at capacity")]
    AtCapacity,
    /// Another scorer holds a live claim on this agent.
    #[error("agent already claimed")]
    AlreadyClaimed,
}

/// An exclusive claim on one agent, redeemable by exactly one commit.
#[derive(Debug)]
pub struct ClaimToken {
    token: Uuid,
    agent_id: String,
}

impl ClaimToken {
    /// The claimed agent.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}

/// Completion report for an assignment, used to update rolling metrics.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// Customer frustration on the completed case.
    pub frustration_level: FrustrationLevel,
    /// Complexity of the completed case.
    pub complexity: Complexity,
    /// Whether the agent escalated the case.
    pub escalated: bool,
    /// Whether the case resolved on first contact.
    pub first_contact_resolution: bool,
    /// Customer satisfaction rating in `0.0..=5.0`, when given.
    pub satisfaction_rating: Option<f64>,
    /// Minutes from assignment to completion.
    pub resolution_minutes: f64,
}

impl CompletionOutcome {
    /// A case is difficult when frustration was HIGH/CRITICAL or
    /// complexity was high.
    pub fn is_difficult(&self) -> bool {
        self.frustration_level.is_difficult() || self.complexity == Complexity::High
    }
}

/// One recorded case used by the stress tick's exposure window.
#[derive(Debug, Clone)]
pub(crate) struct CaseExposure {
    pub completed_at: DateTime<Utc>,
    pub frustration_level: FrustrationLevel,
    pub complexity: Complexity,
}

struct Claim {
    token: Uuid,
    taken_at: Instant,
}

struct SlotState {
    state: AgentState,
    claim: Option<Claim>,
    /// Running totals behind escalation / first-contact rates.
    total_cases: u64,
    escalated_cases: u64,
    first_contact_cases: u64,
    /// Recent completions for the stress exposure window.
    recent_cases: VecDeque<CaseExposure>,
    /// End of a forced break, when the stress tick imposed one.
    forced_break_until: Option<DateTime<Utc>>,
}

struct AgentSlot {
    profile: AgentProfile,
    state: Mutex<SlotState>,
}

/// The agent directory.
///
/// Registration is rare (startup, config reload) and guarded by an outer
/// `RwLock`; per-agent state lives behind its own mutex.
pub struct AgentDirectory {
    slots: RwLock<HashMap<String, std::sync::Arc<AgentSlot>>>,
}

impl AgentDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Create a directory from a seed roster.
    pub fn from_seeds(seeds: &[AgentSeed]) -> Self {
        let dir = Self::new();
        for seed in seeds {
            dir.register(seed.profile.clone(), seed.initial_status);
        }
        dir
    }

    /// Register an agent. Replaces any previous registration of the id.
    pub fn register(&self, profile: AgentProfile, initial_status: AgentStatus) {
        let agent_id = profile.agent_id.clone();
        let slot = std::sync::Arc::new(AgentSlot {
            profile,
            state: Mutex::new(SlotState {
                state: AgentState::new(initial_status),
                claim: None,
                total_cases: 0,
                escalated_cases: 0,
                first_contact_cases: 0,
                recent_cases: VecDeque::new(),
                forced_break_until: None,
            }),
        });
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.insert(agent_id.clone(), slot);
        debug!(agent_id = %agent_id, "agent registered");
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, agent_id: &str) -> Option<std::sync::Arc<AgentSlot>> {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(agent_id)
            .cloned()
    }

    /// Snapshot every agent. Each snapshot is consistent per agent but
    /// not across agents; hard filters are re-checked at claim time.
    pub fn snapshot_all(&self) -> Vec<AgentSnapshot> {
        let slots: Vec<_> = {
            let guard = self.slots.read().unwrap_or_else(|e| e.into_inner());
            guard.values().cloned().collect()
        };
        let taken_at = Utc::now();
        let mut snapshots: Vec<AgentSnapshot> = slots
            .iter()
            .map(|slot| {
                let state = slot.state.lock().unwrap_or_else(|e| e.into_inner());
                AgentSnapshot {
                    profile: slot.profile.clone(),
                    state: state.state.clone(),
                    taken_at,
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.profile.agent_id.cmp(&b.profile.agent_id));
        snapshots
    }

    /// Snapshot one agent.
    pub fn snapshot_one(&self, agent_id: &str) -> Option<AgentSnapshot> {
        let slot = self.slot(agent_id)?;
        let state = slot.state.lock().unwrap_or_else(|e| e.into_inner());
        Some(AgentSnapshot {
            profile: slot.profile.clone(),
            state: state.state.clone(),
            taken_at: Utc::now(),
        })
    }

    /// Take an exclusive claim on an agent for assignment commit.
    ///
    /// Presence and capacity are re-checked under the agent's lock, so a
    /// stale snapshot cannot sneak an over-capacity assignment through.
    pub fn claim_for_assignment(
        &self,
        agent_id: &str,
    ) -> std::result::Result<ClaimToken, ClaimError> {
        let slot = self.slot(agent_id).ok_or(ClaimError::NotFound)?;
        let mut guard = slot.state.lock().unwrap_or_else(|e| e.into_inner());

        if guard.state.status == AgentStatus::Offline {
            return Err(ClaimError::Offline);
        }
        if guard.state.current_workload >= slot.profile.max_concurrent_cases {
            return Err(ClaimError::AtCapacity);
        }
        if let Some(claim) = &guard.claim
            && claim.taken_at.elapsed() < CLAIM_TTL
        {
            return Err(ClaimError::AlreadyClaimed);
        }

        let token = Uuid::new_v4();
        guard.claim = Some(Claim {
            token,
            taken_at: Instant::now(),
        });
        Ok(ClaimToken {
            token,
            agent_id: agent_id.to_string(),
        })
    }

    /// Commit a claimed assignment: workload++ atomically with the claim
    /// release.
    pub fn commit_assignment(&self, token: &ClaimToken, request_id: Uuid) -> Result<()> {
        let slot = self
            .slot(&token.agent_id)
            .ok_or_else(|| HandoffError::NotFound(token.agent_id.clone()))?;
        let mut guard = slot.state.lock().unwrap_or_else(|e| e.into_inner());

        match &guard.claim {
            Some(claim) if claim.token == token.token => {}
            _ => {
                return Err(HandoffError::InvariantViolation {
                    reason: "commit without a live claim".into(),
                });
            }
        }
        guard.claim = None;
        guard.state.current_workload += 1;
        guard.state.last_assignment_at = Some(Utc::now());
        if guard.state.status == AgentStatus::Available {
            guard.state.status = AgentStatus::Busy;
            guard.state.status_since = Utc::now();
        }
        info!(
            agent_id = %token.agent_id,
            request_id = %request_id,
            workload = guard.state.current_workload,
            "assignment committed"
        );
        Ok(())
    }

    /// Release a claim without committing (selection aborted).
    pub fn release_claim(&self, token: ClaimToken) {
        if let Some(slot) = self.slot(&token.agent_id) {
            let mut guard = slot.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(claim) = &guard.claim
                && claim.token == token.token
            {
                guard.claim = None;
            }
        }
    }

    /// Update an agent after an assignment completes: workload--, rolling
    /// metric EWMAs, and the consecutive-difficult counter.
    pub fn update_on_completion(
        &self,
        agent_id: &str,
        outcome: &CompletionOutcome,
    ) -> Result<()> {
        let slot = self
            .slot(agent_id)
            .ok_or_else(|| HandoffError::NotFound(agent_id.to_string()))?;
        let mut guard = slot.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        if guard.state.current_workload == 0 {
            warn!(agent_id, "completion reported with zero workload");
        } else {
            guard.state.current_workload -= 1;
        }
        if guard.state.current_workload == 0 && guard.state.status == AgentStatus::Busy {
            guard.state.status = AgentStatus::Available;
            guard.state.status_since = now;
        }

        guard.total_cases += 1;
        if outcome.escalated {
            guard.escalated_cases += 1;
        }
        if outcome.first_contact_resolution {
            guard.first_contact_cases += 1;
        }

        let escalation_rate = guard.escalated_cases as f64 / guard.total_cases as f64;
        let first_contact_resolution_rate = guard.first_contact_cases as f64 / guard.total_cases as f64;
        let rolling = &mut guard.state.rolling_metrics;
        if let Some(rating) = outcome.satisfaction_rating {
            rolling.customer_satisfaction_avg = ewma(
                rolling.customer_satisfaction_avg,
                rating.clamp(0.0, 5.0),
                ROLLING_ALPHA,
            );
        }
        rolling.avg_resolution_minutes = ewma(
            rolling.avg_resolution_minutes,
            outcome.resolution_minutes.max(0.0),
            ROLLING_ALPHA,
        );
        rolling.escalation_rate = escalation_rate;
        rolling.first_contact_resolution_rate = first_contact_resolution_rate;

        if outcome.is_difficult() {
            guard.state.consecutive_difficult_cases += 1;
            guard.state.last_difficult_case_at = Some(now);
        } else {
            guard.state.consecutive_difficult_cases = 0;
        }

        guard.recent_cases.push_back(CaseExposure {
            completed_at: now,
            frustration_level: outcome.frustration_level,
            complexity: outcome.complexity,
        });
        // The exposure window is bounded by the stress tick; keep a hard
        // cap so an idle tick cannot let the deque grow without limit.
        while guard.recent_cases.len() > 256 {
            guard.recent_cases.pop_front();
        }

        debug!(
            agent_id,
            difficult = outcome.is_difficult(),
            consecutive = guard.state.consecutive_difficult_cases,
            "completion recorded"
        );
        Ok(())
    }

    /// Change an agent's presence status.
    pub fn set_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let slot = self
            .slot(agent_id)
            .ok_or_else(|| HandoffError::NotFound(agent_id.to_string()))?;
        let mut guard = slot.state.lock().unwrap_or_else(|e| e.into_inner());
        if guard.state.status == status {
            return Ok(());
        }
        if status == AgentStatus::Break {
            guard.state.last_break_at = Some(Utc::now());
        }
        guard.state.status = status;
        guard.state.status_since = Utc::now();
        info!(agent_id, ?status, reason = reason.unwrap_or(""), "agent status changed");
        Ok(())
    }

    /// Count agents per presence status.
    pub fn status_counts(&self) -> HashMap<AgentStatus, usize> {
        let mut counts = HashMap::new();
        for snapshot in self.snapshot_all() {
            *counts.entry(snapshot.state.status).or_insert(0) += 1;
        }
        counts
    }

    /// Run one stress update over an agent, with exclusive access to its
    /// slot. Used by the stress tick; `f` receives the state and the
    /// recent-case exposure and returns the new stress score.
    pub(crate) fn with_stress_update<F>(&self, agent_id: &str, f: F) -> Option<f64>
    where
        F: FnOnce(&AgentState, &VecDeque<CaseExposure>) -> f64,
    {
        let slot = self.slot(agent_id)?;
        let mut guard = slot.state.lock().unwrap_or_else(|e| e.into_inner());
        let score = f(&guard.state, &guard.recent_cases).clamp(0.0, 1.0);
        guard.state.stress_score = score;
        Some(score)
    }

    /// Force a break for an agent until at least `until`. No-op when the
    /// agent is offline.
    pub(crate) fn force_break(&self, agent_id: &str, until: DateTime<Utc>) {
        if let Some(slot) = self.slot(agent_id) {
            let mut guard = slot.state.lock().unwrap_or_else(|e| e.into_inner());
            if guard.state.status == AgentStatus::Offline {
                return;
            }
            if guard.state.status != AgentStatus::Break {
                guard.state.status = AgentStatus::Break;
                guard.state.status_since = Utc::now();
                guard.state.last_break_at = Some(Utc::now());
                warn!(agent_id, "stress threshold exceeded, forcing break");
            }
            guard.forced_break_until = Some(until);
        }
    }

    /// End a forced break if its minimum duration has elapsed and stress
    /// has recovered. Returns true when the agent went back to available.
    pub(crate) fn try_end_forced_break(&self, agent_id: &str, stress_ok: bool) -> bool {
        let Some(slot) = self.slot(agent_id) else {
            return false;
        };
        let mut guard = slot.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(until) = guard.forced_break_until else {
            return false;
        };
        if guard.state.status != AgentStatus::Break {
            guard.forced_break_until = None;
            return false;
        }
        if Utc::now() >= until && stress_ok {
            guard.forced_break_until = None;
            guard.state.status = AgentStatus::Available;
            guard.state.status_since = Utc::now();
            info!(agent_id, "forced break ended");
            return true;
        }
        false
    }

    /// All registered agent ids, sorted.
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

impl Default for AgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn ewma(previous: f64, observation: f64, alpha: f64) -> f64 {
    alpha * observation + (1.0 - alpha) * previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_types::agent::{FrustrationTolerance, Proficiency, SkillTier};
    use std::collections::BTreeMap;

    fn profile(id: &str, max_cases: u32) -> AgentProfile {
        AgentProfile {
            agent_id: id.into(),
            name: format!("Agent {id}"),
            skill_tier: SkillTier::Senior,
            skills: BTreeMap::from([("billing".into(), Proficiency::Advanced)]),
            specializations: vec![],
            languages: BTreeMap::from([("en".into(), Proficiency::Expert)]),
            certifications: vec![],
            years_experience: 5.0,
            timezone: None,
            frustration_tolerance: FrustrationTolerance::Medium,
            max_concurrent_cases: max_cases,
            weekly_schedule: BTreeMap::new(),
        }
    }

    fn easy_outcome() -> CompletionOutcome {
        CompletionOutcome {
            frustration_level: FrustrationLevel::Low,
            complexity: Complexity::Low,
            escalated: false,
            first_contact_resolution: true,
            satisfaction_rating: Some(4.5),
            resolution_minutes: 12.0,
        }
    }

    fn hard_outcome() -> CompletionOutcome {
        CompletionOutcome {
            frustration_level: FrustrationLevel::High,
            complexity: Complexity::High,
            escalated: false,
            first_contact_resolution: false,
            satisfaction_rating: Some(3.0),
            resolution_minutes: 45.0,
        }
    }

    #[test]
    fn claim_and_commit_increments_workload() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 2), AgentStatus::Available);

        let token = dir.claim_for_assignment("a1").unwrap();
        dir.commit_assignment(&token, Uuid::new_v4()).unwrap();

        let snap = dir.snapshot_one("a1").unwrap();
        assert_eq!(snap.state.current_workload, 1);
        assert_eq!(snap.state.status, AgentStatus::Busy);
        assert!(snap.state.last_assignment_at.is_some());
    }

    #[test]
    fn second_claim_rejected_while_live() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 2), AgentStatus::Available);

        let _token = dir.claim_for_assignment("a1").unwrap();
        assert_eq!(
            dir.claim_for_assignment("a1").unwrap_err(),
            ClaimError::AlreadyClaimed
        );
    }

    #[test]
    fn claim_rejected_at_capacity() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 1), AgentStatus::Available);

        let token = dir.claim_for_assignment("a1").unwrap();
        dir.commit_assignment(&token, Uuid::new_v4()).unwrap();

        assert_eq!(
            dir.claim_for_assignment("a1").unwrap_err(),
            ClaimError::AtCapacity
        );
    }

    #[test]
    fn workload_never_exceeds_capacity() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 3), AgentStatus::Available);

        let mut committed = 0;
        for _ in 0..10 {
            match dir.claim_for_assignment("a1") {
                Ok(token) => {
                    dir.commit_assignment(&token, Uuid::new_v4()).unwrap();
                    committed += 1;
                }
                Err(_) => break,
            }
        }
        assert_eq!(committed, 3);
        let snap = dir.snapshot_one("a1").unwrap();
        assert!(snap.state.current_workload <= snap.profile.max_concurrent_cases);
    }

    #[test]
    fn release_makes_agent_claimable_again() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 2), AgentStatus::Available);

        let token = dir.claim_for_assignment("a1").unwrap();
        dir.release_claim(token);
        assert!(dir.claim_for_assignment("a1").is_ok());
    }

    #[test]
    fn offline_agent_rejects_claims() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 2), AgentStatus::Offline);
        assert_eq!(
            dir.claim_for_assignment("a1").unwrap_err(),
            ClaimError::Offline
        );
    }

    #[test]
    fn commit_with_stale_token_is_invariant_violation() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 2), AgentStatus::Available);

        let token = dir.claim_for_assignment("a1").unwrap();
        dir.release_claim(ClaimToken {
            token: token.token,
            agent_id: "a1".into(),
        });
        let err = dir.commit_assignment(&token, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, HandoffError::InvariantViolation { .. }));
    }

    #[test]
    fn difficult_completion_increments_consecutive_counter() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 3), AgentStatus::Available);

        for expected in 1..=3 {
            let token = dir.claim_for_assignment("a1").unwrap();
            dir.commit_assignment(&token, Uuid::new_v4()).unwrap();
            dir.update_on_completion("a1", &hard_outcome()).unwrap();
            let snap = dir.snapshot_one("a1").unwrap();
            assert_eq!(snap.state.consecutive_difficult_cases, expected);
            assert!(snap.state.last_difficult_case_at.is_some());
        }
    }

    #[test]
    fn easy_completion_resets_consecutive_counter() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 3), AgentStatus::Available);

        let token = dir.claim_for_assignment("a1").unwrap();
        dir.commit_assignment(&token, Uuid::new_v4()).unwrap();
        dir.update_on_completion("a1", &hard_outcome()).unwrap();

        let token = dir.claim_for_assignment("a1").unwrap();
        dir.commit_assignment(&token, Uuid::new_v4()).unwrap();
        dir.update_on_completion("a1", &easy_outcome()).unwrap();

        let snap = dir.snapshot_one("a1").unwrap();
        assert_eq!(snap.state.consecutive_difficult_cases, 0);
    }

    #[test]
    fn completion_updates_rolling_metrics() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 3), AgentStatus::Available);

        let token = dir.claim_for_assignment("a1").unwrap();
        dir.commit_assignment(&token, Uuid::new_v4()).unwrap();
        let before = dir.snapshot_one("a1").unwrap().state.rolling_metrics;
        dir.update_on_completion("a1", &easy_outcome()).unwrap();
        let after = dir.snapshot_one("a1").unwrap().state.rolling_metrics;

        // Satisfaction EWMA moved toward 4.5.
        assert!(after.customer_satisfaction_avg > before.customer_satisfaction_avg);
        // First contact resolution on 1/1 cases.
        assert!((after.first_contact_resolution_rate - 1.0).abs() < f64::EPSILON);
        assert!(after.escalation_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn escalation_rate_is_escalated_over_total() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 5), AgentStatus::Available);

        for escalated in [true, false, false, true] {
            let token = dir.claim_for_assignment("a1").unwrap();
            dir.commit_assignment(&token, Uuid::new_v4()).unwrap();
            let mut outcome = easy_outcome();
            outcome.escalated = escalated;
            dir.update_on_completion("a1", &outcome).unwrap();
        }

        let snap = dir.snapshot_one("a1").unwrap();
        assert!((snap.state.rolling_metrics.escalation_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn completion_returns_agent_to_available() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 2), AgentStatus::Available);

        let token = dir.claim_for_assignment("a1").unwrap();
        dir.commit_assignment(&token, Uuid::new_v4()).unwrap();
        assert_eq!(
            dir.snapshot_one("a1").unwrap().state.status,
            AgentStatus::Busy
        );

        dir.update_on_completion("a1", &easy_outcome()).unwrap();
        assert_eq!(
            dir.snapshot_one("a1").unwrap().state.status,
            AgentStatus::Available
        );
    }

    #[test]
    fn set_status_records_break_time() {
        let dir = AgentDirectory::new();
        dir.register(profile("a1", 2), AgentStatus::Available);
        dir.set_status("a1", AgentStatus::Break, Some("lunch")).unwrap();
        let snap = dir.snapshot_one("a1").unwrap();
        assert_eq!(snap.state.status, AgentStatus::Break);
        assert!(snap.state.last_break_at.is_some());
    }

    #[test]
    fn snapshots_sorted_by_agent_id() {
        let dir = AgentDirectory::new();
        dir.register(profile("b", 1), AgentStatus::Available);
        dir.register(profile("a", 1), AgentStatus::Available);
        dir.register(profile("c", 1), AgentStatus::Available);
        let ids: Vec<String> = dir
            .snapshot_all()
            .into_iter()
            .map(|s| s.profile.agent_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_agent_operations_fail() {
        let dir = AgentDirectory::new();
        assert_eq!(
            dir.claim_for_assignment("ghost").unwrap_err(),
            ClaimError::NotFound
        );
        assert!(dir.update_on_completion("ghost", &easy_outcome()).is_err());
        assert!(dir.set_status("ghost", AgentStatus::Break, None).is_err());
        assert!(dir.snapshot_one("ghost").is_none());
    }
}
