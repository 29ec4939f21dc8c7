//! Human-agent directory records.
//!
//! An agent is an immutable [`AgentProfile`] (identity, skills, limits)
//! plus a mutable [`AgentState`] (status, workload, wellbeing counters,
//! rolling metrics). The directory in `handoff-core` guards state
//! mutations with per-agent exclusive sections; the scorer works on
//! [`AgentSnapshot`] values that are consistent per agent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identity ─────────────────────────────────────────────────────────────

/// Seniority tier of a human agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillTier {
    Junior,
    Intermediate,
    Senior,
    Expert,
}

/// Proficiency in a skill domain or language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proficiency {
    Basic,
    Intermediate,
    Advanced,
    Expert,
}

impl Proficiency {
    /// Skill-match bonus contributed by this proficiency.
    pub fn skill_bonus(self) -> f64 {
        match self {
            Proficiency::Expert => 10.0,
            Proficiency::Advanced => 7.0,
            Proficiency::Intermediate => 4.0,
            Proficiency::Basic => 1.0,
        }
    }

    /// Whether the proficiency is at least conversational for language
    /// filtering purposes.
    pub fn is_conversational(self) -> bool {
        self >= Proficiency::Intermediate
    }
}

/// How much customer frustration an agent can absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrustrationTolerance {
    Low,
    Medium,
    High,
}

/// Immutable identity of a human agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Stable directory id.
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Seniority tier.
    pub skill_tier: SkillTier,
    /// Skill domain -> proficiency.
    pub skills: BTreeMap<String, Proficiency>,
    /// Specialization tags (narrower than skill domains).
    #[serde(default)]
    pub specializations: Vec<String>,
    /// Language code -> proficiency.
    #[serde(default)]
    pub languages: BTreeMap<String, Proficiency>,
    /// Certification tags that grant a scoring bonus.
    #[serde(default)]
    pub certifications: Vec<String>,
    /// Years of support experience.
    #[serde(default)]
    pub years_experience: f64,
    /// IANA timezone name, used by the customer-factors sub-score.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Frustration absorption capacity, used by the wellbeing filters.
    pub frustration_tolerance: FrustrationTolerance,
    /// Maximum simultaneous open assignments.
    pub max_concurrent_cases: u32,
    /// Weekday -> working hours, informational (e.g. `"mon" -> "09-17"`).
    #[serde(default)]
    pub weekly_schedule: BTreeMap<String, String>,
}

// ── Real-time state ──────────────────────────────────────────────────────

/// Presence status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Ready for new assignments.
    Available,
    /// Working; may still take assignments below capacity.
    Busy,
    /// On a (possibly forced) break.
    Break,
    /// In a meeting; not assignable.
    Meeting,
    /// In training; not assignable.
    Training,
    /// Signed off; hard-filtered out.
    Offline,
}

/// EWMA-maintained performance metrics for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingMetrics {
    /// Customer satisfaction average in `0.0..=5.0`.
    pub customer_satisfaction_avg: f64,
    /// Average minutes to resolution.
    pub avg_resolution_minutes: f64,
    /// Fraction of cases the agent escalated, in `0.0..=1.0`.
    pub escalation_rate: f64,
    /// Fraction of cases resolved on first contact, in `0.0..=1.0`.
    pub first_contact_resolution_rate: f64,
}

impl Default for RollingMetrics {
    fn default() -> Self {
        // Neutral starting point for a freshly seeded agent.
        Self {
            customer_satisfaction_avg: 3.5,
            avg_resolution_minutes: 30.0,
            escalation_rate: 0.1,
            first_contact_resolution_rate: 0.6,
        }
    }
}

/// Mutable real-time state of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Presence status.
    pub status: AgentStatus,
    /// When the current status was entered.
    pub status_since: DateTime<Utc>,
    /// Count of open assignments.
    pub current_workload: u32,
    /// Back-to-back difficult cases (frustration >= HIGH or complexity
    /// high); reset by a non-difficult completion.
    pub consecutive_difficult_cases: u32,
    /// When the last difficult case completed.
    pub last_difficult_case_at: Option<DateTime<Utc>>,
    /// When the agent last took a break.
    pub last_break_at: Option<DateTime<Utc>>,
    /// When the agent last received an assignment.
    pub last_assignment_at: Option<DateTime<Utc>>,
    /// Rolling performance metrics.
    pub rolling_metrics: RollingMetrics,
    /// Burnout estimate in `0.0..=1.0`, maintained by the stress tick.
    pub stress_score: f64,
}

impl AgentState {
    /// Fresh state for a newly registered agent.
    pub fn new(status: AgentStatus) -> Self {
        Self {
            status,
            status_since: Utc::now(),
            current_workload: 0,
            consecutive_difficult_cases: 0,
            last_difficult_case_at: None,
            last_break_at: None,
            last_assignment_at: None,
            rolling_metrics: RollingMetrics::default(),
            stress_score: 0.0,
        }
    }

    /// Load fraction in `0.0..=1.0` relative to the given capacity.
    pub fn load_fraction(&self, max_concurrent: u32) -> f64 {
        if max_concurrent == 0 {
            return 1.0;
        }
        f64::from(self.current_workload) / f64::from(max_concurrent)
    }
}

/// A consistent per-agent view used by one scoring pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Immutable identity.
    pub profile: AgentProfile,
    /// State as of `taken_at`.
    pub state: AgentState,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}
