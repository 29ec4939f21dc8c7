//! Category sub-scores for candidate agents.
//!
//! Five categories, each normalized to `0.0..=1.0`:
//!
//! - `skill_match` -- exact/partial domain matches with proficiency
//!   bonuses, experience, specialization, and certification, divided by
//!   the theoretical maximum for the given requirements.
//! - `availability` -- presence status, load headroom, and idle time.
//! - `performance_history` -- satisfaction, resolution time against a
//!   baseline, escalation rate, and first-contact resolution.
//! - `wellbeing` -- starts at 1.0 and pays penalties for consecutive
//!   difficult cases, recent difficult work, and accumulated stress.
//! - `customer_factors` -- VIP, language, and timezone fit.

use chrono::{DateTime, Utc};

use handoff_types::agent::{AgentSnapshot, AgentStatus, SkillTier};
use handoff_types::config::RoutingConfig;
use handoff_types::config::weights::CategoryWeights;
use handoff_types::queue::{Complexity, Priority};
use handoff_types::request::FrustrationLevel;

/// Customer attributes feeding the customer-factors sub-score.
#[derive(Debug, Clone, Default)]
pub struct CustomerFactors {
    /// VIP marker from the customer profile.
    pub vip: bool,
    /// Language code when the request is flagged non-English.
    pub language: Option<String>,
    /// Customer timezone, when known.
    pub timezone: Option<String>,
}

/// Everything the scorer needs to know about the request being routed.
#[derive(Debug, Clone)]
pub struct RoutingDemand {
    /// Skills the handling agent should have.
    pub required_skills: Vec<String>,
    /// Complexity estimate.
    pub complexity: Complexity,
    /// Urgency bucket selecting the weight row.
    pub priority: Priority,
    /// Customer frustration level.
    pub frustration_level: FrustrationLevel,
    /// Customer attributes.
    pub customer: CustomerFactors,
}

/// The five normalized category sub-scores for one agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryScores {
    pub skill_match: f64,
    pub availability: f64,
    pub performance_history: f64,
    pub wellbeing: f64,
    pub customer_factors: f64,
}

impl CategoryScores {
    /// Weighted composite in `0.0..=1.0`.
    pub fn composite(&self, weights: CategoryWeights) -> f64 {
        self.skill_match * weights.skill_match
            + self.availability * weights.availability
            + self.performance_history * weights.performance_history
            + self.wellbeing * weights.wellbeing
            + self.customer_factors * weights.customer_factors
    }
}

/// Score one agent snapshot against a demand.
pub fn score_agent(
    snapshot: &AgentSnapshot,
    demand: &RoutingDemand,
    config: &RoutingConfig,
    now: DateTime<Utc>,
) -> CategoryScores {
    CategoryScores {
        skill_match: skill_match_score(snapshot, &demand.required_skills),
        availability: availability_score(snapshot, now),
        performance_history: performance_score(snapshot, config.baseline_resolution_minutes),
        wellbeing: wellbeing_score(snapshot, now),
        customer_factors: customer_score(snapshot, &demand.customer),
    }
}

// ── skill_match ──────────────────────────────────────────────────────────

const EXACT_MATCH_POINTS: f64 = 15.0;
const PARTIAL_MATCH_POINTS: f64 = 8.0;
const SPECIALIZATION_POINTS: f64 = 12.0;
const CERTIFICATION_POINTS: f64 = 5.0;
const EXPERIENCE_POINTS_CAP: f64 = 10.0;
const MAX_PROFICIENCY_POINTS: f64 = 10.0;

/// Skill fit in `0.0..=1.0`. Empty requirements are neutral (0.5).
pub fn skill_match_score(snapshot: &AgentSnapshot, required_skills: &[String]) -> f64 {
    if required_skills.is_empty() {
        return 0.5;
    }
    let profile = &snapshot.profile;
    let mut points = 0.0;

    for skill in required_skills {
        let needle = skill.to_lowercase();
        if let Some(proficiency) = profile
            .skills
            .iter()
            .find(|(domain, _)| domain.to_lowercase() == needle)
            .map(|(_, p)| *p)
        {
            points += EXACT_MATCH_POINTS + proficiency.skill_bonus();
        } else if let Some(proficiency) = profile
            .skills
            .iter()
            .find(|(domain, _)| {
                let domain = domain.to_lowercase();
                domain.contains(&needle) || needle.contains(&domain)
            })
            .map(|(_, p)| *p)
        {
            points += PARTIAL_MATCH_POINTS + proficiency.skill_bonus();
        }
    }

    points += (profile.years_experience * 0.5).min(EXPERIENCE_POINTS_CAP);

    if required_skills.iter().any(|skill| {
        profile
            .specializations
            .iter()
            .any(|s| s.eq_ignore_ascii_case(skill))
    }) {
        points += SPECIALIZATION_POINTS;
    }

    if required_skills.iter().any(|skill| {
        profile
            .certifications
            .iter()
            .any(|c| c.to_lowercase().contains(&skill.to_lowercase()))
    }) {
        points += CERTIFICATION_POINTS;
    }

    let theoretical_max = required_skills.len() as f64
        * (EXACT_MATCH_POINTS + MAX_PROFICIENCY_POINTS)
        + EXPERIENCE_POINTS_CAP
        + SPECIALIZATION_POINTS
        + CERTIFICATION_POINTS;
    (points / theoretical_max).clamp(0.0, 1.0)
}

// ── availability ─────────────────────────────────────────────────────────

const IDLE_BONUS_CAP: f64 = 10.0;
/// Raw availability spans roughly [-75, +30]; these bounds normalize it.
const AVAILABILITY_RAW_MIN: f64 = -75.0;
const AVAILABILITY_RAW_SPAN: f64 = 105.0;

/// Availability in `0.0..=1.0` from status, load, and idle time.
pub fn availability_score(snapshot: &AgentSnapshot, now: DateTime<Utc>) -> f64 {
    let state = &snapshot.state;
    let max_cases = snapshot.profile.max_concurrent_cases;
    let load = state.load_fraction(max_cases);

    let status_points = match state.status {
        AgentStatus::Available => 20.0,
        AgentStatus::Busy => {
            if load < 0.5 {
                10.0
            } else if load < 0.8 {
                5.0
            } else {
                -5.0
            }
        }
        AgentStatus::Break => -10.0,
        AgentStatus::Meeting | AgentStatus::Training | AgentStatus::Offline => -50.0,
    };

    let mut raw = status_points - 2.0 * f64::from(state.current_workload);
    if state.current_workload >= max_cases {
        raw -= 15.0;
    }

    let idle_minutes = state
        .last_assignment_at
        .map(|at| (now - at).num_seconds().max(0) as f64 / 60.0)
        .unwrap_or(100.0);
    raw += (idle_minutes * 0.1).min(IDLE_BONUS_CAP);

    ((raw - AVAILABILITY_RAW_MIN) / AVAILABILITY_RAW_SPAN).clamp(0.0, 1.0)
}

// ── performance_history ──────────────────────────────────────────────────

/// Performance in `0.0..=1.0`: 0.4 satisfaction, 0.3 resolution time
/// against the baseline, 0.2 escalation rate, 0.1 first-contact rate.
pub fn performance_score(snapshot: &AgentSnapshot, baseline_minutes: f64) -> f64 {
    let metrics = &snapshot.state.rolling_metrics;

    // Each term is mapped to 0..=10 before weighting.
    let satisfaction_term = (metrics.customer_satisfaction_avg * 2.5).clamp(0.0, 10.0);
    // Under the baseline rewards, over penalizes.
    let resolution_term =
        (5.0 + (baseline_minutes - metrics.avg_resolution_minutes) * 0.25).clamp(0.0, 10.0);
    let escalation_term = (10.0 - 50.0 * metrics.escalation_rate).clamp(0.0, 10.0);
    let fcr_term = (20.0 * metrics.first_contact_resolution_rate).clamp(0.0, 10.0);

    let combined = 0.4 * satisfaction_term
        + 0.3 * resolution_term
        + 0.2 * escalation_term
        + 0.1 * fcr_term;
    (combined / 10.0).clamp(0.0, 1.0)
}

// ── wellbeing ────────────────────────────────────────────────────────────

/// Wellbeing in `0.0..=1.0`. Starts at 1.0 and pays penalties, each
/// expressed in twentieths of the scale.
pub fn wellbeing_score(snapshot: &AgentSnapshot, now: DateTime<Utc>) -> f64 {
    let state = &snapshot.state;

    let consecutive_penalty = match state.consecutive_difficult_cases {
        0 => 0.0,
        1 => 2.0,
        2 => 5.0,
        3 => 10.0,
        _ => 20.0,
    };

    let recency_penalty = match state.last_difficult_case_at {
        Some(at) => {
            let hours = (now - at).num_seconds().max(0) as f64 / 3600.0;
            if hours < 1.0 {
                5.0
            } else if hours < 2.0 {
                2.0
            } else if hours < 4.0 {
                0.0
            } else {
                -3.0
            }
        }
        None => -3.0,
    };

    let break_bonus = match state.last_break_at {
        Some(at) if (now - at).num_seconds() < 2 * 3600 => 2.0,
        _ => 0.0,
    };

    let score = 1.0 - consecutive_penalty / 20.0 - recency_penalty / 20.0
        - state.stress_score * 0.5
        + break_bonus / 20.0;
    score.clamp(0.0, 1.0)
}

// ── customer_factors ─────────────────────────────────────────────────────

/// Customer fit in `0.0..=1.0`: neutral 0.5 plus VIP, language, and
/// timezone bonuses.
pub fn customer_score(snapshot: &AgentSnapshot, customer: &CustomerFactors) -> f64 {
    let profile = &snapshot.profile;
    let mut score: f64 = 0.5;

    if customer.vip && profile.skill_tier >= SkillTier::Senior {
        score += 0.2;
    }

    if let Some(language) = &customer.language
        && profile
            .languages
            .get(language)
            .is_some_and(|p| p.is_conversational())
    {
        score += 0.2;
    }

    if let (Some(want), Some(have)) = (&customer.timezone, &profile.timezone)
        && want == have
    {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}
