//! Hard elimination filters, applied before scoring.
//!
//! A filtered agent is invisible to the scoring pass regardless of how
//! well it would have scored; the wellbeing rules here are what protect
//! a top-skilled agent from a fourth difficult customer in a row.

use chrono::{DateTime, Utc};

use handoff_types::agent::{AgentSnapshot, AgentStatus, FrustrationTolerance};
use handoff_types::config::RoutingConfig;

use super::score::RoutingDemand;

/// Why an agent was eliminated before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// Agent is offline.
    Offline,
    /// Agent is at (or over) its concurrent-case capacity.
    AtCapacity,
    /// Frustrated customer but the agent has low tolerance.
    LowTolerance,
    /// Frustrated customer and the agent is inside the difficult-case
    /// cooldown with too many consecutive difficult cases.
    WellbeingCooldown,
    /// Required language not spoken at conversational proficiency.
    LanguageMismatch,
}

impl FilterReason {
    /// Whether this reason is a wellbeing protection (used to label the
    /// routing strategy when protection changed the outcome).
    pub fn is_wellbeing(self) -> bool {
        matches!(
            self,
            FilterReason::LowTolerance | FilterReason::WellbeingCooldown
        )
    }
}

/// Evaluate the hard filters for one agent. `None` means the agent may
/// be scored.
pub fn hard_filter(
    snapshot: &AgentSnapshot,
    demand: &RoutingDemand,
    config: &RoutingConfig,
    now: DateTime<Utc>,
) -> Option<FilterReason> {
    let profile = &snapshot.profile;
    let state = &snapshot.state;

    if state.status == AgentStatus::Offline {
        return Some(FilterReason::Offline);
    }

    if state.current_workload >= profile.max_concurrent_cases {
        return Some(FilterReason::AtCapacity);
    }

    if demand.frustration_level.is_difficult() {
        if profile.frustration_tolerance == FrustrationTolerance::Low {
            return Some(FilterReason::LowTolerance);
        }
        if state.consecutive_difficult_cases >= config.max_consecutive_difficult
            && let Some(at) = state.last_difficult_case_at
        {
            let hours = (now - at).num_seconds().max(0) as f64 / 3600.0;
            if hours < config.cooldown_hours {
                return Some(FilterReason::WellbeingCooldown);
            }
        }
    }

    if let Some(language) = &demand.customer.language
        && !profile
            .languages
            .get(language)
            .is_some_and(|p| p.is_conversational())
    {
        return Some(FilterReason::LanguageMismatch);
    }

    None
}
