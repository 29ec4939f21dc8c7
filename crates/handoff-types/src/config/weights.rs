//! Routing weight tables and wellbeing knobs.
//!
//! The scorer's five category weights vary by request priority; operators
//! may additionally define A/B experiment variants that swap the entire
//! table for a deterministic traffic fraction.

use serde::{Deserialize, Serialize};

use crate::error::{HandoffError, Result};
use crate::queue::Priority;

use super::WEIGHT_SUM_TOLERANCE;

/// Weights for the five scoring categories. Each row must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    /// Skill and specialization fit.
    pub skill_match: f64,
    /// Presence status and load headroom.
    pub availability: f64,
    /// Rolling satisfaction/resolution/escalation record.
    pub performance_history: f64,
    /// Burnout protection signals.
    pub wellbeing: f64,
    /// VIP, language, and timezone fit.
    pub customer_factors: f64,
}

impl CategoryWeights {
    /// Sum of the five weights.
    pub fn sum(&self) -> f64 {
        self.skill_match
            + self.availability
            + self.performance_history
            + self.wellbeing
            + self.customer_factors
    }
}

/// The full per-priority weight table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightTable {
    pub low: CategoryWeights,
    pub medium: CategoryWeights,
    pub high: CategoryWeights,
    pub critical: CategoryWeights,
}

impl WeightTable {
    /// The weight row for a priority.
    pub fn row(&self, priority: Priority) -> CategoryWeights {
        match priority {
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
            Priority::Critical => self.critical,
        }
    }

    fn validate(&self, label: &str) -> Result<()> {
        for priority in Priority::all() {
            let row = self.row(priority);
            if (row.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(HandoffError::ConfigInvalid {
                    reason: format!(
                        "{label} weights for {priority:?} must sum to 1.0, got {:.4}",
                        row.sum()
                    ),
                });
            }
        }
        Ok(())
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            low: CategoryWeights {
                skill_match: 0.25,
                availability: 0.35,
                performance_history: 0.15,
                wellbeing: 0.20,
                customer_factors: 0.05,
            },
            medium: CategoryWeights {
                skill_match: 0.35,
                availability: 0.25,
                performance_history: 0.20,
                wellbeing: 0.15,
                customer_factors: 0.05,
            },
            high: CategoryWeights {
                skill_match: 0.40,
                availability: 0.23,
                performance_history: 0.22,
                wellbeing: 0.10,
                customer_factors: 0.05,
            },
            critical: CategoryWeights {
                skill_match: 0.45,
                availability: 0.20,
                performance_history: 0.25,
                wellbeing: 0.05,
                customer_factors: 0.05,
            },
        }
    }
}

/// An A/B experiment variant swapping the whole weight table for a
/// deterministic fraction of traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentVariant {
    /// Variant name, recorded on routing decisions.
    pub name: String,
    /// Fraction of traffic in `0.0..=1.0` assigned to this variant.
    pub traffic_fraction: f64,
    /// Replacement weight table.
    pub weights: WeightTable,
}

/// Routing scorer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Default per-priority weight table.
    #[serde(default)]
    pub weights: WeightTable,

    /// Experiment variants; fractions are carved deterministically from
    /// the request-id hash space, in declaration order.
    #[serde(default)]
    pub experiments: Vec<ExperimentVariant>,

    /// Hours after a difficult case during which an agent with too many
    /// consecutive difficult cases is protected from HIGH/CRITICAL
    /// customers.
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: f64,

    /// Consecutive difficult cases at which the cooldown filter engages.
    #[serde(default = "default_max_consecutive")]
    pub max_consecutive_difficult: u32,

    /// Claim/commit attempts before falling back to the queue.
    #[serde(default = "default_reselect_attempts")]
    pub reselect_attempts: u32,

    /// How many runner-up agents to record on a decision.
    #[serde(default = "default_fallback_count")]
    pub fallback_count: usize,

    /// Baseline resolution minutes for the performance sub-score.
    #[serde(default = "default_baseline_minutes")]
    pub baseline_resolution_minutes: f64,
}

impl RoutingConfig {
    pub(super) fn validate(&self) -> Result<()> {
        self.weights.validate("routing")?;
        let mut total_fraction = 0.0;
        for exp in &self.experiments {
            if !(0.0..=1.0).contains(&exp.traffic_fraction) {
                return Err(HandoffError::ConfigInvalid {
                    reason: format!(
                        "experiment {} traffic_fraction must be in 0..=1",
                        exp.name
                    ),
                });
            }
            total_fraction += exp.traffic_fraction;
            exp.weights.validate(&format!("experiment {}", exp.name))?;
        }
        if total_fraction > 1.0 + WEIGHT_SUM_TOLERANCE {
            return Err(HandoffError::ConfigInvalid {
                reason: "experiment traffic fractions exceed 1.0".into(),
            });
        }
        if self.reselect_attempts == 0 {
            return Err(HandoffError::ConfigInvalid {
                reason: "routing.reselect_attempts must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            weights: WeightTable::default(),
            experiments: Vec::new(),
            cooldown_hours: default_cooldown_hours(),
            max_consecutive_difficult: default_max_consecutive(),
            reselect_attempts: default_reselect_attempts(),
            fallback_count: default_fallback_count(),
            baseline_resolution_minutes: default_baseline_minutes(),
        }
    }
}

fn default_cooldown_hours() -> f64 {
    2.0
}
fn default_max_consecutive() -> u32 {
    3
}
fn default_reselect_attempts() -> u32 {
    3
}
fn default_fallback_count() -> usize {
    3
}
fn default_baseline_minutes() -> f64 {
    30.0
}
