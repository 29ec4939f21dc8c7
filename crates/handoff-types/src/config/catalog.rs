//! Automation task catalog.
//!
//! The catalog is configuration, not code: each task names its trigger
//! keywords, the fields the extractor must find in the utterance, and a
//! response template with `{field}` placeholders. Tasks that carry an
//! `escalation_reason` always fall through to a human.

use serde::{Deserialize, Serialize};

use crate::error::{HandoffError, Result};

/// A field the automation stage must extract for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name, referenced by `{name}` in the response template.
    pub name: String,
    /// Regex with at least one capture group; group 1 is the value.
    pub pattern: String,
}

/// One task in the automation catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Stable task id; the alphabetical tie-break key.
    pub task_id: String,
    /// Category, also used to derive routing skill hints.
    pub category: String,
    /// Keywords matched (case-folded) against the utterance.
    pub trigger_keywords: Vec<String>,
    /// Fields that must be extracted for the task to complete.
    #[serde(default)]
    pub required_fields: Vec<FieldSpec>,
    /// Historical success rate in `0.0..=1.0`; the score tie-break key.
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    /// Mean handling time in seconds, informational.
    #[serde(default = "default_mean_time")]
    pub mean_time_secs: f64,
    /// Response template with `{field}` placeholders.
    pub response_template: String,
    /// When set, the task always resolves to `unresolved` with this
    /// reason (the catalog knows a human must do it).
    #[serde(default)]
    pub escalation_reason: Option<String>,
}

fn default_success_rate() -> f64 {
    0.9
}
fn default_mean_time() -> f64 {
    60.0
}

/// Automation stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Minimum normalized keyword overlap for a task to match.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    /// The task catalog.
    #[serde(default = "default_catalog")]
    pub tasks: Vec<TaskSpec>,
}

impl AutomationConfig {
    pub(super) fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(HandoffError::ConfigInvalid {
                reason: "automation.match_threshold must be in 0..=1".into(),
            });
        }
        for task in &self.tasks {
            if task.trigger_keywords.is_empty() {
                return Err(HandoffError::ConfigInvalid {
                    reason: format!("task {} has no trigger keywords", task.task_id),
                });
            }
            if !(0.0..=1.0).contains(&task.success_rate) {
                return Err(HandoffError::ConfigInvalid {
                    reason: format!("task {} success_rate must be in 0..=1", task.task_id),
                });
            }
        }
        Ok(())
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            tasks: default_catalog(),
        }
    }
}

fn default_match_threshold() -> f64 {
    0.5
}

/// A small starter catalog covering the routine account tasks.
fn default_catalog() -> Vec<TaskSpec> {
    vec![
        TaskSpec {
            task_id: "reset_password".into(),
            category: "account".into(),
            trigger_keywords: vec!["reset".into(), "password".into()],
            required_fields: vec![],
            success_rate: 0.97,
            mean_time_secs: 30.0,
            response_template: "I've sent a password reset link to the email \
                                address on your account. The link expires in 30 \
                                minutes."
                .into(),
            escalation_reason: None,
        },
        TaskSpec {
            task_id: "order_status".into(),
            category: "orders".into(),
            trigger_keywords: vec!["order".into(), "status".into(), "where".into()],
            required_fields: vec![FieldSpec {
                name: "order_id".into(),
                pattern: r"\border\s*#?\s*([A-Z0-9]{6,12})\b".into(),
            }],
            success_rate: 0.92,
            mean_time_secs: 45.0,
            response_template: "Order {order_id} is on its way. You can track it \
                                from the Orders page of your account."
                .into(),
            escalation_reason: None,
        },
        TaskSpec {
            task_id: "update_billing_address".into(),
            category: "billing".into(),
            trigger_keywords: vec!["update".into(), "billing".into(), "address".into()],
            required_fields: vec![],
            success_rate: 0.88,
            mean_time_secs: 60.0,
            response_template: "You can update your billing address under \
                                Settings > Billing. Changes apply to your next \
                                invoice."
                .into(),
            escalation_reason: None,
        },
        TaskSpec {
            task_id: "refund_request".into(),
            category: "billing".into(),
            trigger_keywords: vec!["refund".into(), "money back".into(), "charge".into()],
            required_fields: vec![],
            success_rate: 0.4,
            mean_time_secs: 300.0,
            response_template: String::new(),
            escalation_reason: Some("refunds_require_human_approval".into()),
        },
    ]
}
