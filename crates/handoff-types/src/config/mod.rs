//! Configuration schema for the handoff orchestrator.
//!
//! Everything an operator can tune lives here: stage thresholds and
//! deadlines, the routing weight tables ([`weights`]), the frustration
//! and affect lexicons ([`lexicon`]), the automation task catalog
//! ([`catalog`]), the agent roster, and collaborator limits.
//!
//! All structs carry serde defaults so a partial TOML file works;
//! [`Config::validate`] enforces the semantic rules (weight rows sum to
//! 1.0, thresholds ordered, lexicons and catalogs well-formed). A config
//! that fails validation is never swapped in.

pub mod catalog;
pub mod lexicon;
pub mod weights;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentProfile, AgentStatus};
use crate::error::{HandoffError, Result};

pub use catalog::{AutomationConfig, FieldSpec, TaskSpec};
pub use lexicon::{AffectLexicon, FrustrationLexicon, LexiconCategory, RubricLexicon};
pub use weights::{CategoryWeights, ExperimentVariant, RoutingConfig};

// ── Root ─────────────────────────────────────────────────────────────────

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Worker pool and per-stage deadlines.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Automation task catalog and matching threshold.
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Chatbot prompt and surface-affect lexicons.
    #[serde(default)]
    pub chatbot: ChatbotConfig,

    /// Quality gate thresholds and dimension weights.
    #[serde(default)]
    pub quality: QualityConfig,

    /// Frustration analyzer weights, thresholds, and lexicon.
    #[serde(default)]
    pub frustration: FrustrationConfig,

    /// Context manager limits.
    #[serde(default)]
    pub context: ContextConfig,

    /// Routing weight tables, wellbeing knobs, and experiments.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Wait-queue backpressure and estimation.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Stress tick cadence and break enforcement.
    #[serde(default)]
    pub stress: StressConfig,

    /// Generator collaborator endpoint and limits.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Seed roster for the agent directory.
    #[serde(default)]
    pub agents: Vec<AgentSeed>,
}

impl Config {
    /// Validate the semantic rules across all sections.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::ConfigInvalid`] naming the first rule that
    /// failed. Callers treat this as exit code 2 at the CLI boundary.
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.automation.validate()?;
        self.quality.validate()?;
        self.frustration.validate()?;
        self.context.validate()?;
        self.routing.validate()?;
        self.queue.validate()?;
        self.stress.validate()?;
        for seed in &self.agents {
            seed.validate()?;
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> HandoffError {
    HandoffError::ConfigInvalid {
        reason: reason.into(),
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Worker pool sizing and per-stage deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests progressing concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Default per-stage deadline in seconds.
    #[serde(default = "default_stage_deadline")]
    pub stage_deadline_secs: u64,

    /// Deadline for a quality rewrite round.
    #[serde(default = "default_rewrite_deadline")]
    pub rewrite_deadline_secs: u64,

    /// Deadline for the frustration analyzer.
    #[serde(default = "default_frustration_deadline")]
    pub frustration_deadline_secs: u64,

    /// Deadline for one routing scoring pass.
    #[serde(default = "default_routing_deadline")]
    pub routing_deadline_secs: u64,
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(invalid("pipeline.max_workers must be at least 1"));
        }
        if self.stage_deadline_secs == 0 {
            return Err(invalid("pipeline.stage_deadline_secs must be positive"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            stage_deadline_secs: default_stage_deadline(),
            rewrite_deadline_secs: default_rewrite_deadline(),
            frustration_deadline_secs: default_frustration_deadline(),
            routing_deadline_secs: default_routing_deadline(),
        }
    }
}

fn default_max_workers() -> usize {
    32
}
fn default_stage_deadline() -> u64 {
    30
}
fn default_rewrite_deadline() -> u64 {
    15
}
fn default_frustration_deadline() -> u64 {
    10
}
fn default_routing_deadline() -> u64 {
    2
}

// ── Chatbot ──────────────────────────────────────────────────────────────

/// Chatbot prompt framing and surface-affect lexicons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotConfig {
    /// System instructions prepended to every generation prompt.
    #[serde(default = "default_system_instructions")]
    pub system_instructions: String,

    /// Token cap per generation call.
    #[serde(default = "default_chatbot_max_tokens")]
    pub max_tokens: u32,

    /// Lexicons for the surface-affect scan.
    #[serde(default)]
    pub affect: AffectLexicon,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            system_instructions: default_system_instructions(),
            max_tokens: default_chatbot_max_tokens(),
            affect: AffectLexicon::default(),
        }
    }
}

fn default_system_instructions() -> String {
    "You are a customer support assistant. Be concise, warm, and accurate. \
     If you are unsure, say so and offer to connect the customer with a \
     human agent."
        .into()
}
fn default_chatbot_max_tokens() -> u32 {
    1024
}

// ── Quality ──────────────────────────────────────────────────────────────

/// Per-dimension weights for the quality score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DimensionWeights {
    #[serde(default = "default_dim_weight")]
    pub accuracy: f64,
    #[serde(default = "default_dim_weight")]
    pub completeness: f64,
    #[serde(default = "default_dim_weight")]
    pub clarity: f64,
    #[serde(default = "default_dim_weight")]
    pub service: f64,
    #[serde(default = "default_dim_weight")]
    pub contextual: f64,
}

impl DimensionWeights {
    /// Sum of the five weights.
    pub fn sum(&self) -> f64 {
        self.accuracy + self.completeness + self.clarity + self.service + self.contextual
    }
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            accuracy: default_dim_weight(),
            completeness: default_dim_weight(),
            clarity: default_dim_weight(),
            service: default_dim_weight(),
            contextual: default_dim_weight(),
        }
    }
}

fn default_dim_weight() -> f64 {
    0.2
}

/// Quality gate thresholds and rewrite budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Scores at or above this are ADEQUATE.
    #[serde(default = "default_t_adequate")]
    pub adequate_threshold: f64,

    /// Scores at or above this (and below adequate) are NEEDS_ADJUSTMENT.
    #[serde(default = "default_t_adjust")]
    pub adjust_threshold: f64,

    /// Maximum rewrite attempts per response.
    #[serde(default = "default_n_adjust")]
    pub max_adjust_attempts: u32,

    /// Minimum score gain for a rewrite to replace the original.
    #[serde(default = "default_rewrite_min_gain")]
    pub rewrite_min_gain: f64,

    /// Per-dimension weights for the combined score.
    #[serde(default)]
    pub dimension_weights: DimensionWeights,

    /// Marker lists behind the dimension heuristics.
    #[serde(default)]
    pub rubric: RubricLexicon,
}

impl QualityConfig {
    fn validate(&self) -> Result<()> {
        if (self.dimension_weights.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(invalid(format!(
                "quality.dimension_weights must sum to 1.0, got {:.4}",
                self.dimension_weights.sum()
            )));
        }
        if self.adjust_threshold > self.adequate_threshold {
            return Err(invalid(
                "quality.adjust_threshold must not exceed adequate_threshold",
            ));
        }
        if !(0.0..=10.0).contains(&self.adequate_threshold)
            || !(0.0..=10.0).contains(&self.adjust_threshold)
        {
            return Err(invalid("quality thresholds must be within 0..=10"));
        }
        self.rubric.validate()?;
        Ok(())
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            adequate_threshold: default_t_adequate(),
            adjust_threshold: default_t_adjust(),
            max_adjust_attempts: default_n_adjust(),
            rewrite_min_gain: default_rewrite_min_gain(),
            dimension_weights: DimensionWeights::default(),
            rubric: RubricLexicon::default(),
        }
    }
}

fn default_t_adequate() -> f64 {
    7.0
}
fn default_t_adjust() -> f64 {
    5.0
}
fn default_n_adjust() -> u32 {
    2
}
fn default_rewrite_min_gain() -> f64 {
    1.5
}

/// Tolerance for weight-sum checks.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ── Frustration ──────────────────────────────────────────────────────────

/// Frustration analyzer weights, level thresholds, and lexicon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrustrationConfig {
    /// Weight of the lexical score.
    #[serde(default = "default_w_lex")]
    pub lexical_weight: f64,

    /// Weight of the behavioral score.
    #[serde(default = "default_w_beh")]
    pub behavioral_weight: f64,

    /// Weight of the optional LLM score. Redistributed proportionally
    /// when no LLM score is available.
    #[serde(default = "default_w_llm")]
    pub llm_weight: f64,

    /// Whether the analyzer may call the generator for an affect score.
    #[serde(default = "default_true")]
    pub llm_enabled: bool,

    /// Scores below this are LOW.
    #[serde(default = "default_t_moderate")]
    pub moderate_threshold: f64,

    /// Scores below this (and at or above moderate) are MODERATE.
    #[serde(default = "default_t_high")]
    pub high_threshold: f64,

    /// Scores below this are HIGH; at or above, CRITICAL.
    #[serde(default = "default_t_critical")]
    pub critical_threshold: f64,

    /// How many recent interactions feed the trend comparison.
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,

    /// Score delta against the recent mean that counts as a trend.
    #[serde(default = "default_trend_delta")]
    pub trend_delta: f64,

    /// The curated frustration lexicon.
    #[serde(default)]
    pub lexicon: FrustrationLexicon,
}

impl FrustrationConfig {
    fn validate(&self) -> Result<()> {
        let sum = self.lexical_weight + self.behavioral_weight + self.llm_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(invalid(format!(
                "frustration signal weights must sum to 1.0, got {sum:.4}"
            )));
        }
        if !(self.moderate_threshold < self.high_threshold
            && self.high_threshold < self.critical_threshold)
        {
            return Err(invalid(
                "frustration level thresholds must be strictly increasing",
            ));
        }
        self.lexicon.validate()?;
        Ok(())
    }

    /// Effective `(lexical, behavioral, llm)` weights when no LLM score is
    /// available: the llm weight is redistributed proportionally.
    pub fn weights_without_llm(&self) -> (f64, f64) {
        let base = self.lexical_weight + self.behavioral_weight;
        if base <= 0.0 {
            return (0.5, 0.5);
        }
        (self.lexical_weight / base, self.behavioral_weight / base)
    }
}

impl Default for FrustrationConfig {
    fn default() -> Self {
        Self {
            lexical_weight: default_w_lex(),
            behavioral_weight: default_w_beh(),
            llm_weight: default_w_llm(),
            llm_enabled: default_true(),
            moderate_threshold: default_t_moderate(),
            high_threshold: default_t_high(),
            critical_threshold: default_t_critical(),
            trend_window: default_trend_window(),
            trend_delta: default_trend_delta(),
            lexicon: FrustrationLexicon::default(),
        }
    }
}

fn default_w_lex() -> f64 {
    0.4
}
fn default_w_beh() -> f64 {
    0.3
}
fn default_w_llm() -> f64 {
    0.3
}
fn default_true() -> bool {
    true
}
fn default_t_moderate() -> f64 {
    3.0
}
fn default_t_high() -> f64 {
    6.0
}
fn default_t_critical() -> f64 {
    8.0
}
fn default_trend_window() -> usize {
    5
}
fn default_trend_delta() -> f64 {
    1.0
}

// ── Context ──────────────────────────────────────────────────────────────

/// Context manager retrieval limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Candidate cap per source.
    #[serde(default = "default_per_source_limit")]
    pub per_source_limit: usize,

    /// Total records kept across sources.
    #[serde(default = "default_total_limit")]
    pub total_limit: usize,

    /// Minimum relevance for a record to be kept.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,

    /// Whether summaries may be produced by the generator. Rule-based
    /// templates are always the fallback.
    #[serde(default)]
    pub summaries_via_llm: bool,
}

impl ContextConfig {
    fn validate(&self) -> Result<()> {
        if self.total_limit == 0 || self.per_source_limit == 0 {
            return Err(invalid("context limits must be positive"));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(invalid("context.relevance_threshold must be in 0..=1"));
        }
        Ok(())
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            per_source_limit: default_per_source_limit(),
            total_limit: default_total_limit(),
            relevance_threshold: default_relevance_threshold(),
            summaries_via_llm: false,
        }
    }
}

fn default_per_source_limit() -> usize {
    5
}
fn default_total_limit() -> usize {
    12
}
fn default_relevance_threshold() -> f64 {
    0.1
}

// ── Queue ────────────────────────────────────────────────────────────────

/// Wait-queue backpressure and estimation knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Above this length, new LOW-priority entries are rejected.
    /// CRITICAL entries are never rejected.
    #[serde(default = "default_overflow_limit")]
    pub overflow_limit: usize,

    /// Default wait budget for an entry, in seconds.
    #[serde(default = "default_max_wait")]
    pub default_max_wait_secs: u64,

    /// Seed for the rolling mean service time, in seconds.
    #[serde(default = "default_service_time")]
    pub initial_service_time_secs: f64,
}

impl QueueConfig {
    fn validate(&self) -> Result<()> {
        if self.overflow_limit == 0 {
            return Err(invalid("queue.overflow_limit must be positive"));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            overflow_limit: default_overflow_limit(),
            default_max_wait_secs: default_max_wait(),
            initial_service_time_secs: default_service_time(),
        }
    }
}

fn default_overflow_limit() -> usize {
    400
}
fn default_max_wait() -> u64 {
    1800
}
fn default_service_time() -> f64 {
    600.0
}

// ── Stress ───────────────────────────────────────────────────────────────

/// Stress tick cadence and break enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressConfig {
    /// Recalculation period in seconds.
    #[serde(default = "default_stress_period")]
    pub period_secs: u64,

    /// Stress at or above this forces a break.
    #[serde(default = "default_stress_break_threshold")]
    pub break_threshold: f64,

    /// Minimum forced-break duration in seconds.
    #[serde(default = "default_min_break")]
    pub min_break_secs: u64,

    /// Window over which frustration exposure is averaged, in seconds.
    #[serde(default = "default_exposure_window")]
    pub exposure_window_secs: u64,
}

impl StressConfig {
    fn validate(&self) -> Result<()> {
        if self.period_secs == 0 {
            return Err(invalid("stress.period_secs must be positive"));
        }
        if !(0.0..=1.0).contains(&self.break_threshold) {
            return Err(invalid("stress.break_threshold must be in 0..=1"));
        }
        Ok(())
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            period_secs: default_stress_period(),
            break_threshold: default_stress_break_threshold(),
            min_break_secs: default_min_break(),
            exposure_window_secs: default_exposure_window(),
        }
    }
}

fn default_stress_period() -> u64 {
    60
}
fn default_stress_break_threshold() -> f64 {
    0.7
}
fn default_min_break() -> u64 {
    600
}
fn default_exposure_window() -> u64 {
    7200
}

// ── Generator collaborator ───────────────────────────────────────────────

/// Generator collaborator endpoint and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// OpenAI-compatible endpoint base URL. Empty means the built-in
    /// rule-based generator is used.
    #[serde(default)]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifier for generation calls.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-call deadline in seconds.
    #[serde(default = "default_call_deadline")]
    pub call_deadline_secs: u64,

    /// Retry attempts for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum concurrent in-flight calls to the collaborator.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Token-bucket refill rate, requests per minute. 0 = unlimited.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            call_deadline_secs: default_call_deadline(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_concurrent: default_max_concurrent(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_api_key_env() -> String {
    "HANDOFF_GENERATOR_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_call_deadline() -> u64 {
    20
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_concurrent() -> usize {
    8
}
fn default_requests_per_minute() -> u32 {
    120
}

// ── Agent roster ─────────────────────────────────────────────────────────

/// One agent in the seed roster: profile plus starting status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSeed {
    /// Immutable identity.
    #[serde(flatten)]
    pub profile: AgentProfile,

    /// Starting presence status.
    #[serde(default = "default_seed_status")]
    pub initial_status: AgentStatus,
}

impl AgentSeed {
    fn validate(&self) -> Result<()> {
        if self.profile.agent_id.is_empty() {
            return Err(invalid("agent seed has an empty agent_id"));
        }
        if self.profile.max_concurrent_cases == 0 {
            return Err(invalid(format!(
                "agent {} has max_concurrent_cases = 0",
                self.profile.agent_id
            )));
        }
        if self.profile.skills.is_empty() {
            return Err(invalid(format!(
                "agent {} has no skills",
                self.profile.agent_id
            )));
        }
        Ok(())
    }
}

fn default_seed_status() -> AgentStatus {
    AgentStatus::Available
}
