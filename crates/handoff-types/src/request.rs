//! The per-submission [`Request`] state object and its stage records.
//!
//! One `Request` exists per customer query. It is created by the entry
//! point, owned by exactly one pipeline stage at a time, and terminates
//! when the final response is delivered or the human assignment completes.
//!
//! Each stage writes exactly one optional record (`automation_result`,
//! `chatbot_output`, `quality_assessment`, `frustration_assessment`,
//! `context_bundle`, `routing_decision`). Token and cost counters on the
//! telemetry record only ever grow.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::{Complexity, Priority};

// ── Messages ─────────────────────────────────────────────────────────────

/// Author of a message on the request transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The customer's own utterances.
    Customer,
    /// Generated responses from the chatbot stage.
    Chatbot,
    /// A rewrite produced by the quality gate.
    QualityRewrite,
    /// Messages from an assigned human agent.
    Human,
    /// Orchestrator-emitted notices.
    System,
}

/// One entry on the append-only message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who authored the message.
    pub role: MessageRole,
    /// Message body.
    pub text: String,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
}

// ── Automation ───────────────────────────────────────────────────────────

/// Outcome of the automation stage's catalog match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationOutcome {
    /// The task was resolved end-to-end from the catalog template.
    Completed,
    /// The task was recognized but only partially handled.
    Partial,
    /// No catalog task applied, or the match could not be completed.
    Unresolved,
}

/// Result of the automation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationResult {
    /// The catalog task that matched, if any.
    pub task_id: Option<String>,
    /// Whether the task resolved, partially resolved, or fell through.
    pub outcome: AutomationOutcome,
    /// Populated response template on `Completed`.
    pub payload: Option<String>,
    /// Why the task did not complete (e.g. `missing_fields(order_id)`).
    pub reason: Option<String>,
}

// ── Chatbot ──────────────────────────────────────────────────────────────

/// Surface affect signals computed by lexicon match over the query text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceAffect {
    /// Hits against the urgency lexicon.
    pub urgency_signals: u32,
    /// Hits against the frustration lexicon.
    pub frustration_signals: u32,
    /// Hits against the politeness lexicon.
    pub politeness_signals: u32,
}

/// Output of the chatbot stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotOutput {
    /// The generated (or template-surfaced) response text.
    pub text: String,
    /// Lexicon-derived affect signals from the customer utterance.
    pub surface_affect: SurfaceAffect,
    /// Confidence in `0.0..=1.0`; model-reported when available, else
    /// heuristic.
    pub confidence: f64,
    /// Tokens consumed by the generation call; 0 when a template was
    /// surfaced without generation.
    pub tokens_used: u64,
}

// ── Quality gate ─────────────────────────────────────────────────────────

/// Verdict of the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityVerdict {
    /// The response may be delivered as-is.
    Adequate,
    /// The response should be rewritten before delivery.
    NeedsAdjustment,
    /// A human must take over.
    HumanIntervention,
}

/// The five scoring dimensions, each in `0.0..=10.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityDimensions {
    /// Factual soundness of the response.
    pub accuracy: f64,
    /// Coverage of everything the customer asked.
    pub completeness: f64,
    /// Readability and structure.
    pub clarity: f64,
    /// Tone and empathy.
    pub service: f64,
    /// Fit to the customer's current state.
    pub contextual: f64,
}

/// Result of the quality gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Weighted mean of the dimensions, in `0.0..=10.0`.
    pub score: f64,
    /// The gate's classification.
    pub verdict: QualityVerdict,
    /// Per-dimension scores behind the combined score.
    pub dimensions: QualityDimensions,
    /// Short machine-readable reasoning tag (e.g. `"no_response"`).
    pub reasoning: String,
    /// How many rewrite attempts were spent on this response.
    pub adjust_attempts: u32,
}

// ── Frustration ──────────────────────────────────────────────────────────

/// Bucketed customer frustration level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FrustrationLevel {
    /// Score below the moderate threshold.
    Low,
    /// Noticeable but contained irritation.
    Moderate,
    /// Strong irritation; wellbeing filters engage.
    High,
    /// Immediate human handling is required.
    Critical,
}

/// Direction of the customer's frustration across recent interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrustrationTrend {
    /// Within one point of the recent mean.
    Stable,
    /// At least one point above the recent mean.
    Rising,
    /// At least one point below the recent mean.
    Falling,
    /// No usable history, or the analyzer timed out.
    Unknown,
}

/// Result of the frustration analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrustrationAssessment {
    /// Bucketed level derived from the score.
    pub level: FrustrationLevel,
    /// Combined score in `0.0..=10.0`.
    pub score: f64,
    /// Direction relative to the recent-interaction mean.
    pub trend: FrustrationTrend,
    /// Which lexicon/behavioral indicators fired (category names).
    pub indicators: Vec<String>,
}

// ── Context ──────────────────────────────────────────────────────────────

/// Which collaborator source a context record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// The customer's recent interactions.
    RecentInteractions,
    /// The customer's profile record.
    UserProfile,
    /// Resolved cases similar to the current query.
    SimilarCases,
    /// Knowledge-base articles matching the query.
    KnowledgeBase,
}

/// One retrieved and relevance-scored context record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRecord {
    /// Source the record was retrieved from.
    pub source: ContextSource,
    /// Store-assigned record id.
    pub id: String,
    /// Record body.
    pub text: String,
    /// Relevance against the query text, in `0.0..=1.0`.
    pub relevance: f64,
    /// Record timestamp from the store.
    pub timestamp: DateTime<Utc>,
}

/// Skill and complexity hints extracted for the routing scorer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingHints {
    /// Skills the handling human should have.
    pub required_skills: Vec<String>,
    /// Complexity estimate from similar cases and the query shape.
    pub complexity_hint: Option<Complexity>,
    /// Customer language code when the request is flagged non-English.
    pub language: Option<String>,
    /// Whether the customer profile carries a VIP marker.
    pub vip: bool,
    /// Customer timezone, when known.
    pub timezone: Option<String>,
}

/// Audience-tailored summaries of the aggregated context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSummaries {
    /// Structured key-value pairs for prompt injection.
    pub for_ai: BTreeMap<String, String>,
    /// Narrative hand-over summary for a human agent.
    pub for_human: String,
    /// Risk and quality factors for the quality gate.
    pub for_quality: String,
    /// Required-skill and complexity hints for the routing scorer.
    pub for_routing: RoutingHints,
}

/// Result of the context manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Retained records, ranked across sources.
    pub records: Vec<ContextRecord>,
    /// Audience-tailored summaries.
    pub summaries: ContextSummaries,
}

// ── Routing ──────────────────────────────────────────────────────────────

/// Result of the routing scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected agent, or `None` when the request was enqueued.
    pub assigned_agent_id: Option<String>,
    /// How the selection was made (e.g. `best_match`,
    /// `wellbeing_protection`, `queued`, `queued_degraded`).
    pub strategy: String,
    /// Skills the scoring pass required.
    pub required_skills: Vec<String>,
    /// Request urgency bucket used for the weight table.
    pub priority: Priority,
    /// Complexity estimate used for difficulty classification.
    pub complexity: Complexity,
    /// Composite score of the selected agent, in `0.0..=1.0`.
    pub match_score: f64,
    /// Margin-derived confidence, in `0.0..=1.0`.
    pub confidence: f64,
    /// Next-best agent ids, best first.
    pub fallback_rank: Vec<String>,
}

// ── Workflow status and telemetry ────────────────────────────────────────

/// Lifecycle status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// A pipeline stage currently owns the request.
    InProgress,
    /// The final response was delivered to the customer.
    Delivered,
    /// Waiting in the queue for a human agent.
    Queued,
    /// A human agent has been assigned.
    Assigned,
    /// The customer cancelled the request.
    Abandoned,
    /// The pipeline could not produce any response.
    Failed,
}

impl WorkflowStatus {
    /// Whether the status permits no further stage mutations.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Delivered
                | WorkflowStatus::Assigned
                | WorkflowStatus::Abandoned
                | WorkflowStatus::Failed
        )
    }
}

/// Per-request accounting exported when the request terminates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Telemetry {
    /// Wall-clock duration per stage, in milliseconds.
    pub stage_durations_ms: BTreeMap<String, u64>,
    /// Total tokens consumed across all collaborator calls.
    pub tokens_total: u64,
    /// Total estimated collaborator cost in USD.
    pub cost_total: f64,
    /// Retry counts per stage.
    pub retries: BTreeMap<String, u32>,
    /// Collaborator-terminal errors recorded along the way.
    pub errors: Vec<String>,
}

// ── Request ──────────────────────────────────────────────────────────────

/// The central per-submission state object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique opaque id, assigned at creation.
    pub request_id: Uuid,
    /// Externally supplied customer id.
    pub user_id: String,
    /// Externally supplied session id.
    pub session_id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// The raw customer utterance.
    pub query_text: String,
    /// Append-only transcript.
    pub messages: Vec<Message>,
    /// Caller-supplied extra context, passed through to the stages.
    pub additional_context: BTreeMap<String, String>,
    /// Automation stage record.
    pub automation_result: Option<AutomationResult>,
    /// Chatbot stage record.
    pub chatbot_output: Option<ChatbotOutput>,
    /// Quality gate record.
    pub quality_assessment: Option<QualityAssessment>,
    /// Frustration analyzer record.
    pub frustration_assessment: Option<FrustrationAssessment>,
    /// Context manager record.
    pub context_bundle: Option<ContextBundle>,
    /// Routing scorer record.
    pub routing_decision: Option<RoutingDecision>,
    /// Text delivered to the customer, when the pipeline resolved it.
    pub final_response: Option<String>,
    /// Lifecycle status.
    pub workflow_status: WorkflowStatus,
    /// Per-request accounting.
    pub telemetry: Telemetry,
}

impl Request {
    /// Create a new request in `InProgress` state with the customer's
    /// utterance as the first transcript message.
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        query_text: impl Into<String>,
    ) -> Self {
        let query_text = query_text.into();
        let created_at = Utc::now();
        Self {
            request_id: Uuid::new_v4(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            created_at,
            messages: vec![Message {
                role: MessageRole::Customer,
                text: query_text.clone(),
                timestamp: created_at,
            }],
            query_text,
            additional_context: BTreeMap::new(),
            automation_result: None,
            chatbot_output: None,
            quality_assessment: None,
            frustration_assessment: None,
            context_bundle: None,
            routing_decision: None,
            final_response: None,
            workflow_status: WorkflowStatus::InProgress,
            telemetry: Telemetry::default(),
        }
    }

    /// Append a message to the transcript.
    pub fn push_message(&mut self, role: MessageRole, text: impl Into<String>) {
        self.messages.push(Message {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        });
    }

    /// Add token and cost spend. Counters are monotonically non-decreasing;
    /// negative cost deltas are ignored.
    pub fn add_spend(&mut self, tokens: u64, cost: f64) {
        self.telemetry.tokens_total += tokens;
        if cost > 0.0 {
            self.telemetry.cost_total += cost;
        }
    }

    /// Record a retry for a stage.
    pub fn add_retry(&mut self, stage: &str) {
        *self.telemetry.retries.entry(stage.to_string()).or_insert(0) += 1;
    }

    /// Whether the request must be handed to a human: the quality gate
    /// demanded intervention or frustration reached CRITICAL.
    pub fn needs_human(&self) -> bool {
        let quality_flag = self
            .quality_assessment
            .as_ref()
            .is_some_and(|q| q.verdict == QualityVerdict::HumanIntervention);
        let frustration_flag = self
            .frustration_assessment
            .as_ref()
            .is_some_and(|f| f.level == FrustrationLevel::Critical);
        quality_flag || frustration_flag
    }
}

impl FrustrationLevel {
    /// Whether the wellbeing filters treat this level as difficult.
    pub fn is_difficult(self) -> bool {
        matches!(self, FrustrationLevel::High | FrustrationLevel::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_starts_in_progress_with_transcript() {
        let req = Request::new("u1", "s1", "How do I reset my password?");
        assert_eq!(req.workflow_status, WorkflowStatus::InProgress);
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, MessageRole::Customer);
        assert_eq!(req.messages[0].text, "How do I reset my password?");
        assert!(req.final_response.is_none());
    }

    #[test]
    fn push_message_appends_in_order() {
        let mut req = Request::new("u1", "s1", "hello");
        req.push_message(MessageRole::Chatbot, "Hi! How can I help?");
        req.push_message(MessageRole::QualityRewrite, "Hello! How may I help you?");
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[1].role, MessageRole::Chatbot);
        assert_eq!(req.messages[2].role, MessageRole::QualityRewrite);
    }

    #[test]
    fn spend_counters_are_monotonic() {
        let mut req = Request::new("u1", "s1", "hello");
        req.add_spend(100, 0.002);
        req.add_spend(50, 0.001);
        assert_eq!(req.telemetry.tokens_total, 150);
        assert!((req.telemetry.cost_total - 0.003).abs() < 1e-9);

        // A bogus negative cost must not decrease the counter.
        req.add_spend(0, -1.0);
        assert!((req.telemetry.cost_total - 0.003).abs() < 1e-9);
    }

    #[test]
    fn retry_counter_accumulates_per_stage() {
        let mut req = Request::new("u1", "s1", "hello");
        req.add_retry("chatbot");
        req.add_retry("chatbot");
        req.add_retry("quality");
        assert_eq!(req.telemetry.retries["chatbot"], 2);
        assert_eq!(req.telemetry.retries["quality"], 1);
    }

    #[test]
    fn needs_human_on_quality_verdict() {
        let mut req = Request::new("u1", "s1", "hello");
        assert!(!req.needs_human());
        req.quality_assessment = Some(QualityAssessment {
            score: 2.0,
            verdict: QualityVerdict::HumanIntervention,
            dimensions: QualityDimensions {
                accuracy: 2.0,
                completeness: 2.0,
                clarity: 2.0,
                service: 2.0,
                contextual: 2.0,
            },
            reasoning: "no_response".into(),
            adjust_attempts: 0,
        });
        assert!(req.needs_human());
    }

    #[test]
    fn needs_human_on_critical_frustration() {
        let mut req = Request::new("u1", "s1", "hello");
        req.frustration_assessment = Some(FrustrationAssessment {
            level: FrustrationLevel::Critical,
            score: 9.1,
            trend: FrustrationTrend::Rising,
            indicators: vec!["explicit_escalation_request".into()],
        });
        assert!(req.needs_human());
    }

    #[test]
    fn terminal_statuses() {
        assert!(WorkflowStatus::Delivered.is_terminal());
        assert!(WorkflowStatus::Assigned.is_terminal());
        assert!(WorkflowStatus::Abandoned.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(!WorkflowStatus::InProgress.is_terminal());
        assert!(!WorkflowStatus::Queued.is_terminal());
    }

    #[test]
    fn frustration_level_ordering_and_difficulty() {
        assert!(FrustrationLevel::Low < FrustrationLevel::Moderate);
        assert!(FrustrationLevel::High < FrustrationLevel::Critical);
        assert!(!FrustrationLevel::Moderate.is_difficult());
        assert!(FrustrationLevel::High.is_difficult());
        assert!(FrustrationLevel::Critical.is_difficult());
    }

    #[test]
    fn request_serde_roundtrip() {
        let mut req = Request::new("u1", "s1", "Explain my deductible");
        req.automation_result = Some(AutomationResult {
            task_id: None,
            outcome: AutomationOutcome::Unresolved,
            payload: None,
            reason: Some("no_matching_task".into()),
        });
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_id, req.request_id);
        assert_eq!(
            parsed.automation_result.unwrap().outcome,
            AutomationOutcome::Unresolved
        );
    }

    #[test]
    fn snake_case_enum_wire_format() {
        let json = serde_json::to_string(&QualityVerdict::NeedsAdjustment).unwrap();
        assert_eq!(json, "\"needs_adjustment\"");
        let json = serde_json::to_string(&WorkflowStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let json = serde_json::to_string(&FrustrationTrend::Unknown).unwrap();
        assert_eq!(json, "\"unknown\"");
    }
}
