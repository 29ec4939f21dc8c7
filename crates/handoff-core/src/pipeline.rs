//! The per-request pipeline driver.
//!
//! Owns a request for the duration of its run (single writer) and drives
//! it through the stages in order, honoring the short-circuit edge:
//!
//! ```text
//! Automation -> [pre-screen] -> Chatbot -> Quality -> Frustration
//!                    |  CRITICAL                          |  CRITICAL
//!                    +-------------> Context <------------+
//!                                       |
//!                                  deliver / route
//! ```
//!
//! Every stage runs under a deadline with a defined degraded output:
//! a chatbot timeout leaves no output (the quality gate then forces
//! HUMAN_INTERVENTION), a frustration timeout defaults to LOW with an
//! unknown trend, a context timeout yields an empty bundle. The pipeline
//! never stalls on a single stage failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use handoff_llm::Generator;
use handoff_types::config::Config;
use handoff_types::error::{HandoffError, Result};
use handoff_types::queue::{Complexity, Priority};
use handoff_types::request::{
    FrustrationAssessment, FrustrationLevel, FrustrationTrend, QualityAssessment,
    QualityDimensions, QualityVerdict, Request, WorkflowStatus,
};

use crate::collaborators::ContextStore;
use crate::routing::{CustomerFactors, RoutingDemand};
use crate::stages::{
    AutomationStage, ChatbotStage, ContextStage, FrustrationAnalyzer, QualityGate,
};

/// What the pipeline decided for a request.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The response was delivered; the request is terminal.
    Delivered,
    /// A human must take over; route with this demand.
    NeedsHuman(RoutingDemand),
}

/// The stage driver. Built against one sampled config; the service
/// rebuilds it when the config is swapped, so in-flight runs keep the
/// config they started with.
pub struct Pipeline {
    config: Arc<Config>,
    automation: AutomationStage,
    chatbot: ChatbotStage,
    quality: QualityGate,
    frustration: FrustrationAnalyzer,
    context: ContextStage,
    store: Arc<dyn ContextStore>,
}

impl Pipeline {
    /// Build all stages against one config snapshot.
    pub fn new(
        config: Arc<Config>,
        generator: Arc<dyn Generator>,
        store: Arc<dyn ContextStore>,
    ) -> Self {
        Self {
            automation: AutomationStage::new(&config.automation),
            chatbot: ChatbotStage::new(generator.clone()),
            quality: QualityGate::new(generator.clone()),
            frustration: FrustrationAnalyzer::new(generator.clone()),
            context: ContextStage::new(store.clone(), generator),
            store,
            config,
        }
    }

    /// The config this pipeline was built against.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Drive a request through the stages.
    ///
    /// # Errors
    ///
    /// [`HandoffError::Abandoned`] when the cancellation token fires
    /// between stages; stage-level failures degrade instead of erroring.
    pub async fn run(
        &self,
        request: &mut Request,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        let config = &self.config;

        // ── Stage 1: automation ─────────────────────────────────────
        self.check_cancel(cancel)?;
        let started = std::time::Instant::now();
        self.automation.run(request);
        record_duration(request, "automation", started);

        // ── Pre-screen: skip generation for critical customers ──────
        let (screen_score, _) =
            FrustrationAnalyzer::pre_screen(&request.query_text, &config.frustration);
        let skip_generation = FrustrationAnalyzer::level_for(screen_score, &config.frustration)
            == FrustrationLevel::Critical;

        if skip_generation {
            info!(
                request_id = %request.request_id,
                score = screen_score,
                "critical frustration pre-screen, skipping chatbot and quality"
            );
            self.run_frustration(request, screen_score).await;
            force_human_intervention(request, "critical_frustration");
        } else {
            // ── Stage 2: chatbot ────────────────────────────────────
            self.check_cancel(cancel)?;
            let started = std::time::Instant::now();
            let deadline = Duration::from_secs(config.pipeline.stage_deadline_secs);
            if with_deadline(deadline, self.chatbot.run(request, config))
                .await
                .is_none()
            {
                warn!(request_id = %request.request_id, "chatbot stage deadline exceeded");
                request.telemetry.errors.push("chatbot: deadline_exceeded".into());
                request.chatbot_output = None;
            }
            record_duration(request, "chatbot", started);

            // ── Stage 3: quality gate ───────────────────────────────
            self.check_cancel(cancel)?;
            let started = std::time::Instant::now();
            if with_deadline(deadline, self.quality.run(request, config))
                .await
                .is_none()
            {
                warn!(request_id = %request.request_id, "quality stage deadline exceeded");
                if request.quality_assessment.is_none() {
                    force_human_intervention(request, "deadline_exceeded");
                }
            }
            record_duration(request, "quality", started);

            // ── Stage 4: frustration ────────────────────────────────
            self.check_cancel(cancel)?;
            let started = std::time::Instant::now();
            self.run_frustration(request, screen_score).await;
            record_duration(request, "frustration", started);

            if request
                .frustration_assessment
                .as_ref()
                .is_some_and(|f| f.level == FrustrationLevel::Critical)
            {
                force_human_intervention(request, "critical_frustration");
            }
        }

        // ── Stage 5: context ────────────────────────────────────────
        self.check_cancel(cancel)?;
        let started = std::time::Instant::now();
        let deadline = Duration::from_secs(config.pipeline.stage_deadline_secs);
        if with_deadline(deadline, self.context.run(request, config))
            .await
            .is_none()
        {
            warn!(request_id = %request.request_id, "context stage deadline exceeded");
            request.context_bundle = Some(Default::default());
        }
        record_duration(request, "context", started);

        // ── Decide: deliver or hand to a human ──────────────────────
        self.check_cancel(cancel)?;
        let explicit_escalation = request
            .frustration_assessment
            .as_ref()
            .is_some_and(|f| {
                f.indicators
                    .iter()
                    .any(|i| i == "explicit_escalation_request")
            });

        if request.needs_human() || explicit_escalation {
            let demand = self.derive_demand(request);
            debug!(
                request_id = %request.request_id,
                priority = ?demand.priority,
                skills = ?demand.required_skills,
                "request flagged for human handling"
            );
            return Ok(PipelineOutcome::NeedsHuman(demand));
        }

        let text = request
            .chatbot_output
            .as_ref()
            .map(|o| o.text.clone())
            .ok_or(HandoffError::InvariantViolation {
                reason: "deliverable request without chatbot output".into(),
            })?;
        request.final_response = Some(text);
        request.workflow_status = WorkflowStatus::Delivered;
        info!(request_id = %request.request_id, "response delivered");
        Ok(PipelineOutcome::Delivered)
    }

    /// Full frustration analysis under its deadline; a timeout defaults
    /// to LOW with an unknown trend unless the pre-screen was already
    /// critical.
    async fn run_frustration(&self, request: &mut Request, screen_score: f64) {
        let config = &self.config;
        let deadline = Duration::from_secs(config.pipeline.frustration_deadline_secs);

        let history = with_deadline(
            deadline,
            self.store
                .recent_interactions(&request.user_id, config.frustration.trend_window),
        )
        .await
        .and_then(|r| r.ok())
        .unwrap_or_default();

        if with_deadline(deadline, self.frustration.run(request, &history, config))
            .await
            .is_none()
        {
            warn!(request_id = %request.request_id, "frustration stage deadline exceeded");
            let (score, level) = if FrustrationAnalyzer::level_for(
                screen_score,
                &config.frustration,
            ) == FrustrationLevel::Critical
            {
                (screen_score, FrustrationLevel::Critical)
            } else {
                (0.0, FrustrationLevel::Low)
            };
            request.frustration_assessment = Some(FrustrationAssessment {
                level,
                score,
                trend: FrustrationTrend::Unknown,
                indicators: vec![],
            });
        }
    }

    /// Build the routing demand from the stage records.
    fn derive_demand(&self, request: &Request) -> RoutingDemand {
        let hints = request
            .context_bundle
            .as_ref()
            .map(|b| b.summaries.for_routing.clone())
            .unwrap_or_default();

        let frustration_level = request
            .frustration_assessment
            .as_ref()
            .map(|f| f.level)
            .unwrap_or(FrustrationLevel::Low);

        let mut complexity = hints.complexity_hint.unwrap_or(Complexity::Medium);
        if request
            .quality_assessment
            .as_ref()
            .is_some_and(|q| q.score > 0.0 && q.score < self.config.quality.adjust_threshold)
        {
            complexity = Complexity::High;
        }

        let urgency = request
            .chatbot_output
            .as_ref()
            .map(|o| o.surface_affect.urgency_signals)
            .unwrap_or(0);
        let explicit_escalation = request
            .frustration_assessment
            .as_ref()
            .is_some_and(|f| {
                f.indicators
                    .iter()
                    .any(|i| i == "explicit_escalation_request")
            });

        let priority = if frustration_level == FrustrationLevel::Critical {
            Priority::Critical
        } else if frustration_level == FrustrationLevel::High
            || explicit_escalation
            || urgency >= 2
        {
            Priority::High
        } else if complexity == Complexity::Low && frustration_level == FrustrationLevel::Low {
            Priority::Low
        } else {
            Priority::Medium
        };

        let mut required_skills = hints.required_skills;
        required_skills.sort();
        required_skills.dedup();

        RoutingDemand {
            required_skills,
            complexity,
            priority,
            frustration_level,
            customer: CustomerFactors {
                vip: hints.vip,
                language: hints.language,
                timezone: hints.timezone,
            },
        }
    }

    fn check_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(HandoffError::Abandoned)
        } else {
            Ok(())
        }
    }
}

/// Force the quality verdict to HUMAN_INTERVENTION, preserving an
/// existing assessment's scores.
fn force_human_intervention(request: &mut Request, reasoning: &str) {
    match request.quality_assessment.as_mut() {
        Some(assessment) => {
            if assessment.verdict != QualityVerdict::HumanIntervention {
                assessment.verdict = QualityVerdict::HumanIntervention;
                assessment.reasoning = reasoning.into();
            }
        }
        None => {
            request.quality_assessment = Some(QualityAssessment {
                score: 0.0,
                verdict: QualityVerdict::HumanIntervention,
                dimensions: QualityDimensions {
                    accuracy: 0.0,
                    completeness: 0.0,
                    clarity: 0.0,
                    service: 0.0,
                    contextual: 0.0,
                },
                reasoning: reasoning.into(),
                adjust_attempts: 0,
            });
        }
    }
}

async fn with_deadline<F: Future>(deadline: Duration, fut: F) -> Option<F::Output> {
    timeout(deadline, fut).await.ok()
}

fn record_duration(request: &mut Request, stage: &str, started: std::time::Instant) {
    request
        .telemetry
        .stage_durations_ms
        .insert(stage.to_string(), started.elapsed().as_millis() as u64);
}
