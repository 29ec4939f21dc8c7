//! Chatbot stage: generate the customer-facing response.
//!
//! When automation already completed the task, the templated payload is
//! surfaced directly (confidence 1.0, zero tokens). Otherwise the stage
//! composes a prompt from the system instructions, any context the
//! bundle already holds, and the utterance, and calls the generator
//! collaborator.
//!
//! A terminal generator failure leaves `chatbot_output` unset; the
//! quality gate then forces HUMAN_INTERVENTION. The stage also runs the
//! surface-affect lexicon scan regardless of the generation path.

use std::sync::Arc;

use tracing::{debug, warn};

use handoff_llm::{GenerateRequest, Generator};
use handoff_types::config::{Config, RubricLexicon};
use handoff_types::request::{
    AutomationOutcome, ChatbotOutput, MessageRole, Request, SurfaceAffect,
};

/// Estimated collaborator cost per token, USD.
pub(crate) const COST_PER_TOKEN: f64 = 2e-6;

/// The chatbot stage.
pub struct ChatbotStage {
    generator: Arc<dyn Generator>,
}

impl ChatbotStage {
    /// Create the stage around a generator collaborator.
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Run the stage: sets `chatbot_output` and appends the chatbot
    /// message on success.
    pub async fn run(&self, request: &mut Request, config: &Config) {
        let surface_affect = scan_affect(&request.query_text, config);

        // Completed automation surfaces its payload without generation.
        if let Some(result) = &request.automation_result
            && result.outcome == AutomationOutcome::Completed
            && let Some(payload) = result.payload.clone()
        {
            debug!(request_id = %request.request_id, "surfacing automation payload");
            request.push_message(MessageRole::Chatbot, payload.clone());
            request.chatbot_output = Some(ChatbotOutput {
                text: payload,
                surface_affect,
                confidence: 1.0,
                tokens_used: 0,
            });
            return;
        }

        let prompt = compose_prompt(request);
        let generate = GenerateRequest::new(prompt, config.chatbot.system_instructions.clone())
            .with_max_tokens(config.chatbot.max_tokens)
            .with_deadline(std::time::Duration::from_secs(
                config.generator.call_deadline_secs,
            ));

        match self.generator.generate(&generate).await {
            Ok(response) => {
                let confidence = response
                    .model_confidence
                    .unwrap_or_else(|| {
                        heuristic_confidence(&response.text, &config.quality.rubric)
                    });
                request.add_spend(
                    response.tokens_used,
                    response.tokens_used as f64 * COST_PER_TOKEN,
                );
                request.push_message(MessageRole::Chatbot, response.text.clone());
                request.chatbot_output = Some(ChatbotOutput {
                    text: response.text,
                    surface_affect,
                    confidence,
                    tokens_used: response.tokens_used,
                });
            }
            Err(err) => {
                warn!(
                    request_id = %request.request_id,
                    error = %err,
                    "chatbot generation failed terminally"
                );
                request
                    .telemetry
                    .errors
                    .push(format!("chatbot: {err}"));
                request.chatbot_output = None;
            }
        }
    }
}

/// Build the generation prompt: context pairs (when the bundle exists)
/// followed by the utterance.
fn compose_prompt(request: &Request) -> String {
    let mut prompt = String::new();
    if let Some(bundle) = &request.context_bundle {
        for (key, value) in &bundle.summaries.for_ai {
            prompt.push_str(&format!("{key}: {value}\n"));
        }
        if !prompt.is_empty() {
            prompt.push('\n');
        }
    }
    prompt.push_str(&request.query_text);
    prompt
}

/// Surface affect by lexicon match over the utterance.
fn scan_affect(query_text: &str, config: &Config) -> SurfaceAffect {
    let lower = query_text.to_lowercase();
    let affect = &config.chatbot.affect;
    let count = |terms: &[String]| terms.iter().filter(|t| lower.contains(t.as_str())).count() as u32;
    SurfaceAffect {
        urgency_signals: count(&affect.urgency),
        frustration_signals: count(&affect.frustration),
        politeness_signals: count(&affect.politeness),
    }
}

/// Confidence from response shape when the model reports none. Refusal
/// markers come from the configured rubric lexicon.
fn heuristic_confidence(text: &str, rubric: &RubricLexicon) -> f64 {
    let lower = text.to_lowercase();
    if text.trim().is_empty() {
        return 0.0;
    }
    if rubric.refusal.iter().any(|m| lower.contains(m.as_str())) {
        return 0.4;
    }
    if text.len() < 40 {
        return 0.5;
    }
    0.85
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_llm::CannedGenerator;
    use handoff_llm::error::GeneratorError;
    use handoff_types::request::AutomationResult;

    fn stage_with(generator: CannedGenerator) -> ChatbotStage {
        ChatbotStage::new(Arc::new(generator))
    }

    #[tokio::test]
    async fn surfaces_completed_automation_payload() {
        let stage = stage_with(CannedGenerator::new());
        let mut request = Request::new("u1", "s1", "reset my password please");
        request.automation_result = Some(AutomationResult {
            task_id: Some("reset_password".into()),
            outcome: AutomationOutcome::Completed,
            payload: Some("A reset link is on its way.".into()),
            reason: None,
        });

        stage.run(&mut request, &Config::default()).await;

        let output = request.chatbot_output.unwrap();
        assert_eq!(output.text, "A reset link is on its way.");
        assert!((output.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(output.tokens_used, 0);
        assert_eq!(request.telemetry.tokens_total, 0);
        assert_eq!(request.messages.last().unwrap().role, MessageRole::Chatbot);
    }

    #[tokio::test]
    async fn generates_when_automation_unresolved() {
        let generator =
            CannedGenerator::new().with_rule("deductible", "A deductible is what you pay first.");
        let stage = stage_with(generator);
        let mut request = Request::new("u1", "s1", "Explain my deductible");
        request.automation_result = Some(AutomationResult {
            task_id: None,
            outcome: AutomationOutcome::Unresolved,
            payload: None,
            reason: Some("no_matching_task".into()),
        });

        stage.run(&mut request, &Config::default()).await;

        let output = request.chatbot_output.unwrap();
        assert!(output.text.contains("deductible"));
        assert!(output.tokens_used > 0);
        assert!(request.telemetry.tokens_total > 0);
        assert!(request.telemetry.cost_total > 0.0);
    }

    #[tokio::test]
    async fn terminal_failure_leaves_output_unset() {
        let generator = CannedGenerator::new();
        generator.push_scripted(Err(GeneratorError::AuthFailed("bad key".into())));
        let stage = stage_with(generator);
        let mut request = Request::new("u1", "s1", "help me");

        stage.run(&mut request, &Config::default()).await;

        assert!(request.chatbot_output.is_none());
        assert_eq!(request.telemetry.errors.len(), 1);
        assert!(request.telemetry.errors[0].starts_with("chatbot:"));
    }

    #[tokio::test]
    async fn affect_scan_counts_lexicon_hits() {
        let stage = stage_with(CannedGenerator::new());
        let mut request = Request::new(
            "u1",
            "s1",
            "Please help immediately, this is urgent and I am frustrated. Thanks!",
        );
        stage.run(&mut request, &Config::default()).await;

        let affect = request.chatbot_output.unwrap().surface_affect;
        assert!(affect.urgency_signals >= 2, "urgent + immediately");
        assert!(affect.frustration_signals >= 1);
        assert!(affect.politeness_signals >= 2, "please + thanks");
    }

    #[tokio::test]
    async fn prompt_includes_context_pairs_when_present() {
        let generator = CannedGenerator::new().with_rule("plan: premium", "You are on premium.");
        let stage = stage_with(generator);
        let mut request = Request::new("u1", "s1", "What plan am I on?");
        let mut bundle = handoff_types::request::ContextBundle::default();
        bundle
            .summaries
            .for_ai
            .insert("plan".into(), "premium".into());
        request.context_bundle = Some(bundle);

        stage.run(&mut request, &Config::default()).await;
        assert_eq!(request.chatbot_output.unwrap().text, "You are on premium.");
    }

    #[test]
    fn confidence_heuristic_bands() {
        let rubric = RubricLexicon::default();
        assert!(heuristic_confidence("", &rubric).abs() < f64::EPSILON);
        assert!(
            (heuristic_confidence("I can't help with that", &rubric) - 0.4).abs()
                < f64::EPSILON
        );
        assert!((heuristic_confidence("Sure.", &rubric) - 0.5).abs() < f64::EPSILON);
        assert!(
            (heuristic_confidence(
                "Here is a detailed explanation of the deductible on your plan.",
                &rubric
            ) - 0.85)
                .abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn configured_refusal_phrase_lowers_confidence() {
        let mut rubric = RubricLexicon::default();
        let text = "That falls outside what this desk handles, unfortunately.";
        assert!((heuristic_confidence(text, &rubric) - 0.85).abs() < f64::EPSILON);

        rubric.refusal.push("outside what this desk handles".into());
        assert!((heuristic_confidence(text, &rubric) - 0.4).abs() < f64::EPSILON);
    }
}
