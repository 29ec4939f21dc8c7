//! Frustration analyzer: lexical, behavioral, and model affect signals.
//!
//! Three signals combine into a `0..=10` score:
//!
//! 1. **Lexical** -- weighted hits against the configured lexicon
//!    categories (profanity, exasperation, threat-to-leave, explicit
//!    escalation requests).
//! 2. **Behavioral** -- text shape: ALL-CAPS ratio, exclamation density,
//!    repeated question marks.
//! 3. **Model** -- an optional generator call returning a numeric rating;
//!    when absent its weight is redistributed proportionally.
//!
//! The cheap lexical+behavioral pair also powers the pre-screen the
//! pipeline runs before the chatbot, so a CRITICAL customer skips
//! response generation entirely.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use handoff_llm::{GenerateRequest, Generator};
use handoff_types::config::{Config, FrustrationConfig};
use handoff_types::request::{
    FrustrationAssessment, FrustrationLevel, FrustrationTrend, Request,
};

use crate::collaborators::StoredRecord;

use super::chatbot::COST_PER_TOKEN;

/// The frustration analyzer.
pub struct FrustrationAnalyzer {
    generator: Arc<dyn Generator>,
}

impl FrustrationAnalyzer {
    /// Create the analyzer around a generator collaborator.
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Cheap lexical+behavioral screen, no collaborator calls. Returns
    /// the combined score with the model weight redistributed.
    pub fn pre_screen(query_text: &str, config: &FrustrationConfig) -> (f64, Vec<String>) {
        let (lexical, mut indicators) = lexical_score(query_text, config);
        let (behavioral, behavioral_indicators) = behavioral_score(query_text);
        indicators.extend(behavioral_indicators);
        let (w_lex, w_beh) = config.weights_without_llm();
        let score = (w_lex * lexical + w_beh * behavioral).clamp(0.0, 10.0);
        (score, indicators)
    }

    /// Bucket a score into a level under the configured thresholds.
    pub fn level_for(score: f64, config: &FrustrationConfig) -> FrustrationLevel {
        if score < config.moderate_threshold {
            FrustrationLevel::Low
        } else if score < config.high_threshold {
            FrustrationLevel::Moderate
        } else if score < config.critical_threshold {
            FrustrationLevel::High
        } else {
            FrustrationLevel::Critical
        }
    }

    /// Run the full analysis: sets `frustration_assessment`.
    ///
    /// `history` is the customer's recent interactions from the context
    /// store, newest first; it feeds the trend comparison.
    pub async fn run(&self, request: &mut Request, history: &[StoredRecord], config: &Config) {
        let frustration = &config.frustration;
        let (lexical, mut indicators) = lexical_score(&request.query_text, frustration);
        let (behavioral, behavioral_indicators) = behavioral_score(&request.query_text);
        indicators.extend(behavioral_indicators);

        let llm = if frustration.llm_enabled {
            self.model_score(request, config).await
        } else {
            None
        };

        let score = match llm {
            Some(model) => (frustration.lexical_weight * lexical
                + frustration.behavioral_weight * behavioral
                + frustration.llm_weight * model)
                .clamp(0.0, 10.0),
            None => {
                let (w_lex, w_beh) = frustration.weights_without_llm();
                (w_lex * lexical + w_beh * behavioral).clamp(0.0, 10.0)
            }
        };

        let trend = trend_for(score, history, frustration);
        let level = Self::level_for(score, frustration);

        debug!(
            request_id = %request.request_id,
            score,
            ?level,
            ?trend,
            "frustration analyzed"
        );
        request.frustration_assessment = Some(FrustrationAssessment {
            level,
            score,
            trend,
            indicators,
        });
    }

    /// Ask the generator for a numeric rating. `None` on failure or an
    /// unparsable reply.
    async fn model_score(&self, request: &mut Request, config: &Config) -> Option<f64> {
        let prompt = format!(
            "Rate the customer's frustration on a 0-10 scale. Reply with only \
             the number.\n\nMessage: {}",
            request.query_text
        );
        let generate = GenerateRequest::new(prompt, String::new())
            .with_max_tokens(8)
            .with_deadline(Duration::from_secs(
                config.pipeline.frustration_deadline_secs,
            ));

        match self.generator.generate(&generate).await {
            Ok(response) => {
                request.add_spend(
                    response.tokens_used,
                    response.tokens_used as f64 * COST_PER_TOKEN,
                );
                let parsed = response
                    .text
                    .split_whitespace()
                    .find_map(|token| token.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse::<f64>().ok());
                parsed.map(|v| v.clamp(0.0, 10.0))
            }
            Err(err) => {
                warn!(request_id = %request.request_id, error = %err, "model affect score failed");
                None
            }
        }
    }
}

/// Weighted lexicon hits, doubled and capped at 10, plus the category
/// names that fired.
fn lexical_score(query_text: &str, config: &FrustrationConfig) -> (f64, Vec<String>) {
    let lower = query_text.to_lowercase();
    let mut points = 0.0;
    let mut indicators = Vec::new();
    for category in &config.lexicon.categories {
        let hits = category
            .terms
            .iter()
            .filter(|term| lower.contains(term.as_str()))
            .count();
        if hits > 0 {
            points += category.weight * hits as f64;
            indicators.push(category.name.clone());
        }
    }
    ((points * 2.0).min(10.0), indicators)
}

/// Text-shape score plus the behavioral indicators that fired.
fn behavioral_score(query_text: &str) -> (f64, Vec<String>) {
    let mut indicators = Vec::new();

    let letters: Vec<char> = query_text.chars().filter(|c| c.is_alphabetic()).collect();
    let caps_points = if letters.len() >= 12 {
        let upper = letters.iter().filter(|c| c.is_uppercase()).count() as f64;
        let ratio = upper / letters.len() as f64;
        if ratio > 0.6 {
            indicators.push("all_caps".into());
            8.0 * ratio
        } else if ratio > 0.3 {
            4.0 * ratio
        } else {
            0.0
        }
    } else {
        0.0
    };

    let exclamations = query_text.matches('!').count();
    let exclamation_points = (exclamations.min(5) as f64) * 1.2;
    if exclamations >= 2 {
        indicators.push("exclamations".into());
    }

    let repeated_questions = query_text.matches("??").count();
    let question_points = ((repeated_questions as f64) * 2.0).min(4.0);
    if repeated_questions > 0 {
        indicators.push("repeated_questions".into());
    }

    (
        (caps_points + exclamation_points + question_points).min(10.0),
        indicators,
    )
}

/// Trend against the recent-interaction mean. Prior scores come from the
/// `frustration_score` metadata key when present, else a lexical screen
/// over the stored text.
fn trend_for(
    score: f64,
    history: &[StoredRecord],
    config: &FrustrationConfig,
) -> FrustrationTrend {
    let previous: Vec<f64> = history
        .iter()
        .take(config.trend_window)
        .map(|record| {
            record
                .metadata
                .get("frustration_score")
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or_else(|| FrustrationAnalyzer::pre_screen(&record.text, config).0)
        })
        .collect();

    if previous.is_empty() {
        return FrustrationTrend::Unknown;
    }
    let mean = previous.iter().sum::<f64>() / previous.len() as f64;
    let delta = score - mean;
    if delta >= config.trend_delta {
        FrustrationTrend::Rising
    } else if delta <= -config.trend_delta {
        FrustrationTrend::Falling
    } else {
        FrustrationTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_llm::CannedGenerator;
    use handoff_llm::error::GeneratorError;

    const ANGRY: &str = "THIS IS RIDICULOUS I WANT A MANAGER NOW";
    const CALM: &str = "How do I reset my password?";

    fn analyzer_with(generator: CannedGenerator) -> FrustrationAnalyzer {
        FrustrationAnalyzer::new(Arc::new(generator))
    }

    fn no_llm_config() -> Config {
        let mut config = Config::default();
        config.frustration.llm_enabled = false;
        config
    }

    #[test]
    fn pre_screen_flags_caps_and_escalation() {
        let config = FrustrationConfig::default();
        let (score, indicators) = FrustrationAnalyzer::pre_screen(ANGRY, &config);
        assert!(score >= config.critical_threshold, "score {score} not critical");
        assert!(indicators.contains(&"explicit_escalation_request".to_string()));
        assert!(indicators.contains(&"all_caps".to_string()));
    }

    #[test]
    fn pre_screen_calm_query_is_low() {
        let config = FrustrationConfig::default();
        let (score, _) = FrustrationAnalyzer::pre_screen(CALM, &config);
        assert!(
            score < config.moderate_threshold,
            "calm query scored {score}"
        );
    }

    #[test]
    fn level_bucketing_boundaries() {
        let config = FrustrationConfig::default();
        assert_eq!(
            FrustrationAnalyzer::level_for(0.0, &config),
            FrustrationLevel::Low
        );
        assert_eq!(
            FrustrationAnalyzer::level_for(2.99, &config),
            FrustrationLevel::Low
        );
        assert_eq!(
            FrustrationAnalyzer::level_for(3.0, &config),
            FrustrationLevel::Moderate
        );
        assert_eq!(
            FrustrationAnalyzer::level_for(6.0, &config),
            FrustrationLevel::High
        );
        assert_eq!(
            FrustrationAnalyzer::level_for(8.0, &config),
            FrustrationLevel::Critical
        );
        assert_eq!(
            FrustrationAnalyzer::level_for(10.0, &config),
            FrustrationLevel::Critical
        );
    }

    #[tokio::test]
    async fn critical_customer_assessed_critical() {
        let analyzer = analyzer_with(CannedGenerator::new());
        let mut request = Request::new("u3", "s3", ANGRY);
        analyzer.run(&mut request, &[], &no_llm_config()).await;

        let assessment = request.frustration_assessment.unwrap();
        assert_eq!(assessment.level, FrustrationLevel::Critical);
        assert!(assessment.score >= 8.0);
    }

    #[tokio::test]
    async fn calm_customer_assessed_low() {
        let analyzer = analyzer_with(CannedGenerator::new());
        let mut request = Request::new("u1", "s1", CALM);
        analyzer.run(&mut request, &[], &no_llm_config()).await;
        assert_eq!(
            request.frustration_assessment.unwrap().level,
            FrustrationLevel::Low
        );
    }

    #[tokio::test]
    async fn model_score_blends_in() {
        let generator = CannedGenerator::new();
        generator.push_scripted(Ok(CannedGenerator::response("9")));
        let analyzer = analyzer_with(generator);

        let mut request = Request::new("u1", "s1", "I am mildly annoyed about my bill");
        analyzer.run(&mut request, &[], &Config::default()).await;

        let assessment = request.frustration_assessment.unwrap();
        // Lexical/behavioral are near zero; the model's 9 contributes its
        // 0.3 weight.
        assert!(assessment.score >= 2.0, "score {}", assessment.score);
        assert!(request.telemetry.tokens_total > 0);
    }

    #[tokio::test]
    async fn model_failure_redistributes_weights() {
        let generator = CannedGenerator::new();
        generator.push_scripted(Err(GeneratorError::Timeout));
        let analyzer = analyzer_with(generator);

        let mut request = Request::new("u3", "s3", ANGRY);
        analyzer.run(&mut request, &[], &Config::default()).await;

        // Still critical on lexical+behavioral alone.
        assert_eq!(
            request.frustration_assessment.unwrap().level,
            FrustrationLevel::Critical
        );
    }

    #[tokio::test]
    async fn unparsable_model_reply_ignored() {
        let generator = CannedGenerator::new();
        generator.push_scripted(Ok(CannedGenerator::response("quite frustrated I'd say")));
        let analyzer = analyzer_with(generator);

        let mut request = Request::new("u1", "s1", CALM);
        analyzer.run(&mut request, &[], &Config::default()).await;
        assert_eq!(
            request.frustration_assessment.unwrap().level,
            FrustrationLevel::Low
        );
    }

    #[tokio::test]
    async fn trend_rising_against_calm_history() {
        let analyzer = analyzer_with(CannedGenerator::new());
        let history = vec![
            StoredRecord::new("i1", "thanks, all good").with_meta("frustration_score", "1.0"),
            StoredRecord::new("i2", "quick question about billing")
                .with_meta("frustration_score", "2.0"),
        ];
        let mut request = Request::new("u3", "s3", ANGRY);
        analyzer.run(&mut request, &history, &no_llm_config()).await;
        assert_eq!(
            request.frustration_assessment.unwrap().trend,
            FrustrationTrend::Rising
        );
    }

    #[tokio::test]
    async fn trend_falling_against_angry_history() {
        let analyzer = analyzer_with(CannedGenerator::new());
        let history = vec![
            StoredRecord::new("i1", "x").with_meta("frustration_score", "9.0"),
            StoredRecord::new("i2", "y").with_meta("frustration_score", "8.0"),
        ];
        let mut request = Request::new("u1", "s1", CALM);
        analyzer.run(&mut request, &history, &no_llm_config()).await;
        assert_eq!(
            request.frustration_assessment.unwrap().trend,
            FrustrationTrend::Falling
        );
    }

    #[tokio::test]
    async fn trend_unknown_without_history() {
        let analyzer = analyzer_with(CannedGenerator::new());
        let mut request = Request::new("u1", "s1", CALM);
        analyzer.run(&mut request, &[], &no_llm_config()).await;
        assert_eq!(
            request.frustration_assessment.unwrap().trend,
            FrustrationTrend::Unknown
        );
    }

    #[tokio::test]
    async fn history_without_metadata_estimated_from_text() {
        let analyzer = analyzer_with(CannedGenerator::new());
        // Prior messages are themselves angry: trend should be stable.
        let history = vec![
            StoredRecord::new("i1", "THIS IS RIDICULOUS I WANT A MANAGER NOW"),
            StoredRecord::new("i2", "ABSOLUTELY UNACCEPTABLE I WILL ESCALATE THIS NOW"),
        ];
        let mut request = Request::new("u3", "s3", ANGRY);
        analyzer.run(&mut request, &history, &no_llm_config()).await;
        assert_eq!(
            request.frustration_assessment.unwrap().trend,
            FrustrationTrend::Stable
        );
    }

    #[test]
    fn behavioral_indicators() {
        let (_, indicators) = behavioral_score("Why?? Why is this broken?? Fix it!!");
        assert!(indicators.contains(&"repeated_questions".to_string()));
        assert!(indicators.contains(&"exclamations".to_string()));
    }
}
