//! Context manager: aggregate multi-source context and summarize it per
//! audience.
//!
//! Each source (recent interactions, user profile, similar cases,
//! knowledge base) is fetched within its per-source limit, scored for
//! relevance with token-set cosine, thresholded, and ranked into one
//! bounded bundle. Four summaries are produced: structured pairs for the
//! generator prompt, a narrative for the human agent, risk factors for
//! the quality gate, and skill/complexity hints for the routing scorer.
//!
//! A failing source is skipped; a failing summary generator falls back
//! to the rule-based templates. The stage never fails the pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use handoff_llm::{GenerateRequest, Generator};
use handoff_types::config::Config;
use handoff_types::queue::Complexity;
use handoff_types::request::{
    ContextBundle, ContextRecord, ContextSource, ContextSummaries, Request, RoutingHints,
};

use crate::collaborators::{ContextStore, StoredRecord};

use super::chatbot::COST_PER_TOKEN;

/// The context manager stage.
pub struct ContextStage {
    store: Arc<dyn ContextStore>,
    generator: Arc<dyn Generator>,
}

impl ContextStage {
    /// Create the stage around the context store and the generator used
    /// for optional narrative summaries.
    pub fn new(store: Arc<dyn ContextStore>, generator: Arc<dyn Generator>) -> Self {
        Self { store, generator }
    }

    /// Run the stage: sets `context_bundle`.
    pub async fn run(&self, request: &mut Request, config: &Config) {
        let limit = config.context.per_source_limit;
        let query = request.query_text.clone();
        let user_id = request.user_id.clone();

        let mut records: Vec<ContextRecord> = Vec::new();
        let mut profile_record: Option<StoredRecord> = None;

        match self.store.recent_interactions(&user_id, limit).await {
            Ok(batch) => collect(&mut records, batch, ContextSource::RecentInteractions, &query),
            Err(err) => warn!(error = %err, "recent interactions unavailable"),
        }
        match self.store.user_profile(&user_id).await {
            Ok(Some(record)) => {
                profile_record = Some(record.clone());
                collect(&mut records, vec![record], ContextSource::UserProfile, &query);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "user profile unavailable"),
        }
        match self.store.similar_cases(&query, limit).await {
            Ok(batch) => collect(&mut records, batch, ContextSource::SimilarCases, &query),
            Err(err) => warn!(error = %err, "similar cases unavailable"),
        }
        match self.store.knowledge_base_match(&query, limit).await {
            Ok(batch) => collect(&mut records, batch, ContextSource::KnowledgeBase, &query),
            Err(err) => warn!(error = %err, "knowledge base unavailable"),
        }

        // Threshold, rank across sources, cap the bundle.
        records.retain(|r| r.relevance >= config.context.relevance_threshold);
        records.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        records.truncate(config.context.total_limit);

        let hints = routing_hints(request, &records, profile_record.as_ref(), config);
        let for_ai = ai_summary(&records, profile_record.as_ref());
        let for_quality = quality_summary(request, &records);
        let for_human = self
            .human_summary(request, &records, config)
            .await;

        debug!(
            request_id = %request.request_id,
            records = records.len(),
            skills = ?hints.required_skills,
            "context aggregated"
        );
        request.context_bundle = Some(ContextBundle {
            records,
            summaries: ContextSummaries {
                for_ai,
                for_human,
                for_quality,
                for_routing: hints,
            },
        });
    }

    /// Narrative hand-over summary: generator-written when enabled,
    /// rule-based otherwise (and on any failure).
    async fn human_summary(
        &self,
        request: &mut Request,
        records: &[ContextRecord],
        config: &Config,
    ) -> String {
        let fallback = rule_based_human_summary(request, records);
        if !config.context.summaries_via_llm {
            return fallback;
        }

        let digest: String = records
            .iter()
            .take(5)
            .map(|r| format!("- {}\n", truncate(&r.text, 140)))
            .collect();
        let prompt = format!(
            "Summarize this support situation for a human agent in two \
             sentences.\n\nCustomer query: {}\n\nContext:\n{digest}",
            request.query_text
        );
        match self
            .generator
            .generate(&GenerateRequest::new(prompt, String::new()).with_max_tokens(192))
            .await
        {
            Ok(response) => {
                request.add_spend(
                    response.tokens_used,
                    response.tokens_used as f64 * COST_PER_TOKEN,
                );
                response.text
            }
            Err(err) => {
                warn!(request_id = %request.request_id, error = %err,
                    "summary generation failed, using rule-based summary");
                fallback
            }
        }
    }
}

fn collect(
    records: &mut Vec<ContextRecord>,
    batch: Vec<StoredRecord>,
    source: ContextSource,
    query: &str,
) {
    for record in batch {
        let relevance = token_cosine(query, &record.text);
        records.push(ContextRecord {
            source,
            id: record.id,
            text: record.text,
            relevance,
            timestamp: record.timestamp,
        });
    }
}

/// Cosine similarity over token sets.
fn token_cosine(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = tokens(a);
    let set_b: HashSet<String> = tokens(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let overlap = set_a.intersection(&set_b).count() as f64;
    overlap / ((set_a.len() as f64).sqrt() * (set_b.len() as f64).sqrt())
}

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > 2)
        .collect()
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}

/// Structured key-value pairs for prompt injection.
fn ai_summary(
    records: &[ContextRecord],
    profile: Option<&StoredRecord>,
) -> std::collections::BTreeMap<String, String> {
    let mut pairs = std::collections::BTreeMap::new();
    if let Some(profile) = profile {
        pairs.insert("customer_profile".into(), truncate(&profile.text, 200));
    }
    if let Some(best_kb) = records
        .iter()
        .find(|r| r.source == ContextSource::KnowledgeBase)
    {
        pairs.insert("knowledge_base".into(), truncate(&best_kb.text, 300));
    }
    if let Some(best_case) = records
        .iter()
        .find(|r| r.source == ContextSource::SimilarCases)
    {
        pairs.insert("similar_case".into(), truncate(&best_case.text, 300));
    }
    let interactions = records
        .iter()
        .filter(|r| r.source == ContextSource::RecentInteractions)
        .count();
    if interactions > 0 {
        pairs.insert("recent_interaction_count".into(), interactions.to_string());
    }
    pairs
}

/// Risk and quality factors for the quality gate.
fn quality_summary(request: &Request, records: &[ContextRecord]) -> String {
    let mut factors = Vec::new();
    if let Some(assessment) = &request.frustration_assessment {
        factors.push(format!("frustration={:?}", assessment.level));
    }
    let repeat_contacts = records
        .iter()
        .filter(|r| r.source == ContextSource::RecentInteractions && r.relevance > 0.3)
        .count();
    if repeat_contacts > 0 {
        factors.push(format!("repeat_contact_on_topic={repeat_contacts}"));
    }
    if let Some(result) = &request.automation_result
        && let Some(reason) = &result.reason
    {
        factors.push(format!("automation_reason={reason}"));
    }
    factors.join("; ")
}

/// Rule-based narrative hand-over summary.
fn rule_based_human_summary(request: &Request, records: &[ContextRecord]) -> String {
    let mut summary = format!(
        "Customer {} asks: {}",
        request.user_id,
        truncate(&request.query_text, 200)
    );
    if let Some(assessment) = &request.frustration_assessment {
        summary.push_str(&format!(
            " Frustration is {:?} ({:.1}/10, {:?}).",
            assessment.level, assessment.score, assessment.trend
        ));
    }
    let interactions = records
        .iter()
        .filter(|r| r.source == ContextSource::RecentInteractions)
        .count();
    if interactions > 0 {
        summary.push_str(&format!(" {interactions} related recent interaction(s)."));
    }
    summary
}

/// Skill and complexity hints for the routing scorer.
fn routing_hints(
    request: &Request,
    records: &[ContextRecord],
    profile: Option<&StoredRecord>,
    config: &Config,
) -> RoutingHints {
    let mut skills: Vec<String> = Vec::new();

    // The matched automation task's category is the primary skill hint.
    if let Some(result) = &request.automation_result
        && let Some(task_id) = &result.task_id
        && let Some(task) = config.automation.tasks.iter().find(|t| &t.task_id == task_id)
        && !skills.contains(&task.category)
    {
        skills.push(task.category.clone());
    }

    // Knowledge-base records may carry skill tags in metadata-free text;
    // fall back to a generic skill when nothing else matched.
    if skills.is_empty() {
        skills.push("general".into());
    }

    let word_count = request.query_text.split_whitespace().count();
    let question_count = request.query_text.matches('?').count();
    let complexity_hint = if word_count > 80 || question_count >= 3 {
        Some(Complexity::High)
    } else if records
        .iter()
        .any(|r| r.source == ContextSource::SimilarCases && r.relevance > 0.5)
    {
        Some(Complexity::Low)
    } else {
        Some(Complexity::Medium)
    };

    let (vip, language, timezone) = profile
        .map(|p| {
            (
                p.metadata.get("vip").is_some_and(|v| v == "true"),
                p.metadata
                    .get("language")
                    .filter(|l| l.as_str() != "en")
                    .cloned(),
                p.metadata.get("timezone").cloned(),
            )
        })
        .unwrap_or((false, None, None));

    RoutingHints {
        required_skills: skills,
        complexity_hint,
        language,
        vip,
        timezone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryContextStore;
    use handoff_llm::CannedGenerator;
    use handoff_llm::error::GeneratorError;
    use handoff_types::request::{AutomationOutcome, AutomationResult};

    fn stage_with_store(store: InMemoryContextStore) -> ContextStage {
        ContextStage::new(Arc::new(store), Arc::new(CannedGenerator::new()))
    }

    #[tokio::test]
    async fn aggregates_and_ranks_across_sources() {
        let store = InMemoryContextStore::new();
        store.add_interaction("u1", StoredRecord::new("i1", "asked about password reset"));
        store.add_article(StoredRecord::new("kb1", "How to reset your password safely"));
        store.add_article(StoredRecord::new("kb2", "Unrelated shipping policy"));
        store.add_case(StoredRecord::new("c1", "password reset case resolved quickly"));

        let stage = stage_with_store(store);
        let mut request = Request::new("u1", "s1", "How do I reset my password?");
        stage.run(&mut request, &Config::default()).await;

        let bundle = request.context_bundle.unwrap();
        assert!(!bundle.records.is_empty());
        // Ranked by relevance, descending.
        for pair in bundle.records.windows(2) {
            assert!(pair[0].relevance >= pair[1].relevance);
        }
        // The unrelated article fell under the threshold.
        assert!(bundle.records.iter().all(|r| r.id != "kb2"));
        assert!(bundle.summaries.for_ai.contains_key("knowledge_base"));
    }

    #[tokio::test]
    async fn total_limit_caps_bundle() {
        let store = InMemoryContextStore::new();
        for i in 0..20 {
            store.add_article(StoredRecord::new(
                format!("kb{i}"),
                "password reset help article",
            ));
        }
        let mut config = Config::default();
        config.context.per_source_limit = 20;
        config.context.total_limit = 3;

        let stage = stage_with_store(store);
        let mut request = Request::new("u1", "s1", "password reset help");
        stage.run(&mut request, &config).await;
        assert_eq!(request.context_bundle.unwrap().records.len(), 3);
    }

    #[tokio::test]
    async fn empty_store_yields_empty_bundle_with_hints() {
        let stage = stage_with_store(InMemoryContextStore::new());
        let mut request = Request::new("u1", "s1", "hello there");
        stage.run(&mut request, &Config::default()).await;

        let bundle = request.context_bundle.unwrap();
        assert!(bundle.records.is_empty());
        assert_eq!(bundle.summaries.for_routing.required_skills, vec!["general"]);
    }

    #[tokio::test]
    async fn automation_category_becomes_skill_hint() {
        let stage = stage_with_store(InMemoryContextStore::new());
        let mut request = Request::new("u1", "s1", "Where is my order?");
        request.automation_result = Some(AutomationResult {
            task_id: Some("order_status".into()),
            outcome: AutomationOutcome::Unresolved,
            payload: None,
            reason: Some("missing_fields(order_id)".into()),
        });
        stage.run(&mut request, &Config::default()).await;

        let hints = request.context_bundle.unwrap().summaries.for_routing;
        assert_eq!(hints.required_skills, vec!["orders"]);
    }

    #[tokio::test]
    async fn profile_metadata_feeds_customer_hints() {
        let store = InMemoryContextStore::new();
        store.set_profile(
            "u1",
            StoredRecord::new("p1", "premium customer since 2019")
                .with_meta("vip", "true")
                .with_meta("language", "de")
                .with_meta("timezone", "Europe/Berlin"),
        );
        let stage = stage_with_store(store);
        let mut request = Request::new("u1", "s1", "I need help with my account");
        stage.run(&mut request, &Config::default()).await;

        let hints = request.context_bundle.unwrap().summaries.for_routing;
        assert!(hints.vip);
        assert_eq!(hints.language.as_deref(), Some("de"));
        assert_eq!(hints.timezone.as_deref(), Some("Europe/Berlin"));
    }

    #[tokio::test]
    async fn english_language_not_flagged() {
        let store = InMemoryContextStore::new();
        store.set_profile(
            "u1",
            StoredRecord::new("p1", "customer").with_meta("language", "en"),
        );
        let stage = stage_with_store(store);
        let mut request = Request::new("u1", "s1", "help");
        stage.run(&mut request, &Config::default()).await;
        assert!(
            request
                .context_bundle
                .unwrap()
                .summaries
                .for_routing
                .language
                .is_none()
        );
    }

    #[tokio::test]
    async fn long_multiquestion_query_hints_high_complexity() {
        let stage = stage_with_store(InMemoryContextStore::new());
        let query = format!(
            "{} Also why? And how? And when?",
            "word ".repeat(90)
        );
        let mut request = Request::new("u1", "s1", query);
        stage.run(&mut request, &Config::default()).await;
        assert_eq!(
            request.context_bundle.unwrap().summaries.for_routing.complexity_hint,
            Some(Complexity::High)
        );
    }

    #[tokio::test]
    async fn llm_summary_falls_back_on_failure() {
        let generator = CannedGenerator::new();
        generator.push_scripted(Err(GeneratorError::Timeout));
        let stage = ContextStage::new(
            Arc::new(InMemoryContextStore::new()),
            Arc::new(generator),
        );
        let mut config = Config::default();
        config.context.summaries_via_llm = true;

        let mut request = Request::new("u7", "s7", "Explain my invoice");
        stage.run(&mut request, &config).await;

        let bundle = request.context_bundle.unwrap();
        // The rule-based fallback still mentions the customer.
        assert!(bundle.summaries.for_human.contains("u7"));
    }

    #[tokio::test]
    async fn quality_summary_carries_risk_factors() {
        let store = InMemoryContextStore::new();
        store.add_interaction("u1", StoredRecord::new("i1", "my deductible question again"));
        let stage = stage_with_store(store);

        let mut request = Request::new("u1", "s1", "deductible question again please help");
        request.frustration_assessment = Some(handoff_types::request::FrustrationAssessment {
            level: handoff_types::request::FrustrationLevel::High,
            score: 7.0,
            trend: handoff_types::request::FrustrationTrend::Rising,
            indicators: vec![],
        });
        stage.run(&mut request, &Config::default()).await;

        let summary = request.context_bundle.unwrap().summaries.for_quality;
        assert!(summary.contains("frustration=High"));
        assert!(summary.contains("repeat_contact_on_topic"));
    }

    #[test]
    fn cosine_bounds() {
        assert!((token_cosine("reset password", "reset password") - 1.0).abs() < 1e-9);
        assert!(token_cosine("reset password", "shipping rates").abs() < 1e-9);
        let partial = token_cosine("reset my password today", "password policy reset rules");
        assert!(partial > 0.0 && partial < 1.0);
    }
}
