//! Automation stage: resolve routine tasks from the configured catalog.
//!
//! Matching is keyword overlap over the case-folded, punctuation-stripped
//! utterance: `score = matched_keywords / task_keywords`. The
//! highest-scoring task above the threshold wins; ties break by higher
//! success rate, then alphabetical task id. Required fields are pulled
//! with per-field regexes; a missing field or a catalog-declared
//! escalation reason leaves the task unresolved.
//!
//! The stage never sets `final_response` and never fails the pipeline:
//! any internal error degrades to an `unresolved` result.

use regex::Regex;
use tracing::{debug, warn};

use handoff_types::config::{AutomationConfig, TaskSpec};
use handoff_types::request::{AutomationOutcome, AutomationResult, Request};

/// A catalog task with its field regexes compiled.
struct CompiledTask {
    spec: TaskSpec,
    fields: Vec<(String, Regex)>,
}

/// The automation stage. Construct once per config; regexes are compiled
/// eagerly and bad patterns disable only their own field.
pub struct AutomationStage {
    match_threshold: f64,
    tasks: Vec<CompiledTask>,
}

impl AutomationStage {
    /// Build the stage from the catalog config.
    pub fn new(config: &AutomationConfig) -> Self {
        let tasks = config
            .tasks
            .iter()
            .map(|spec| {
                let fields = spec
                    .required_fields
                    .iter()
                    .filter_map(|field| match Regex::new(&field.pattern) {
                        Ok(regex) => Some((field.name.clone(), regex)),
                        Err(err) => {
                            warn!(
                                task_id = %spec.task_id,
                                field = %field.name,
                                error = %err,
                                "invalid field pattern, field will never extract"
                            );
                            None
                        }
                    })
                    .collect();
                CompiledTask {
                    spec: spec.clone(),
                    fields,
                }
            })
            .collect();
        Self {
            match_threshold: config.match_threshold,
            tasks,
        }
    }

    /// Run the stage: sets `automation_result` on the request.
    pub fn run(&self, request: &mut Request) {
        let result = self.resolve(&request.query_text);
        debug!(
            request_id = %request.request_id,
            task_id = result.task_id.as_deref().unwrap_or("-"),
            outcome = ?result.outcome,
            "automation stage finished"
        );
        request.automation_result = Some(result);
    }

    fn resolve(&self, query_text: &str) -> AutomationResult {
        let normalized = normalize(query_text);

        let mut best: Option<(f64, &CompiledTask)> = None;
        for task in &self.tasks {
            let keywords = &task.spec.trigger_keywords;
            let hits = keywords
                .iter()
                .filter(|kw| normalized.contains(&normalize(kw)))
                .count();
            if hits == 0 {
                continue;
            }
            let score = hits as f64 / keywords.len() as f64;
            if score < self.match_threshold {
                continue;
            }
            best = match best {
                None => Some((score, task)),
                Some((best_score, best_task)) => {
                    let replace = score > best_score
                        || (score == best_score
                            && (task.spec.success_rate > best_task.spec.success_rate
                                || (task.spec.success_rate == best_task.spec.success_rate
                                    && task.spec.task_id < best_task.spec.task_id)));
                    if replace {
                        Some((score, task))
                    } else {
                        Some((best_score, best_task))
                    }
                }
            };
        }

        let Some((_, task)) = best else {
            return AutomationResult {
                task_id: None,
                outcome: AutomationOutcome::Unresolved,
                payload: None,
                reason: Some("no_matching_task".into()),
            };
        };

        if let Some(reason) = &task.spec.escalation_reason {
            return AutomationResult {
                task_id: Some(task.spec.task_id.clone()),
                outcome: AutomationOutcome::Unresolved,
                payload: None,
                reason: Some(reason.clone()),
            };
        }

        // Extract required fields; collect what is missing.
        let mut values = Vec::new();
        let mut missing = Vec::new();
        for (name, regex) in &task.fields {
            match regex
                .captures(query_text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
            {
                Some(value) => values.push((name.clone(), value)),
                None => missing.push(name.clone()),
            }
        }
        // Fields whose pattern failed to compile count as missing too.
        for field in &task.spec.required_fields {
            if !task.fields.iter().any(|(name, _)| name == &field.name)
                && !missing.contains(&field.name)
            {
                missing.push(field.name.clone());
            }
        }

        if !missing.is_empty() {
            return AutomationResult {
                task_id: Some(task.spec.task_id.clone()),
                outcome: AutomationOutcome::Unresolved,
                payload: None,
                reason: Some(format!("missing_fields({})", missing.join(","))),
            };
        }

        let mut payload = task.spec.response_template.clone();
        for (name, value) in &values {
            payload = payload.replace(&format!("{{{name}}}"), value);
        }

        AutomationResult {
            task_id: Some(task.spec.task_id.clone()),
            outcome: AutomationOutcome::Completed,
            payload: Some(payload),
            reason: None,
        }
    }
}

/// Case-fold and strip punctuation, collapsing whitespace.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}
