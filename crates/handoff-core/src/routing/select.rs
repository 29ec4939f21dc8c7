//! Agent selection: snapshot, filter, score, claim, commit.
//!
//! Selection never trusts a snapshot across the commit: the directory
//! re-checks presence and capacity under the agent's lock, and a lost
//! race triggers a full re-score against a fresh snapshot, up to the
//! configured attempt budget, before the request falls back to the
//! queue.
//!
//! A/B experiment variants carve deterministic fractions out of the
//! request-id hash space, so a request always lands in the same variant.

use chrono::Utc;
use fnv::FnvHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, info, warn};
use uuid::Uuid;

use handoff_types::agent::AgentSnapshot;
use handoff_types::config::Config;
use handoff_types::config::weights::{CategoryWeights, RoutingConfig};
use handoff_types::queue::QueueEntry;
use handoff_types::request::RoutingDecision;

use crate::directory::{AgentDirectory, ClaimError};
use crate::queue::WaitQueue;

use super::filters::hard_filter;
use super::score::{CategoryScores, CustomerFactors, RoutingDemand, score_agent};

/// Result of a selection pass.
#[derive(Debug)]
pub enum RouteOutcome {
    /// An agent was claimed and committed.
    Assigned(RoutingDecision),
    /// No assignment; the request should be enqueued with this strategy
    /// tag (`queued`, `queued_contention`, `queued_degraded`).
    Enqueue {
        /// Why the request is going to the queue.
        strategy: String,
    },
}

struct ScoredCandidate {
    snapshot: AgentSnapshot,
    scores: CategoryScores,
    composite: f64,
}

/// The weight row for this request: experiment variant (if the request
/// hashes into one) or the default table.
pub fn weights_for_request(
    config: &RoutingConfig,
    request_id: Uuid,
    demand: &RoutingDemand,
) -> CategoryWeights {
    let fraction = hash_fraction(request_id);
    let mut cumulative = 0.0;
    for variant in &config.experiments {
        cumulative += variant.traffic_fraction;
        if fraction < cumulative {
            debug!(request_id = %request_id, variant = %variant.name, "experiment variant applied");
            return variant.weights.row(demand.priority);
        }
    }
    config.weights.row(demand.priority)
}

/// Deterministic fraction in `[0, 1)` from the request id.
fn hash_fraction(request_id: Uuid) -> f64 {
    let mut hasher = FnvHasher::default();
    request_id.as_bytes().hash(&mut hasher);
    (hasher.finish() % 10_000) as f64 / 10_000.0
}

/// Select and commit one agent for the demand, or decide to enqueue.
pub fn select_agent(
    directory: &AgentDirectory,
    demand: &RoutingDemand,
    config: &Config,
    request_id: Uuid,
) -> RouteOutcome {
    let routing = &config.routing;
    let weights = weights_for_request(routing, request_id, demand);

    for attempt in 1..=routing.reselect_attempts {
        let snapshots = directory.snapshot_all();
        if snapshots.is_empty() {
            warn!(request_id = %request_id, "agent directory is empty");
            return RouteOutcome::Enqueue {
                strategy: "queued_degraded".into(),
            };
        }

        let now = Utc::now();
        let mut candidates: Vec<ScoredCandidate> = Vec::new();
        // Track the best raw skill score removed by a wellbeing filter so
        // the final decision can record that protection changed the pick.
        let mut best_filtered_wellbeing_skill: Option<f64> = None;

        for snapshot in snapshots {
            match hard_filter(&snapshot, demand, routing, now) {
                Some(reason) => {
                    if reason.is_wellbeing() {
                        let skill = super::score::skill_match_score(
                            &snapshot,
                            &demand.required_skills,
                        );
                        best_filtered_wellbeing_skill = Some(
                            best_filtered_wellbeing_skill.map_or(skill, |b: f64| b.max(skill)),
                        );
                    }
                    debug!(
                        agent_id = %snapshot.profile.agent_id,
                        ?reason,
                        "agent eliminated by hard filter"
                    );
                }
                None => {
                    let scores = score_agent(&snapshot, demand, routing, now);
                    let composite = scores.composite(weights);
                    candidates.push(ScoredCandidate {
                        snapshot,
                        scores,
                        composite,
                    });
                }
            }
        }

        if candidates.is_empty() {
            return RouteOutcome::Enqueue {
                strategy: "queued".into(),
            };
        }

        candidates.sort_by(|a, b| {
            b.composite
                .total_cmp(&a.composite)
                .then(b.scores.skill_match.total_cmp(&a.scores.skill_match))
                .then(b.scores.availability.total_cmp(&a.scores.availability))
                .then(
                    a.snapshot
                        .state
                        .current_workload
                        .cmp(&b.snapshot.state.current_workload),
                )
                .then(a.snapshot.profile.agent_id.cmp(&b.snapshot.profile.agent_id))
        });

        let best = &candidates[0];
        let agent_id = best.snapshot.profile.agent_id.clone();

        match directory.claim_for_assignment(&agent_id) {
            Ok(token) => {
                if let Err(err) = directory.commit_assignment(&token, request_id) {
                    warn!(request_id = %request_id, agent_id = %agent_id, error = %err,
                        "assignment commit failed");
                    continue;
                }

                let second_best = candidates.get(1).map(|c| c.composite).unwrap_or(0.0);
                let confidence = (best.composite - second_best + 0.5).clamp(0.0, 1.0);
                let fallback_rank: Vec<String> = candidates
                    .iter()
                    .skip(1)
                    .take(routing.fallback_count)
                    .map(|c| c.snapshot.profile.agent_id.clone())
                    .collect();

                let strategy = if best_filtered_wellbeing_skill
                    .is_some_and(|skill| skill > best.scores.skill_match)
                {
                    "wellbeing_protection"
                } else {
                    "best_match"
                };

                info!(
                    request_id = %request_id,
                    agent_id = %agent_id,
                    composite = best.composite,
                    confidence,
                    strategy,
                    attempt,
                    "agent selected"
                );

                return RouteOutcome::Assigned(RoutingDecision {
                    assigned_agent_id: Some(agent_id),
                    strategy: strategy.into(),
                    required_skills: demand.required_skills.clone(),
                    priority: demand.priority,
                    complexity: demand.complexity,
                    match_score: best.composite,
                    confidence,
                    fallback_rank,
                });
            }
            Err(err @ (ClaimError::AtCapacity | ClaimError::Offline | ClaimError::AlreadyClaimed)) => {
                debug!(
                    request_id = %request_id,
                    agent_id = %agent_id,
                    error = %err,
                    attempt,
                    "lost assignment race, re-scoring"
                );
                continue;
            }
            Err(ClaimError::NotFound) => {
                warn!(agent_id = %agent_id, "scored agent vanished from directory");
                continue;
            }
        }
    }

    RouteOutcome::Enqueue {
        strategy: "queued_contention".into(),
    }
}

/// For an agent becoming available: the first still-waiting entry, in
/// queue order, whose hard filters this agent passes.
///
/// An entry may only be overtaken when the agent's hard filters exclude
/// it, which keeps the dequeue order explainable against the queue
/// invariant.
pub fn peek_for_agent(
    queue: &WaitQueue,
    snapshot: &AgentSnapshot,
    config: &Config,
) -> Option<QueueEntry> {
    let now = Utc::now();
    for entry in queue.waiting() {
        let demand = RoutingDemand {
            required_skills: entry.required_skills.clone(),
            complexity: entry.complexity,
            priority: entry.priority,
            frustration_level: entry.frustration_level,
            customer: CustomerFactors::default(),
        };
        if hard_filter(snapshot, &demand, &config.routing, now).is_none() {
            return Some(entry);
        }
    }
    None
}
