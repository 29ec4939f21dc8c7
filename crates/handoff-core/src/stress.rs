//! Background stress recalculation.
//!
//! A single logical writer recomputes every agent's `stress_score` on a
//! fixed period, under the same per-agent exclusive sections the
//! assignment path uses, so a tick can never interleave a partial update
//! with a commit. Agents whose stress crosses the break threshold are
//! forced onto a break for at least the configured minimum; the tick
//! releases them once the minimum has elapsed and stress has recovered.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use handoff_types::agent::AgentState;
use handoff_types::config::StressConfig;
use handoff_types::queue::Complexity;
use handoff_types::request::FrustrationLevel;

use crate::config_handle::ConfigHandle;
use crate::directory::{AgentDirectory, CaseExposure};

/// Factor weights for the stress blend.
const W_CONSECUTIVE: f64 = 0.25;
const W_WORKLOAD: f64 = 0.20;
const W_EXPOSURE: f64 = 0.20;
const W_WORK_DURATION: f64 = 0.10;
const W_BREAK_RECENCY: f64 = 0.15;
const W_COMPLEXITY: f64 = 0.10;

/// Compute an agent's stress in `0.0..=1.0`.
pub(crate) fn compute_stress(
    state: &AgentState,
    max_concurrent: u32,
    recent: &VecDeque<CaseExposure>,
    config: &StressConfig,
    now: DateTime<Utc>,
) -> f64 {
    let consecutive = (f64::from(state.consecutive_difficult_cases) / 5.0).min(1.0);
    let workload = state.load_fraction(max_concurrent).min(1.0);

    let window_start = now - ChronoDuration::seconds(config.exposure_window_secs as i64);
    let windowed: Vec<&CaseExposure> = recent
        .iter()
        .filter(|c| c.completed_at >= window_start)
        .collect();

    let exposure = if windowed.is_empty() {
        0.0
    } else {
        windowed
            .iter()
            .map(|c| frustration_weight(c.frustration_level))
            .sum::<f64>()
            / windowed.len() as f64
    };
    let complexity_avg = if windowed.is_empty() {
        0.0
    } else {
        windowed
            .iter()
            .filter(|c| c.complexity == Complexity::High)
            .count() as f64
            / windowed.len() as f64
    };

    let since_break_minutes = state
        .last_break_at
        .map(|at| (now - at).num_seconds().max(0) as f64 / 60.0)
        .unwrap_or(f64::MAX);
    let break_recency = (since_break_minutes / 240.0).min(1.0);

    // Continuous on-shift time, approximated from the status anchor.
    let work_minutes = (now - state.status_since).num_seconds().max(0) as f64 / 60.0;
    let work_duration = (work_minutes / 480.0).min(1.0);

    (W_CONSECUTIVE * consecutive
        + W_WORKLOAD * workload
        + W_EXPOSURE * exposure
        + W_WORK_DURATION * work_duration
        + W_BREAK_RECENCY * break_recency
        + W_COMPLEXITY * complexity_avg)
        .clamp(0.0, 1.0)
}

fn frustration_weight(level: FrustrationLevel) -> f64 {
    match level {
        FrustrationLevel::Low => 0.0,
        FrustrationLevel::Moderate => 0.33,
        FrustrationLevel::High => 0.67,
        FrustrationLevel::Critical => 1.0,
    }
}

/// Run one recalculation pass over the whole directory.
pub fn run_tick(directory: &AgentDirectory, config: &StressConfig) {
    let now = Utc::now();
    for agent_id in directory.agent_ids() {
        let Some(snapshot) = directory.snapshot_one(&agent_id) else {
            continue;
        };
        let max_concurrent = snapshot.profile.max_concurrent_cases;
        let Some(score) = directory.with_stress_update(&agent_id, |state, recent| {
            compute_stress(state, max_concurrent, recent, config, now)
        }) else {
            continue;
        };

        if score >= config.break_threshold {
            directory.force_break(
                &agent_id,
                now + ChronoDuration::seconds(config.min_break_secs as i64),
            );
        } else {
            directory.try_end_forced_break(&agent_id, true);
        }
        debug!(agent_id = %agent_id, stress = score, "stress recalculated");
    }
}

/// Spawn the periodic stress tick. The task stops when the token fires.
pub fn spawn_stress_tick(
    directory: Arc<AgentDirectory>,
    config: ConfigHandle,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let stress = config.current().stress.clone();
            let period = std::time::Duration::from_secs(stress.period_secs);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {
                    run_tick(&directory, &stress);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_types::agent::{
        AgentProfile, AgentStatus, FrustrationTolerance, Proficiency, SkillTier,
    };
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn profile(id: &str, max_cases: u32) -> AgentProfile {
        AgentProfile {
            agent_id: id.into(),
            name: id.into(),
            skill_tier: SkillTier::Intermediate,
            skills: BTreeMap::from([("general".into(), Proficiency::Advanced)]),
            specializations: vec![],
            languages: BTreeMap::new(),
            certifications: vec![],
            years_experience: 2.0,
            timezone: None,
            frustration_tolerance: FrustrationTolerance::Medium,
            max_concurrent_cases: max_cases,
            weekly_schedule: BTreeMap::new(),
        }
    }

    fn fresh_state() -> AgentState {
        let mut state = AgentState::new(AgentStatus::Available);
        // Recent break keeps the recency factor quiet in baseline tests.
        state.last_break_at = Some(Utc::now());
        state
    }

    #[test]
    fn idle_rested_agent_has_low_stress() {
        let state = fresh_state();
        let score = compute_stress(
            &state,
            3,
            &VecDeque::new(),
            &StressConfig::default(),
            Utc::now(),
        );
        assert!(score < 0.2, "rested agent scored {score}");
    }

    #[test]
    fn difficult_streak_and_load_raise_stress() {
        let mut state = fresh_state();
        state.consecutive_difficult_cases = 5;
        state.current_workload = 3;
        let mut recent = VecDeque::new();
        for _ in 0..4 {
            recent.push_back(CaseExposure {
                completed_at: Utc::now(),
                frustration_level: FrustrationLevel::Critical,
                complexity: Complexity::High,
            });
        }
        let score = compute_stress(&state, 3, &recent, &StressConfig::default(), Utc::now());
        assert!(score > 0.7, "loaded agent scored {score}");
    }

    #[test]
    fn exposure_outside_window_ignored() {
        let state = fresh_state();
        let config = StressConfig::default();
        let mut old = VecDeque::new();
        old.push_back(CaseExposure {
            completed_at: Utc::now()
                - ChronoDuration::seconds(config.exposure_window_secs as i64 + 60),
            frustration_level: FrustrationLevel::Critical,
            complexity: Complexity::High,
        });
        let with_old = compute_stress(&state, 3, &old, &config, Utc::now());
        let without = compute_stress(&state, 3, &VecDeque::new(), &config, Utc::now());
        assert!((with_old - without).abs() < 1e-9);
    }

    #[test]
    fn never_breaking_raises_stress() {
        let mut rested = fresh_state();
        rested.last_break_at = Some(Utc::now());
        let mut no_break = fresh_state();
        no_break.last_break_at = None;
        let config = StressConfig::default();
        let a = compute_stress(&rested, 3, &VecDeque::new(), &config, Utc::now());
        let b = compute_stress(&no_break, 3, &VecDeque::new(), &config, Utc::now());
        assert!(b > a);
    }

    #[test]
    fn tick_forces_break_above_threshold() {
        let directory = AgentDirectory::new();
        directory.register(profile("tired", 2), AgentStatus::Available);

        // Pile on difficult completions to push stress up.
        for _ in 0..5 {
            let token = directory.claim_for_assignment("tired").unwrap();
            directory.commit_assignment(&token, Uuid::new_v4()).unwrap();
            directory
                .update_on_completion(
                    "tired",
                    &crate::directory::CompletionOutcome {
                        frustration_level: FrustrationLevel::Critical,
                        complexity: Complexity::High,
                        escalated: false,
                        first_contact_resolution: false,
                        satisfaction_rating: None,
                        resolution_minutes: 30.0,
                    },
                )
                .unwrap();
        }
        // Both open slots filled to max the workload factor.
        for _ in 0..2 {
            let token = directory.claim_for_assignment("tired").unwrap();
            directory.commit_assignment(&token, Uuid::new_v4()).unwrap();
        }

        let config = StressConfig {
            break_threshold: 0.5,
            ..StressConfig::default()
        };
        run_tick(&directory, &config);

        let snapshot = directory.snapshot_one("tired").unwrap();
        assert!(snapshot.state.stress_score >= 0.5);
        assert_eq!(snapshot.state.status, AgentStatus::Break);
    }

    #[test]
    fn tick_releases_break_after_minimum_and_recovery() {
        let directory = AgentDirectory::new();
        directory.register(profile("ok", 3), AgentStatus::Available);

        // Force a zero-length break, then tick with a low-stress state.
        directory.force_break("ok", Utc::now());
        assert_eq!(
            directory.snapshot_one("ok").unwrap().state.status,
            AgentStatus::Break
        );

        run_tick(&directory, &StressConfig::default());
        assert_eq!(
            directory.snapshot_one("ok").unwrap().state.status,
            AgentStatus::Available
        );
    }

    #[tokio::test]
    async fn spawned_tick_stops_on_cancel() {
        let directory = Arc::new(AgentDirectory::new());
        let config = ConfigHandle::new(handoff_types::config::Config::default()).unwrap();
        let cancel = CancellationToken::new();
        let handle = spawn_stress_tick(directory, config, cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }
}
