//! `handoff status` -- resolved configuration and roster diagnostics.

use comfy_table::{Cell, Table, presets::UTF8_FULL};
use tracing::error;

use crate::config_file;

/// Run the command; returns the process exit code.
pub fn run(path: Option<&str>) -> i32 {
    let config = match config_file::load(path) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "could not load config");
            return 1;
        }
    };
    if let Err(err) = config.validate() {
        error!(error = %err, "config validation failed");
        return 2;
    }

    let mut thresholds = Table::new();
    thresholds.load_preset(UTF8_FULL);
    thresholds.set_header(vec!["Setting", "Value"]);
    thresholds.add_row(vec![
        Cell::new("quality adequate / adjust"),
        Cell::new(format!(
            "{:.1} / {:.1} ({} rewrites)",
            config.quality.adequate_threshold,
            config.quality.adjust_threshold,
            config.quality.max_adjust_attempts
        )),
    ]);
    thresholds.add_row(vec![
        Cell::new("frustration moderate / high / critical"),
        Cell::new(format!(
            "{:.1} / {:.1} / {:.1}",
            config.frustration.moderate_threshold,
            config.frustration.high_threshold,
            config.frustration.critical_threshold
        )),
    ]);
    thresholds.add_row(vec![
        Cell::new("queue overflow limit"),
        Cell::new(config.queue.overflow_limit.to_string()),
    ]);
    thresholds.add_row(vec![
        Cell::new("routing cooldown / max consecutive"),
        Cell::new(format!(
            "{:.1}h / {}",
            config.routing.cooldown_hours, config.routing.max_consecutive_difficult
        )),
    ]);
    thresholds.add_row(vec![
        Cell::new("stress period / break threshold"),
        Cell::new(format!(
            "{}s / {:.2}",
            config.stress.period_secs, config.stress.break_threshold
        )),
    ]);
    thresholds.add_row(vec![
        Cell::new("automation tasks"),
        Cell::new(config.automation.tasks.len().to_string()),
    ]);
    thresholds.add_row(vec![
        Cell::new("generator"),
        Cell::new(if config.generator.base_url.is_empty() {
            "built-in (canned)".to_string()
        } else {
            config.generator.base_url.clone()
        }),
    ]);
    println!("{thresholds}");

    let mut roster = Table::new();
    roster.load_preset(UTF8_FULL);
    roster.set_header(vec!["Agent", "Tier", "Skills", "Tolerance", "Capacity"]);
    for seed in &config.agents {
        let profile = &seed.profile;
        roster.add_row(vec![
            Cell::new(&profile.agent_id),
            Cell::new(format!("{:?}", profile.skill_tier)),
            Cell::new(
                profile
                    .skills
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            Cell::new(format!("{:?}", profile.frustration_tolerance)),
            Cell::new(profile.max_concurrent_cases.to_string()),
        ]);
    }
    if config.agents.is_empty() {
        println!("no agents configured");
    } else {
        println!("{roster}");
    }
    0
}
