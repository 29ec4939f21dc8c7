//! `handoff serve` -- run the orchestrator with a console ingress.
//!
//! Each stdin line is submitted as a customer query (user `console`);
//! the outcome is printed when the request settles. A config watcher
//! hot-swaps validated edits to the config file. Ctrl-c or EOF drains
//! the service and exits 0; an orchestrator construction failure exits
//! 1 (2 when the config itself is invalid).

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use handoff_core::service::RequestView;
use handoff_core::{Orchestrator, collaborators::InMemoryContextStore};
use handoff_llm::{
    CannedGenerator, Generator, LimitConfig, OpenAiCompatConfig, OpenAiCompatGenerator,
    RateLimited, RetryConfig, RetryPolicy,
};
use handoff_types::request::WorkflowStatus;

use crate::config_file;
use crate::watch;

/// Arguments for `handoff serve`.
#[derive(Args)]
pub struct ServeArgs {
    /// Session id used for console submissions.
    #[arg(long, default_value = "console")]
    session: String,
}

/// Run the command; returns the process exit code.
pub async fn run(config_path: Option<&str>, args: ServeArgs) -> i32 {
    let config = match config_file::load(config_path) {
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

    let generator = build_generator(&config);
    let store = Arc::new(InMemoryContextStore::new());
    let orchestrator = match Orchestrator::new(config, generator, store) {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            error!(error = %err, "orchestrator start failed");
            return 1;
        }
    };

    // Hot-reload watcher: invalid files are rejected, the previous
    // config stays active.
    let _watcher = config_path.map(|path| {
        let orchestrator = orchestrator.clone();
        let path_owned = path.to_string();
        watch::watch_config(path, Duration::from_millis(500), move || {
            match config_file::load(Some(&path_owned)) {
                Ok(new_config) => match orchestrator.reload_config(new_config) {
                    Ok(()) => info!("config reloaded"),
                    Err(err) => warn!(error = %err, "reload rejected, keeping previous config"),
                },
                Err(err) => warn!(error = %err, "config file unreadable, keeping previous"),
            }
        })
    });

    info!("handoff serving; type a customer query, ctrl-c to drain");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) if !text.trim().is_empty() => {
                        handle_line(&orchestrator, &args.session, text.trim()).await;
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }

    orchestrator.drain().await;
    0
}

async fn handle_line(orchestrator: &Orchestrator, session: &str, query: &str) {
    let handle = match orchestrator.submit("console", session, query, None) {
        Ok(handle) => handle,
        Err(err) => {
            println!("rejected: {err}");
            return;
        }
    };

    // Wait for the request to settle, then report.
    for _ in 0..600 {
        if let Some(view) = handle.snapshot()
            && view.status != WorkflowStatus::InProgress
        {
            print_outcome(&view);
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    println!("request {} still in progress", handle.request_id());
}

fn print_outcome(view: &RequestView) {
    match view.status {
        WorkflowStatus::Delivered => {
            println!("{}", view.final_response.as_deref().unwrap_or(""));
        }
        WorkflowStatus::Assigned => {
            println!(
                "-> handed to agent {}",
                view.assigned_agent_id.as_deref().unwrap_or("?")
            );
        }
        WorkflowStatus::Queued => {
            println!(
                "-> queued at position {} (estimated {})",
                view.queue_position.unwrap_or(0),
                view.estimated_assignment_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".into())
            );
        }
        WorkflowStatus::Failed => {
            println!("failed: {}", view.error.as_deref().unwrap_or("unknown"));
        }
        WorkflowStatus::Abandoned => println!("abandoned"),
        WorkflowStatus::InProgress => {}
    }
}

/// The generator stack: OpenAI-compatible endpoint wrapped in retry and
/// rate limits when configured, the canned fallback otherwise.
fn build_generator(config: &handoff_types::config::Config) -> Arc<dyn Generator> {
    let generator_config = &config.generator;
    if generator_config.base_url.is_empty() {
        info!("no generator endpoint configured, using built-in canned generator");
        return Arc::new(CannedGenerator::new());
    }

    let inner = OpenAiCompatGenerator::new(OpenAiCompatConfig {
        base_url: generator_config.base_url.clone(),
        api_key_env: generator_config.api_key_env.clone(),
        model: generator_config.model.clone(),
        default_deadline: Duration::from_secs(generator_config.call_deadline_secs),
    });
    let retried = RetryPolicy::new(
        inner,
        RetryConfig {
            max_retries: generator_config.max_retries,
            base_delay: Duration::from_millis(generator_config.base_delay_ms),
            ..RetryConfig::default()
        },
    );
    Arc::new(RateLimited::new(
        retried,
        LimitConfig {
            max_concurrent: generator_config.max_concurrent,
            requests_per_minute: generator_config.requests_per_minute,
        },
    ))
}
