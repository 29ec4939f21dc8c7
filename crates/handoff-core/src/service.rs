//! The orchestrator service: the inbound API over the pipeline.
//!
//! `submit` validates the call, creates the Request, and hands it to a
//! bounded worker pool; each worker owns its Request through the
//! pipeline (single writer) and then routes, enqueues, or delivers.
//! `cancel` and `human_complete` are idempotent; `drain` stops new
//! submits and waits out the in-flight work; `status` reports the
//! counts the control surface exposes.
//!
//! Completion closes the loop: rolling metrics are updated on the
//! directory, the observed service time feeds the queue's wait
//! estimator, and the freed agent immediately pulls the best eligible
//! waiting entry.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use handoff_llm::Generator;
use handoff_types::agent::AgentStatus;
use handoff_types::config::Config;
use handoff_types::error::{HandoffError, Result};
use handoff_types::queue::{Complexity, Priority};
use handoff_types::request::{FrustrationLevel, Request, RoutingDecision, WorkflowStatus};

use crate::collaborators::ContextStore;
use crate::config_handle::ConfigHandle;
use crate::directory::{AgentDirectory, CompletionOutcome};
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::queue::{EnqueueRequest, WaitQueue};
use crate::routing::{RouteOutcome, peek_for_agent, select_agent};
use crate::stress::spawn_stress_tick;

/// Maximum accepted query length, in characters.
const MAX_QUERY_CHARS: usize = 8192;

/// Caller-visible view of a request.
#[derive(Debug, Clone)]
pub struct RequestView {
    /// The request id.
    pub request_id: Uuid,
    /// Lifecycle status.
    pub status: WorkflowStatus,
    /// Delivered text, when the pipeline resolved the request.
    pub final_response: Option<String>,
    /// Assigned agent, when a human took over.
    pub assigned_agent_id: Option<String>,
    /// Queue position, while waiting.
    pub queue_position: Option<usize>,
    /// Estimated assignment time, while waiting.
    pub estimated_assignment_at: Option<DateTime<Utc>>,
    /// User-safe failure message, when the request failed.
    pub error: Option<String>,
}

/// Control-surface counters.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    /// Requests currently inside the pipeline.
    pub in_flight: usize,
    /// Waiting queue entries per priority.
    pub queued_by_priority: HashMap<Priority, usize>,
    /// Agents per presence status.
    pub agent_status: HashMap<AgentStatus, usize>,
    /// Whether the service is draining.
    pub draining: bool,
}

/// Facts about a routed request kept for the completion report.
#[derive(Debug, Clone, Copy)]
struct RoutedFacts {
    frustration_level: FrustrationLevel,
    complexity: Complexity,
    priority: Priority,
}

struct RequestSlot {
    view: Mutex<RequestView>,
    cancel: CancellationToken,
    facts: Mutex<Option<RoutedFacts>>,
    assigned_at: Mutex<Option<DateTime<Utc>>>,
}

impl RequestSlot {
    fn new(request_id: Uuid) -> Self {
        Self {
            view: Mutex::new(RequestView {
                request_id,
                status: WorkflowStatus::InProgress,
                final_response: None,
                assigned_agent_id: None,
                queue_position: None,
                estimated_assignment_at: None,
                error: None,
            }),
            cancel: CancellationToken::new(),
            facts: Mutex::new(None),
            assigned_at: Mutex::new(None),
        }
    }

    fn update_view(&self, f: impl FnOnce(&mut RequestView)) {
        let mut view = self.view.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut view);
    }

    fn view(&self) -> RequestView {
        self.view.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

struct ServiceState {
    config: ConfigHandle,
    directory: Arc<AgentDirectory>,
    queue: Arc<WaitQueue>,
    generator: Arc<dyn Generator>,
    store: Arc<dyn ContextStore>,
    pipeline: RwLock<Arc<Pipeline>>,
    registry: RwLock<HashMap<Uuid, Arc<RequestSlot>>>,
    completed: Mutex<HashSet<Uuid>>,
    workers: Arc<Semaphore>,
    draining: AtomicBool,
    in_flight: AtomicUsize,
    shutdown: CancellationToken,
}

/// Handle returned by `submit`; queryable for the request's progress.
#[derive(Clone)]
pub struct RequestHandle {
    request_id: Uuid,
    state: Arc<ServiceState>,
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl RequestHandle {
    /// The request id.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Current view of the request, with a fresh queue position while
    /// the request is waiting.
    pub fn snapshot(&self) -> Option<RequestView> {
        snapshot_view(&self.state, self.request_id)
    }
}

/// The orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    state: Arc<ServiceState>,
}

impl Orchestrator {
    /// Build the orchestrator: validates config, seeds the directory,
    /// and starts the stress tick.
    pub fn new(
        config: Config,
        generator: Arc<dyn Generator>,
        store: Arc<dyn ContextStore>,
    ) -> Result<Self> {
        let config = ConfigHandle::new(config)?;
        let current = config.current();
        let directory = Arc::new(AgentDirectory::from_seeds(&current.agents));
        let queue = Arc::new(WaitQueue::new());
        let pipeline = Arc::new(Pipeline::new(
            current.clone(),
            generator.clone(),
            store.clone(),
        ));
        let shutdown = CancellationToken::new();
        let _stress_tick = spawn_stress_tick(directory.clone(), config.clone(), shutdown.clone());

        let workers = Arc::new(Semaphore::new(current.pipeline.max_workers));
        let state = Arc::new(ServiceState {
            config,
            directory,
            queue,
            generator,
            store,
            pipeline: RwLock::new(pipeline),
            registry: RwLock::new(HashMap::new()),
            completed: Mutex::new(HashSet::new()),
            workers,
            draining: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            shutdown,
        });
        refresh_active_agents(&state);
        Ok(Self { state })
    }

    /// The agent directory (for control surfaces and tests).
    pub fn directory(&self) -> &Arc<AgentDirectory> {
        &self.state.directory
    }

    /// Submit a customer query. Returns a handle the caller polls.
    ///
    /// # Errors
    ///
    /// [`HandoffError::Validation`] for malformed submissions or while
    /// draining; no Request is created in either case.
    pub fn submit(
        &self,
        user_id: &str,
        session_id: &str,
        query_text: &str,
        additional_context: Option<BTreeMap<String, String>>,
    ) -> Result<RequestHandle> {
        if self.state.draining.load(Ordering::SeqCst) {
            return Err(HandoffError::Validation {
                reason: "service is draining".into(),
            });
        }
        if user_id.is_empty() || session_id.is_empty() {
            return Err(HandoffError::Validation {
                reason: "user_id and session_id are required".into(),
            });
        }
        if query_text.trim().is_empty() {
            return Err(HandoffError::Validation {
                reason: "query_text is empty".into(),
            });
        }
        if query_text.chars().count() > MAX_QUERY_CHARS {
            return Err(HandoffError::Validation {
                reason: "query_text exceeds maximum length".into(),
            });
        }

        let mut request = Request::new(user_id, session_id, query_text);
        if let Some(extra) = additional_context {
            request.additional_context = extra;
        }
        let request_id = request.request_id;

        let slot = Arc::new(RequestSlot::new(request_id));
        self.state
            .registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request_id, slot.clone());

        let state = self.state.clone();
        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let _permit = state.workers.clone().acquire_owned().await;
            run_request(&state, &slot, request).await;
            state.in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        info!(request_id = %request_id, user_id, "request submitted");
        Ok(RequestHandle {
            request_id,
            state: self.state.clone(),
        })
    }

    /// Query any request's progress.
    pub fn query(&self, request_id: Uuid) -> Option<RequestView> {
        snapshot_view(&self.state, request_id)
    }

    /// Cancel a request (customer abandonment). Idempotent.
    pub fn cancel(&self, request_id: Uuid) {
        let Some(slot) = self
            .state
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&request_id)
            .cloned()
        else {
            return;
        };

        slot.cancel.cancel();
        let config = self.state.config.current();
        if self
            .state
            .queue
            .cancel_by_request(request_id, &config.queue)
            .is_some()
        {
            info!(request_id = %request_id, "queued request abandoned");
        }

        let view = slot.view();
        if view.status.is_terminal() && view.status != WorkflowStatus::Assigned {
            return;
        }
        if view.status == WorkflowStatus::Assigned {
            // The assigned agent is told the customer left; the case is
            // closed without polluting difficulty counters.
            if let Some(agent_id) = view.assigned_agent_id.clone() {
                warn!(request_id = %request_id, agent_id = %agent_id,
                    "customer abandoned an assigned request");
                let facts = slot
                    .facts
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .unwrap_or(RoutedFacts {
                        frustration_level: FrustrationLevel::Low,
                        complexity: Complexity::Low,
                        priority: Priority::Medium,
                    });
                let minutes = minutes_since(&slot);
                let _ = self.state.directory.update_on_completion(
                    &agent_id,
                    &CompletionOutcome {
                        frustration_level: FrustrationLevel::Low,
                        complexity: Complexity::Low,
                        escalated: false,
                        first_contact_resolution: false,
                        satisfaction_rating: None,
                        resolution_minutes: minutes,
                    },
                );
                self.state
                    .queue
                    .record_service_time(facts.priority, minutes * 60.0, &config.queue);
                self.state
                    .completed
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(request_id);
                dispatch_to_agent(&self.state, &agent_id);
            }
        }
        slot.update_view(|v| {
            v.status = WorkflowStatus::Abandoned;
            v.queue_position = None;
            v.estimated_assignment_at = None;
        });
        refresh_active_agents(&self.state);
    }

    /// Report a human-handled completion. Repeat calls are no-ops.
    ///
    /// # Errors
    ///
    /// [`HandoffError::NotFound`] for an unknown request;
    /// [`HandoffError::Validation`] when the request has no assignment.
    pub fn human_complete(
        &self,
        request_id: Uuid,
        satisfaction_rating: f64,
        escalated: bool,
    ) -> Result<()> {
        {
            let completed = self
                .state
                .completed
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if completed.contains(&request_id) {
                return Ok(());
            }
        }

        let slot = self
            .state
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&request_id)
            .cloned()
            .ok_or_else(|| HandoffError::NotFound(request_id.to_string()))?;

        let view = slot.view();
        let agent_id = view
            .assigned_agent_id
            .clone()
            .ok_or_else(|| HandoffError::Validation {
                reason: "request has no assigned agent".into(),
            })?;

        let facts = slot
            .facts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or(RoutedFacts {
                frustration_level: FrustrationLevel::Low,
                complexity: Complexity::Medium,
                priority: Priority::Medium,
            });
        let minutes = minutes_since(&slot);

        self.state.directory.update_on_completion(
            &agent_id,
            &CompletionOutcome {
                frustration_level: facts.frustration_level,
                complexity: facts.complexity,
                escalated,
                first_contact_resolution: !escalated,
                satisfaction_rating: Some(satisfaction_rating),
                resolution_minutes: minutes,
            },
        )?;

        let config = self.state.config.current();
        self.state
            .queue
            .record_service_time(facts.priority, minutes * 60.0, &config.queue);
        self.state
            .completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request_id);

        info!(
            request_id = %request_id,
            agent_id = %agent_id,
            satisfaction = satisfaction_rating,
            escalated,
            "human completion recorded"
        );

        // The freed agent immediately pulls waiting work.
        dispatch_to_agent(&self.state, &agent_id);
        refresh_active_agents(&self.state);
        Ok(())
    }

    /// Control-surface counters.
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            in_flight: self.state.in_flight.load(Ordering::SeqCst),
            queued_by_priority: self.state.queue.len_by_priority(),
            agent_status: self.state.directory.status_counts(),
            draining: self.state.draining.load(Ordering::SeqCst),
        }
    }

    /// Validate and hot-swap the configuration. Scoring passes already
    /// running keep the config they sampled.
    ///
    /// # Errors
    ///
    /// Returns the validation failure; the active config is untouched.
    pub fn reload_config(&self, config: Config) -> Result<()> {
        self.state.config.swap(config)?;
        let current = self.state.config.current();
        let pipeline = Arc::new(Pipeline::new(
            current,
            self.state.generator.clone(),
            self.state.store.clone(),
        ));
        *self
            .state
            .pipeline
            .write()
            .unwrap_or_else(|e| e.into_inner()) = pipeline;
        Ok(())
    }

    /// Stop accepting submits and wait for in-flight requests to finish.
    pub async fn drain(&self) {
        self.state.draining.store(true, Ordering::SeqCst);
        while self.state.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        self.state.shutdown.cancel();
        info!("drain complete");
    }
}

/// Current view, refreshed with the live queue position when waiting.
fn snapshot_view(state: &Arc<ServiceState>, request_id: Uuid) -> Option<RequestView> {
    let slot = state
        .registry
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&request_id)
        .cloned()?;
    let mut view = slot.view();
    if view.status == WorkflowStatus::Queued
        && let Some((position, estimate)) = state.queue.position_of(request_id)
    {
        view.queue_position = Some(position);
        view.estimated_assignment_at = estimate;
    }
    Some(view)
}

fn minutes_since(slot: &RequestSlot) -> f64 {
    let assigned_at = slot
        .assigned_at
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .unwrap_or_else(Utc::now);
    (Utc::now() - assigned_at).num_seconds().max(0) as f64 / 60.0
}

/// Count of agents able to take work right now; feeds the queue's wait
/// estimator.
fn refresh_active_agents(state: &Arc<ServiceState>) {
    let config = state.config.current();
    let active = state
        .directory
        .snapshot_all()
        .iter()
        .filter(|s| {
            matches!(s.state.status, AgentStatus::Available | AgentStatus::Busy)
                && s.state.current_workload < s.profile.max_concurrent_cases
        })
        .count();
    state.queue.set_active_agents(active.max(1), &config.queue);
}

/// Drive one request end to end. Owns the Request for the whole run.
async fn run_request(state: &Arc<ServiceState>, slot: &Arc<RequestSlot>, mut request: Request) {
    let pipeline = state
        .pipeline
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    let request_id = request.request_id;

    let outcome = pipeline.run(&mut request, &slot.cancel).await;

    match outcome {
        Ok(PipelineOutcome::Delivered) => {
            // A cancel that raced the last stage wins: the result is
            // discarded, not delivered.
            if slot.cancel.is_cancelled() {
                slot.update_view(|v| {
                    if !v.status.is_terminal() {
                        v.status = WorkflowStatus::Abandoned;
                    }
                });
            } else {
                slot.update_view(|v| {
                    v.status = WorkflowStatus::Delivered;
                    v.final_response = request.final_response.clone();
                });
            }
            export_telemetry(&request);
        }
        Ok(PipelineOutcome::NeedsHuman(demand)) => {
            let config = pipeline.config().clone();
            let facts = RoutedFacts {
                frustration_level: demand.frustration_level,
                complexity: demand.complexity,
                priority: demand.priority,
            };
            *slot.facts.lock().unwrap_or_else(|e| e.into_inner()) = Some(facts);

            let routing_deadline =
                std::time::Duration::from_secs(config.pipeline.routing_deadline_secs);
            let routed = tokio::time::timeout(routing_deadline, async {
                select_agent(&state.directory, &demand, &config, request_id)
            })
            .await
            .unwrap_or(RouteOutcome::Enqueue {
                strategy: "routing_timeout".into(),
            });

            match routed {
                RouteOutcome::Assigned(decision) => {
                    let agent_id = decision.assigned_agent_id.clone();
                    request.routing_decision = Some(decision);
                    request.workflow_status = WorkflowStatus::Assigned;
                    *slot.assigned_at.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(Utc::now());
                    slot.update_view(|v| {
                        v.status = WorkflowStatus::Assigned;
                        v.assigned_agent_id = agent_id;
                    });
                    refresh_active_agents(state);
                    export_telemetry(&request);
                }
                RouteOutcome::Enqueue { strategy } => {
                    enqueue_request(state, slot, &mut request, &demand, strategy, &config);
                }
            }
        }
        Err(HandoffError::Abandoned) => {
            slot.update_view(|v| {
                if !v.status.is_terminal() {
                    v.status = WorkflowStatus::Abandoned;
                }
            });
            export_telemetry(&request);
        }
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "pipeline failed");
            slot.update_view(|v| {
                v.status = WorkflowStatus::Failed;
                v.error = Some("we could not process your request; please try again".into());
            });
            export_telemetry(&request);
        }
    }
}

fn enqueue_request(
    state: &Arc<ServiceState>,
    slot: &Arc<RequestSlot>,
    request: &mut Request,
    demand: &crate::routing::RoutingDemand,
    strategy: String,
    config: &Arc<Config>,
) {
    let enqueue = EnqueueRequest {
        request_id: request.request_id,
        priority: demand.priority,
        complexity: demand.complexity,
        required_skills: demand.required_skills.clone(),
        frustration_level: demand.frustration_level,
    };
    match state.queue.enqueue(enqueue, &config.queue) {
        Ok(entry) => {
            request.routing_decision = Some(RoutingDecision {
                assigned_agent_id: None,
                strategy,
                required_skills: demand.required_skills.clone(),
                priority: demand.priority,
                complexity: demand.complexity,
                match_score: 0.0,
                confidence: 0.0,
                fallback_rank: vec![],
            });
            request.workflow_status = WorkflowStatus::Queued;
            slot.update_view(|v| {
                v.status = WorkflowStatus::Queued;
                v.queue_position = Some(entry.position);
                v.estimated_assignment_at = entry.estimated_assignment_at;
            });
            export_telemetry(request);
        }
        Err(HandoffError::QueueFull { .. }) => {
            slot.update_view(|v| {
                v.status = WorkflowStatus::Failed;
                v.error = Some("rejected_backpressure".into());
            });
            export_telemetry(request);
        }
        Err(err) => {
            warn!(request_id = %request.request_id, error = %err, "enqueue failed");
            slot.update_view(|v| {
                v.status = WorkflowStatus::Failed;
                v.error = Some("we could not process your request; please try again".into());
            });
            export_telemetry(request);
        }
    }
}

/// Hand the best eligible waiting entry to a freed agent, repeating
/// while the agent has capacity and eligible work exists.
fn dispatch_to_agent(state: &Arc<ServiceState>, agent_id: &str) {
    let config = state.config.current();
    loop {
        let Some(snapshot) = state.directory.snapshot_one(agent_id) else {
            return;
        };
        if snapshot.state.current_workload >= snapshot.profile.max_concurrent_cases
            || !matches!(
                snapshot.state.status,
                AgentStatus::Available | AgentStatus::Busy
            )
        {
            return;
        }
        let Some(entry) = peek_for_agent(&state.queue, &snapshot, &config) else {
            return;
        };

        let Ok(token) = state.directory.claim_for_assignment(agent_id) else {
            return;
        };
        if state
            .directory
            .commit_assignment(&token, entry.request_id)
            .is_err()
        {
            return;
        }
        let Some(taken) = state.queue.take(entry.entry_id, agent_id, &config.queue) else {
            // Entry vanished between peek and commit.
            warn!(agent_id, "queue entry gone before take");
            return;
        };

        if let Some(slot) = state
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&taken.request_id)
            .cloned()
        {
            *slot.assigned_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
            slot.update_view(|v| {
                v.status = WorkflowStatus::Assigned;
                v.assigned_agent_id = Some(agent_id.to_string());
                v.queue_position = None;
                v.estimated_assignment_at = None;
            });
        }
        info!(
            request_id = %taken.request_id,
            agent_id,
            "queued request dispatched to freed agent"
        );
    }
}

/// Log the request's accounting at termination; the content itself is
/// discarded with the Request.
fn export_telemetry(request: &Request) {
    info!(
        request_id = %request.request_id,
        status = ?request.workflow_status,
        tokens = request.telemetry.tokens_total,
        cost = request.telemetry.cost_total,
        stages = request.telemetry.stage_durations_ms.len(),
        errors = request.telemetry.errors.len(),
        "request telemetry"
    );
}
