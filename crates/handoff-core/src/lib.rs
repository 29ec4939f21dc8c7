//! Core engine for the handoff support orchestrator.
//!
//! The pipeline drives each customer [`Request`](handoff_types::request::Request)
//! through six stages:
//!
//! ```text
//! Automation -> Chatbot -> QualityGate -> Frustration -> Context -> Routing
//! ```
//!
//! with one short-circuit: CRITICAL frustration or a HUMAN_INTERVENTION
//! quality verdict skips any not-yet-run Chatbot/Quality work and jumps to
//! context aggregation and human routing.
//!
//! Module map:
//!
//! - [`stages`] -- the five analysis stages.
//! - [`routing`] -- weighted scoring, hard filters, and selection.
//! - [`directory`] -- the agent directory with per-agent exclusive state.
//! - [`queue`] -- the globally ordered wait queue.
//! - [`stress`] -- the background stress-recalculation tick.
//! - [`pipeline`] -- the per-request stage driver.
//! - [`service`] -- the orchestrator: submit / cancel / complete / drain.
//! - [`collaborators`] -- the read-only context-store seam.

pub mod collaborators;
pub mod config_handle;
pub mod directory;
pub mod pipeline;
pub mod queue;
pub mod routing;
pub mod service;
pub mod stages;
pub mod stress;

pub use config_handle::ConfigHandle;
pub use directory::AgentDirectory;
pub use queue::WaitQueue;
pub use service::{Orchestrator, RequestHandle};
