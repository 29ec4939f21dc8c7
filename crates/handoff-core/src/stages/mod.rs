//! The five analysis stages of the pipeline.
//!
//! Stages: Automation -> Chatbot -> QualityGate -> Frustration -> Context.
//! Each stage reads the [`Request`](handoff_types::request::Request) it
//! owns, writes exactly one stage record, and recovers locally from
//! collaborator failures with a defined degraded output.

pub mod automation;
pub mod chatbot;
pub mod context;
pub mod frustration;
pub mod quality;

pub use automation::AutomationStage;
pub use chatbot::ChatbotStage;
pub use context::ContextStage;
pub use frustration::FrustrationAnalyzer;
pub use quality::QualityGate;
