pub mod alert_gate;
pub mod baseline;
pub mod collectors;
pub mod engine;
pub mod notifier;
pub mod orchestrator;
pub mod pattern_engine;
pub mod phase_classifier;
pub mod risk_cache;
pub mod risk_engine;
pub mod similarity;
pub mod supervisor;

pub use collectors::{Collector, JsonFeedCollector};
pub use engine::AssessmentEngine;
pub use notifier::{LogNotifier, Notifier, WebhookNotifier};
pub use orchestrator::{Orchestrator, SnapshotUpdate};
pub use risk_engine::{LlmReasoningClient, ReasoningClient, ReasoningContext, RiskEngine};
pub use supervisor::{OwnerSession, Supervisor};
