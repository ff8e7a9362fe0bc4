pub mod evaluation_service;
pub mod state_machine;

pub use evaluation_service::{CycleReport, EvaluationService};
pub use state_machine::{evaluate, AlertPolicy, AlertTracker, Decision, ReactionKind};
