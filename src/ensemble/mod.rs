//! Ensemble Module
//!
//! Repeated stochastic simulation with partial-failure tolerance.

mod orchestrator;
mod simulator;

pub use orchestrator::{EnsembleOrchestrator, EnsembleOutcome, RunFailure};
pub use simulator::{ExternalSimulator, Simulator};
