//! Error taxonomy
//!
//! Configuration errors are raised while loading artifacts and are never
//! retried. Domain errors fail a single request. Simulation errors only ever
//! describe one lost ensemble member.

use thiserror::Error;

pub type PredictResult<T> = std::result::Result<T, PredictError>;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("domain error: {0}")]
    Domain(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("simulation run failed: {0}")]
    Simulation(String),

    #[error("no successful runs out of {requested} requested")]
    NoSuccessfulRuns { requested: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl PredictError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    pub fn simulation(msg: impl Into<String>) -> Self {
        Self::Simulation(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Domain errors fail the request but say nothing about the artifacts.
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(_) | Self::NoSuccessfulRuns { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Simulation(_))
    }
}

impl From<candle_core::Error> for PredictError {
    fn from(err: candle_core::Error) -> Self {
        Self::Inference(err.to_string())
    }
}
