//! polynet
//!
//! Property prediction for cross-linked polymer networks:
//! - Trained neural-network surrogate (candle)
//! - Feature and target scaling with versioned artifacts
//! - Bounded-concurrency simulation ensembles
//! - Mean ± error aggregation and formatting

pub mod codec;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod params;
pub mod report;
pub mod surrogate;
pub mod telemetry;

// Re-exports for convenience
pub use config::{EnsembleSettings, PredictorConfig, SimulatorSettings};
pub use ensemble::{EnsembleOrchestrator, EnsembleOutcome, ExternalSimulator, Simulator};
pub use error::{PredictError, PredictResult};
pub use params::{ParameterRecord, PresetLibrary, RecordInput};
pub use report::{aggregate, format_value, format_value_with_error, AggregatedResult, RunResult, ValueWithError};
pub use surrogate::{MlpRegressor, Regressor, SurrogatePrediction, SurrogatePredictor};
