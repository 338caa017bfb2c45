//! Surrogate Module
//!
//! Trained neural-network stand-in for the physical simulation.

mod network;
mod predictor;

pub use network::{MlpRegressor, Regressor};
pub use predictor::{SurrogatePrediction, SurrogatePredictor};
