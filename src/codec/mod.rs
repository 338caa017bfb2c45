//! Codec Module
//!
//! Bidirectional transform between physical quantities and the normalized
//! vectors consumed and produced by the trained model.

pub mod composite;
mod features;
mod scaler;

pub use features::{decode, Feature, FeatureCodec, FeatureVector, ResultKey};
pub use scaler::{InputScaler, ScalerArtifact, StandardScaler, TargetScaler, SCALER_SCHEMA_VERSION};
