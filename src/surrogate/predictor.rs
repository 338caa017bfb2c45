//! Surrogate Predictor
//!
//! encode -> scale -> forward -> unscale -> decode, then composites.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::network::{MlpRegressor, Regressor};
use crate::codec::{composite, decode, FeatureCodec, ResultKey, ScalerArtifact};
use crate::config::PredictorConfig;
use crate::error::{PredictError, PredictResult};
use crate::params::ParameterRecord;
use crate::report::format_value;

/// Decoded quantities of one forward pass.
///
/// Translation keys whose label is not an output axis are present with a
/// `None` value. Composite keys are only present when computable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurrogatePrediction {
    pub values: BTreeMap<String, Option<f64>>,
}

impl SurrogatePrediction {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().flatten()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (key, value) in &self.values {
            match value {
                Some(v) => {
                    out.insert(key.clone(), Value::from(*v));
                    out.insert(format!("{}_str", key), Value::from(format_value(*v)));
                }
                None => {
                    out.insert(key.clone(), Value::Null);
                }
            }
        }
        Value::Object(out)
    }
}

pub struct SurrogatePredictor {
    codec: FeatureCodec,
    scalers: ScalerArtifact,
    model: Arc<dyn Regressor>,
    output_axes: Vec<String>,
    result_keys: Vec<ResultKey>,
}

impl SurrogatePredictor {
    /// Loads `final_model_{fit_key}.safetensors` and `scaler_{fit_key}.json`
    /// from the configured artifact directory.
    pub fn load(config: &PredictorConfig) -> PredictResult<Self> {
        config.validate()?;
        let scalers = ScalerArtifact::load(config.scaler_path())?;
        let model = MlpRegressor::load(config.model_path())?;
        let predictor = Self::new(config, Arc::new(model), scalers)?;
        info!("Surrogate predictor ready (fit key {})", config.fit_key());
        Ok(predictor)
    }

    /// Every dimension is checked here so that a mismatched artifact pair
    /// never reaches `predict`.
    pub fn new(
        config: &PredictorConfig,
        model: Arc<dyn Regressor>,
        scalers: ScalerArtifact,
    ) -> PredictResult<Self> {
        let codec = FeatureCodec::new(&config.feature_names)?;
        scalers.validate()?;
        scalers.ensure_matches(&config.feature_names, &config.output_axes)?;

        let mut binary = scalers.input.binary_indices.clone();
        binary.sort_unstable();
        if binary != codec.binary_indices() {
            return Err(PredictError::config(format!(
                "scaler treats columns {:?} as binary, feature list has flags at {:?}",
                binary,
                codec.binary_indices()
            )));
        }
        if model.input_dim() != codec.len() {
            return Err(PredictError::config(format!(
                "model takes {} inputs but {} features are configured",
                model.input_dim(),
                codec.len()
            )));
        }
        if model.output_dim() != config.output_axes.len() {
            return Err(PredictError::config(format!(
                "model yields {} outputs but {} axes are configured",
                model.output_dim(),
                config.output_axes.len()
            )));
        }

        Ok(Self {
            codec,
            scalers,
            model,
            output_axes: config.output_axes.clone(),
            result_keys: config.result_keys.clone(),
        })
    }

    pub fn predict(&self, record: &ParameterRecord) -> PredictResult<SurrogatePrediction> {
        let features = self.codec.encode(record)?;
        let scaled = self.scalers.input.scale(&features.values)?;
        let raw = self.model.forward(&scaled)?;
        if let Some(bad) = raw.iter().find(|v| !v.is_finite()) {
            return Err(PredictError::Inference(format!("model produced non-finite output {}", bad)));
        }
        let targets = self.scalers.target.unscale(&raw)?;
        let mut values = decode(&targets, &self.output_axes, &self.result_keys)?;

        let get = |key: &str| values.get(key).copied().flatten();
        let entangled = composite::entangled(get("g_eq"), get("g_phantom"));
        let backbone = composite::backbone(get("w_dangling"), get("w_soluble"));
        if let Some(v) = entangled {
            values.insert("g_entangled".to_string(), Some(v));
        }
        if let Some(v) = backbone {
            values.insert("w_backbone".to_string(), Some(v));
        }

        debug!("Surrogate prediction for {:?}: {:?}", record.polymer_name(), values);
        Ok(SurrogatePrediction { values })
    }
}
