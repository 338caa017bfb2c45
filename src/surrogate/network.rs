//! Feed-forward regressor
//!
//! A stack of linear layers with ReLU between them, loaded from the
//! safetensors export of the training run.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

use crate::error::{PredictError, PredictResult};

/// A pure function from a fixed-size vector to a fixed-size vector.
/// Shared read-only across workers once constructed.
pub trait Regressor: Send + Sync {
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;
    fn forward(&self, input: &[f64]) -> PredictResult<Vec<f64>>;
}

pub struct MlpRegressor {
    layers: Vec<Linear>,
    input_dim: usize,
    output_dim: usize,
}

fn get_tensor(weights: &HashMap<String, Tensor>, name: &str) -> PredictResult<Tensor> {
    weights
        .get(name)
        .cloned()
        .ok_or_else(|| PredictError::config(format!("weight {} not found", name)))
}

/// `"<prefix>.<index>.weight"` -> `(prefix, index)`
fn layer_slot(name: &str) -> Option<(&str, usize)> {
    let rest = name.strip_suffix(".weight")?;
    let (prefix, index) = rest.rsplit_once('.')?;
    Some((prefix, index.parse().ok()?))
}

impl MlpRegressor {
    pub fn load(path: impl AsRef<Path>) -> PredictResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PredictError::config(format!("model artifact {} not found", path.display())));
        }
        let weights = candle_core::safetensors::load(path, &Device::Cpu).map_err(|e| {
            PredictError::config(format!("model artifact {} unreadable: {}", path.display(), e))
        })?;
        let model = Self::from_weights(&weights)?;
        info!(
            "Loaded surrogate model {} ({} layers, {} -> {})",
            path.display(),
            model.layers.len(),
            model.input_dim,
            model.output_dim
        );
        Ok(model)
    }

    /// Builds the stack from a named weight map. Layers are ordered by their
    /// numeric index; the prefix must be shared by all of them.
    pub fn from_weights(weights: &HashMap<String, Tensor>) -> PredictResult<Self> {
        let mut slots: BTreeMap<usize, String> = BTreeMap::new();
        let mut prefix: Option<&str> = None;
        for name in weights.keys() {
            let Some((p, index)) = layer_slot(name) else { continue };
            match prefix {
                Some(existing) if existing != p => {
                    return Err(PredictError::config(format!(
                        "model artifact mixes layer prefixes '{}' and '{}'",
                        existing, p
                    )));
                }
                _ => prefix = Some(p),
            }
            slots.insert(index, format!("{}.{}", p, index));
        }

        let mut pairs = Vec::with_capacity(slots.len());
        for layer in slots.values() {
            let weight = get_tensor(weights, &format!("{}.weight", layer))?;
            let bias = get_tensor(weights, &format!("{}.bias", layer))?;
            pairs.push((weight, bias));
        }
        Self::from_tensors(pairs)
    }

    /// `(weight [out, in], bias [out])` per layer, input side first.
    pub fn from_tensors(pairs: Vec<(Tensor, Tensor)>) -> PredictResult<Self> {
        if pairs.is_empty() {
            return Err(PredictError::config("model artifact contains no linear layers"));
        }
        let mut layers = Vec::with_capacity(pairs.len());
        let mut input_dim = 0;
        let mut prev_out: Option<usize> = None;
        for (i, (weight, bias)) in pairs.into_iter().enumerate() {
            let (out_dim, in_dim) = weight.dims2().map_err(|e| {
                PredictError::config(format!("layer {} weight is not a matrix: {}", i, e))
            })?;
            let bias_len = bias.dims1().map_err(|e| {
                PredictError::config(format!("layer {} bias is not a vector: {}", i, e))
            })?;
            if bias_len != out_dim {
                return Err(PredictError::config(format!(
                    "layer {} has {} outputs but a bias of length {}",
                    i, out_dim, bias_len
                )));
            }
            match prev_out {
                None => input_dim = in_dim,
                Some(prev) if prev != in_dim => {
                    return Err(PredictError::config(format!(
                        "layer {} expects {} inputs but the previous layer yields {}",
                        i, in_dim, prev
                    )));
                }
                _ => {}
            }
            prev_out = Some(out_dim);
            layers.push(Linear::new(weight.to_dtype(DType::F32)?, Some(bias.to_dtype(DType::F32)?)));
        }
        Ok(Self { layers, input_dim, output_dim: prev_out.unwrap_or(0) })
    }
}

impl Regressor for MlpRegressor {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn forward(&self, input: &[f64]) -> PredictResult<Vec<f64>> {
        if input.len() != self.input_dim {
            return Err(PredictError::Inference(format!(
                "model expects {} inputs, got {}",
                self.input_dim,
                input.len()
            )));
        }
        let data: Vec<f32> = input.iter().map(|&x| x as f32).collect();
        let mut xs = Tensor::from_vec(data, (1, self.input_dim), &Device::Cpu)?;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs)?;
            if i < last {
                xs = xs.relu()?;
            }
        }
        let out = xs.squeeze(0)?.to_vec1::<f32>()?;
        Ok(out.into_iter().map(f64::from).collect())
    }
}
