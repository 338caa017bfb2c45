//! Fitted feature and target scalers
//!
//! Both transforms are fitted offline; this crate only applies and reverses
//! them. They are loaded from a self-describing JSON artifact.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::error::{PredictError, PredictResult};

/// Version of the scaler artifact layout understood by this crate.
pub const SCALER_SCHEMA_VERSION: u32 = 1;

/// Per-column standardization `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    fn validate(&self, what: &str) -> PredictResult<()> {
        if self.mean.len() != self.scale.len() {
            return Err(PredictError::config(format!(
                "{} scaler has {} means but {} scales",
                what,
                self.mean.len(),
                self.scale.len()
            )));
        }
        if let Some(bad) = self.scale.iter().find(|s| !s.is_finite() || **s == 0.0) {
            return Err(PredictError::config(format!("{} scaler has invalid scale {}", what, bad)));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(PredictError::config(format!("{} scaler has a non-finite mean", what)));
        }
        Ok(())
    }

    fn forward(&self, column: usize, x: f64) -> f64 {
        (x - self.mean[column]) / self.scale[column]
    }

    fn inverse(&self, column: usize, z: f64) -> f64 {
        z * self.scale[column] + self.mean[column]
    }
}

fn check_indices(what: &str, indices: &[usize], width: usize) -> PredictResult<()> {
    let mut seen = BTreeSet::new();
    for &i in indices {
        if i >= width {
            return Err(PredictError::config(format!(
                "{} index {} out of range for {} columns",
                what, i, width
            )));
        }
        if !seen.insert(i) {
            return Err(PredictError::config(format!("{} index {} listed twice", what, i)));
        }
    }
    Ok(())
}

fn check_width(what: &str, values: &[f64], expected: usize) -> PredictResult<()> {
    if values.len() != expected {
        return Err(PredictError::Inference(format!(
            "{} expects {} columns, got {}",
            what,
            expected,
            values.len()
        )));
    }
    Ok(())
}

/// Leaves binary columns untouched and standardizes the continuous ones.
/// The scaled layout puts the binary block first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputScaler {
    pub binary_indices: Vec<usize>,
    pub continuous_indices: Vec<usize>,
    /// Fitted on the continuous columns, in `continuous_indices` order.
    pub standard: StandardScaler,
}

impl InputScaler {
    /// Continuous columns default to every column that is not binary.
    pub fn new(
        width: usize,
        binary_indices: Vec<usize>,
        continuous_indices: Option<Vec<usize>>,
        standard: StandardScaler,
    ) -> PredictResult<Self> {
        let continuous_indices = continuous_indices.unwrap_or_else(|| {
            (0..width).filter(|i| !binary_indices.contains(i)).collect()
        });
        let scaler = Self { binary_indices, continuous_indices, standard };
        scaler.validate()?;
        if scaler.width() != width {
            return Err(PredictError::config(format!(
                "input scaler covers {} columns, expected {}",
                scaler.width(),
                width
            )));
        }
        Ok(scaler)
    }

    pub fn width(&self) -> usize {
        self.binary_indices.len() + self.continuous_indices.len()
    }

    pub fn validate(&self) -> PredictResult<()> {
        let width = self.width();
        let all: Vec<usize> = self
            .binary_indices
            .iter()
            .chain(self.continuous_indices.iter())
            .copied()
            .collect();
        check_indices("input scaler", &all, width)?;
        self.standard.validate("input")?;
        if self.standard.len() != self.continuous_indices.len() {
            return Err(PredictError::config(format!(
                "input scaler fitted on {} columns but {} are continuous",
                self.standard.len(),
                self.continuous_indices.len()
            )));
        }
        Ok(())
    }

    pub fn scale(&self, features: &[f64]) -> PredictResult<Vec<f64>> {
        check_width("input scaler", features, self.width())?;
        let binary = self.binary_indices.iter().map(|&i| features[i]);
        let continuous = self
            .continuous_indices
            .iter()
            .enumerate()
            .map(|(col, &i)| self.standard.forward(col, features[i]));
        Ok(binary.chain(continuous).collect())
    }

    /// Restores the original column order; only the continuous block is
    /// de-standardized.
    pub fn unscale(&self, scaled: &[f64]) -> PredictResult<Vec<f64>> {
        check_width("input scaler", scaled, self.width())?;
        let n_binary = self.binary_indices.len();
        let mut out = vec![0.0; self.width()];
        for (pos, &i) in self.binary_indices.iter().enumerate() {
            out[i] = scaled[pos];
        }
        for (col, &i) in self.continuous_indices.iter().enumerate() {
            out[i] = self.standard.inverse(col, scaled[n_binary + col]);
        }
        Ok(out)
    }
}

/// log / log1p on configured targets, then standardization of every target
/// not excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetScaler {
    pub width: usize,
    #[serde(default)]
    pub log_indices: Vec<usize>,
    #[serde(default)]
    pub log1p_indices: Vec<usize>,
    #[serde(default)]
    pub exclude_indices: Vec<usize>,
    /// Fitted on the non-excluded targets in ascending index order.
    pub standard: StandardScaler,
}

impl TargetScaler {
    pub fn validate(&self) -> PredictResult<()> {
        check_indices("log target", &self.log_indices, self.width)?;
        check_indices("log1p target", &self.log1p_indices, self.width)?;
        check_indices("excluded target", &self.exclude_indices, self.width)?;
        if let Some(i) = self.log_indices.iter().find(|i| self.log1p_indices.contains(i)) {
            return Err(PredictError::config(format!(
                "target {} is configured for both log and log1p",
                i
            )));
        }
        self.standard.validate("target")?;
        let scaled = self.scaled_indices().len();
        if self.standard.len() != scaled {
            return Err(PredictError::config(format!(
                "target scaler fitted on {} columns but {} are scaled",
                self.standard.len(),
                scaled
            )));
        }
        Ok(())
    }

    fn scaled_indices(&self) -> Vec<usize> {
        (0..self.width).filter(|i| !self.exclude_indices.contains(i)).collect()
    }

    pub fn scale(&self, targets: &[f64]) -> PredictResult<Vec<f64>> {
        check_width("target scaler", targets, self.width)?;
        let mut out = targets.to_vec();
        for &i in &self.log_indices {
            if out[i] <= 0.0 {
                return Err(PredictError::domain(format!(
                    "log of non-positive target {} at index {}",
                    out[i], i
                )));
            }
            out[i] = out[i].ln();
        }
        for &i in &self.log1p_indices {
            if out[i] <= -1.0 {
                return Err(PredictError::domain(format!(
                    "log1p of target {} at index {} is undefined",
                    out[i], i
                )));
            }
            out[i] = out[i].ln_1p();
        }
        for (col, i) in self.scaled_indices().into_iter().enumerate() {
            out[i] = self.standard.forward(col, out[i]);
        }
        Ok(out)
    }

    pub fn unscale(&self, scaled: &[f64]) -> PredictResult<Vec<f64>> {
        check_width("target scaler", scaled, self.width)?;
        let mut out = scaled.to_vec();
        for (col, i) in self.scaled_indices().into_iter().enumerate() {
            out[i] = self.standard.inverse(col, out[i]);
        }
        for &i in &self.log_indices {
            out[i] = out[i].exp();
        }
        for &i in &self.log1p_indices {
            out[i] = out[i].exp_m1();
        }
        Ok(out)
    }
}

/// On-disk scaler artifact, versioned alongside the trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerArtifact {
    pub schema_version: u32,
    pub feature_names: Vec<String>,
    pub output_axes: Vec<String>,
    pub input: InputScaler,
    pub target: TargetScaler,
}

impl ScalerArtifact {
    pub fn load(path: impl AsRef<Path>) -> PredictResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PredictError::config(format!("scaler artifact {} unreadable: {}", path.display(), e))
        })?;
        let artifact: ScalerArtifact = serde_json::from_str(&content).map_err(|e| {
            PredictError::config(format!("scaler artifact {} malformed: {}", path.display(), e))
        })?;
        artifact.validate()?;
        info!(
            "Loaded scaler artifact {} ({} features, {} targets)",
            path.display(),
            artifact.feature_names.len(),
            artifact.output_axes.len()
        );
        Ok(artifact)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PredictResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> PredictResult<()> {
        if self.schema_version != SCALER_SCHEMA_VERSION {
            return Err(PredictError::config(format!(
                "unsupported scaler schema version {} (expected {})",
                self.schema_version, SCALER_SCHEMA_VERSION
            )));
        }
        self.input.validate()?;
        self.target.validate()?;
        if self.input.width() != self.feature_names.len() {
            return Err(PredictError::config(format!(
                "input scaler covers {} columns for {} feature names",
                self.input.width(),
                self.feature_names.len()
            )));
        }
        if self.target.width != self.output_axes.len() {
            return Err(PredictError::config(format!(
                "target scaler covers {} columns for {} output axes",
                self.target.width,
                self.output_axes.len()
            )));
        }
        Ok(())
    }

    /// The artifact must have been fitted on exactly the configured columns,
    /// in the configured order.
    pub fn ensure_matches(&self, feature_names: &[String], output_axes: &[String]) -> PredictResult<()> {
        if self.feature_names != feature_names {
            return Err(PredictError::config(format!(
                "scaler was fitted on features {:?}, configuration lists {:?}",
                self.feature_names, feature_names
            )));
        }
        if self.output_axes != output_axes {
            return Err(PredictError::config(format!(
                "scaler was fitted on outputs {:?}, configuration lists {:?}",
                self.output_axes, output_axes
            )));
        }
        Ok(())
    }
}
