//! Polymer presets
//!
//! Material constants for well-known polymers, stored as the JSON map emitted
//! by the preset generator: `name -> { density, temperature, ... }` with every
//! value already in base units.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::{PredictError, PredictResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolymerPreset {
    /// kg/cm³
    pub density: f64,
    /// K
    pub temperature: f64,
    /// MPa
    pub plateau_modulus: f64,
    /// nm²
    pub mean_squared_bead_distance: f64,
    /// kg/mol
    pub bead_mass: f64,
    /// nm
    pub entanglement_sampling_cutoff: f64,
}

impl PolymerPreset {
    /// The preset as request fields, units spelled out.
    fn fields(&self) -> [(&'static str, String); 6] {
        [
            ("density", format!("{} kg/cm^3", self.density)),
            ("temperature", format!("{} K", self.temperature)),
            ("plateau_modulus", format!("{} MPa", self.plateau_modulus)),
            ("mean_squared_bead_distance", format!("{} nm^2", self.mean_squared_bead_distance)),
            ("bead_mass", format!("{} kg/mol", self.bead_mass)),
            ("entanglement_sampling_cutoff", format!("{} nm", self.entanglement_sampling_cutoff)),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct PresetLibrary {
    presets: BTreeMap<String, PolymerPreset>,
}

impl PresetLibrary {
    pub fn from_json(json: &str) -> PredictResult<Self> {
        let presets: BTreeMap<String, PolymerPreset> = serde_json::from_str(json)?;
        Ok(Self { presets })
    }

    pub fn load(path: impl AsRef<Path>) -> PredictResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PredictError::config(format!("cannot read presets {}: {}", path.display(), e))
        })?;
        let library = Self::from_json(&content)?;
        debug!("Loaded {} polymer presets from {}", library.len(), path.display());
        Ok(library)
    }

    pub fn get(&self, name: &str) -> Option<&PolymerPreset> {
        self.presets.get(name.trim())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Fills material fields missing from a JSON request with the preset named
    /// by its `polymer_name`. Fields present in the request always win.
    /// Returns whether a preset was applied.
    pub fn fill_request(&self, request: &mut Map<String, Value>) -> PredictResult<bool> {
        let Some(name) = request.get("polymer_name").and_then(Value::as_str) else {
            return Ok(false);
        };
        let preset = self
            .get(name)
            .ok_or_else(|| PredictError::domain(format!("unknown polymer preset '{}'", name)))?;

        for (field, value) in preset.fields() {
            request.entry(field).or_insert(Value::String(value));
        }
        Ok(true)
    }
}
