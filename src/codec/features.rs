//! Feature derivation
//!
//! Maps a [`ParameterRecord`] to the ordered feature vector the surrogate was
//! trained on, and maps raw model outputs back to named quantities.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PredictError, PredictResult};
use crate::params::ParameterRecord;

/// Every attribute the codec knows how to derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    StoichiometricImbalance,
    Conversion,
    B2,
    PlateauModulus,
    Temperature,
    Density,
    MeanBeadDistance,
    BeadMass,
    MwBifunctional,
    MwMonofunctional,
    MwCrosslinks,
    MwSolvent,
    FunctionalityPerCrosslink,
    FunctionalizeDiscrete,
    RemoveSoluble,
    SolventFraction,
    MonofunctionalFraction,
    BifunctionalFraction,
    CrosslinkFraction,
    SamplingCutoff,
}

impl Feature {
    pub const ALL: [Feature; 20] = [
        Feature::StoichiometricImbalance,
        Feature::Conversion,
        Feature::B2,
        Feature::PlateauModulus,
        Feature::Temperature,
        Feature::Density,
        Feature::MeanBeadDistance,
        Feature::BeadMass,
        Feature::MwBifunctional,
        Feature::MwMonofunctional,
        Feature::MwCrosslinks,
        Feature::MwSolvent,
        Feature::FunctionalityPerCrosslink,
        Feature::FunctionalizeDiscrete,
        Feature::RemoveSoluble,
        Feature::SolventFraction,
        Feature::MonofunctionalFraction,
        Feature::BifunctionalFraction,
        Feature::CrosslinkFraction,
        Feature::SamplingCutoff,
    ];

    /// Column name in the training data.
    pub fn name(&self) -> &'static str {
        match self {
            Feature::StoichiometricImbalance => "r",
            Feature::Conversion => "p",
            Feature::B2 => "b2",
            Feature::PlateauModulus => "ge_1 [MPa]",
            Feature::Temperature => "temperature [K]",
            Feature::Density => "density [g/cm^3]",
            Feature::MeanBeadDistance => "param's <b> [nm]",
            Feature::BeadMass => "param's Mw [kg/mol]",
            Feature::MwBifunctional => "Mw [kg/mol]",
            Feature::MwMonofunctional => "Mw [kg/mol] monofunctional chains",
            Feature::MwCrosslinks => "Mw [kg/mol] xlink chains",
            Feature::MwSolvent => "Mw [kg/mol] solvent chains",
            Feature::FunctionalityPerCrosslink => "functionality_per_xlink_chain",
            Feature::FunctionalizeDiscrete => "functionalize_discrete",
            Feature::RemoveSoluble => "remove_wsol",
            Feature::SolventFraction => "solvent_fraction_of_beads",
            Feature::MonofunctionalFraction => "monofunctional_fraction_of_beads",
            Feature::BifunctionalFraction => "bifunctional_fraction_of_beads",
            Feature::CrosslinkFraction => "crosslink_fraction_of_beads",
            Feature::SamplingCutoff => "entanglement_sampling_cutoff [nm]",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Flags coerced to 0/1; the input scaler leaves these unstandardized.
    pub fn is_binary(&self) -> bool {
        matches!(self, Feature::FunctionalizeDiscrete | Feature::RemoveSoluble)
    }

    fn derive(&self, record: &ParameterRecord) -> PredictResult<f64> {
        let input = record.input();
        let bead_mass = record.bead_mass_kg_per_mol();
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let fraction = |beads: u64| -> PredictResult<f64> {
            let total = record.n_total_beads();
            if total == 0 {
                return Err(PredictError::domain(
                    "bead fractions are undefined for a system without chain beads",
                ));
            }
            Ok(beads as f64 / total as f64)
        };

        let value = match self {
            Feature::StoichiometricImbalance => record.stoichiometric_imbalance(),
            Feature::Conversion => record.crosslink_conversion(),
            Feature::B2 => record.b2()?,
            Feature::PlateauModulus => record.plateau_modulus_mpa(),
            Feature::Temperature => record.temperature_k(),
            // kg/cm³ -> g/cm³
            Feature::Density => record.density_kg_per_cm3() * 1e3,
            Feature::MeanBeadDistance => record.mean_bead_distance_nm(),
            Feature::BeadMass => bead_mass,
            Feature::MwBifunctional => input.n_beads_bifunctional as f64 * bead_mass,
            Feature::MwMonofunctional => input.n_beads_monofunctional as f64 * bead_mass,
            Feature::MwCrosslinks => input.n_beads_xlinks as f64 * bead_mass,
            Feature::MwSolvent => input.n_beads_zerofunctional as f64 * bead_mass,
            Feature::FunctionalityPerCrosslink => record.crosslink_functionality() as f64,
            Feature::FunctionalizeDiscrete => flag(input.functionalize_discrete),
            Feature::RemoveSoluble => flag(input.extract_solvent_before_measurement),
            Feature::SolventFraction => fraction(record.n_beads_solvent())?,
            Feature::MonofunctionalFraction => fraction(record.n_beads_monofunctional_total())?,
            Feature::BifunctionalFraction => fraction(record.n_beads_bifunctional_total())?,
            Feature::CrosslinkFraction => fraction(record.n_beads_crosslinks())?,
            Feature::SamplingCutoff => record.entanglement_sampling_cutoff_nm(),
        };
        Ok(value)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered numeric features, paired with the names that fixed their order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|i| self.values[i])
    }
}

/// Derives the registered feature list from parameter records.
#[derive(Debug, Clone)]
pub struct FeatureCodec {
    features: Vec<Feature>,
}

impl FeatureCodec {
    /// Fails before any numeric work if a configured name is not derivable.
    pub fn new<S: AsRef<str>>(feature_names: &[S]) -> PredictResult<Self> {
        if feature_names.is_empty() {
            return Err(PredictError::config("feature list is empty"));
        }
        let features = feature_names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                Feature::from_name(name)
                    .ok_or_else(|| PredictError::config(format!("unregistered feature name '{}'", name)))
            })
            .collect::<PredictResult<Vec<_>>>()?;
        Ok(Self { features })
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Positions of the 0/1 flag features within the vector.
    pub fn binary_indices(&self) -> Vec<usize> {
        self.features
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_binary())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn encode(&self, record: &ParameterRecord) -> PredictResult<FeatureVector> {
        let values = self
            .features
            .iter()
            .map(|f| f.derive(record))
            .collect::<PredictResult<Vec<_>>>()?;
        Ok(FeatureVector {
            names: self.features.iter().map(|f| f.name().to_string()).collect(),
            values,
        })
    }
}

/// One entry of the result-key translation table: short key -> output axis.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResultKey {
    pub key: String,
    pub label: String,
}

impl ResultKey {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self { key: key.into(), label: label.into() }
    }
}

/// Maps output positions to named quantities. Keys whose label is not one of
/// the output axes decode to `None` instead of failing.
pub fn decode(
    raw: &[f64],
    output_axes: &[String],
    translation: &[ResultKey],
) -> PredictResult<BTreeMap<String, Option<f64>>> {
    if raw.len() != output_axes.len() {
        return Err(PredictError::Inference(format!(
            "model produced {} outputs for {} configured axes",
            raw.len(),
            output_axes.len()
        )));
    }
    Ok(translation
        .iter()
        .map(|rk| {
            let value = output_axes.iter().position(|axis| axis == &rk.label).map(|i| raw[i]);
            (rk.key.clone(), value)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{pdms, pdms_input, ParameterRecord};
    use approx::assert_relative_eq;

    #[test]
    fn test_every_feature_name_round_trips() {
        for feature in Feature::ALL {
            assert_eq!(Feature::from_name(feature.name()), Some(feature));
        }
        assert_eq!(Feature::from_name("not a feature"), None);
    }

    #[test]
    fn test_unregistered_name_fails_fast() {
        let err = FeatureCodec::new(&["r", "p", "shoe size"]).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("shoe size"));
        assert!(FeatureCodec::new::<&str>(&[]).unwrap_err().is_config());
    }

    #[test]
    fn test_encode_order_and_values() {
        let codec = FeatureCodec::new(&[
            "p",
            "r",
            "density [g/cm^3]",
            "functionalize_discrete",
            "Mw [kg/mol]",
            "solvent_fraction_of_beads",
            "crosslink_fraction_of_beads",
        ])
        .unwrap();
        let v = codec.encode(&pdms()).unwrap();
        assert_eq!(v.len(), 7);
        assert_eq!(v.values[0], 0.95);
        assert_eq!(v.values[1], 1.0);
        assert_relative_eq!(v.values[2], 0.965, max_relative = 1e-12);
        assert_eq!(v.values[3], 1.0);
        assert_relative_eq!(v.values[4], 50.0 * 0.162, max_relative = 1e-12);
        assert_relative_eq!(v.get("solvent_fraction_of_beads").unwrap(), 200.0 / 52_500.0);
        assert_relative_eq!(v.get("crosslink_fraction_of_beads").unwrap(), 525.0 / 52_500.0);
        assert_eq!(codec.binary_indices(), vec![3]);
    }

    #[test]
    fn test_encode_zero_beads_is_domain_error() {
        let mut input = pdms_input();
        input.n_beads_bifunctional = 0;
        input.n_beads_monofunctional = 0;
        let record = ParameterRecord::new(input).unwrap();
        let codec = FeatureCodec::new(&["bifunctional_fraction_of_beads"]).unwrap();
        assert!(codec.encode(&record).unwrap_err().is_domain());
    }

    #[test]
    fn test_decode_missing_axis_is_none() {
        let axes = vec!["G".to_string(), "W_sol".to_string()];
        let table = vec![
            ResultKey::new("g_eq", "G"),
            ResultKey::new("w_soluble", "W_sol"),
            ResultKey::new("w_dangling", "W_dang"),
        ];
        let decoded = decode(&[1.5, 0.1], &axes, &table).unwrap();
        assert_eq!(decoded["g_eq"], Some(1.5));
        assert_eq!(decoded["w_soluble"], Some(0.1));
        assert_eq!(decoded["w_dangling"], None);

        assert!(matches!(
            decode(&[1.0], &axes, &table),
            Err(PredictError::Inference(_))
        ));
    }
}
