use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::units::{Area, Density, Length, Modulus, MolarMass, Temperature};
use crate::error::{PredictError, PredictResult};

/// Avogadro's number as used by the reference parameter tables.
const AVOGADRO: f64 = 6.022e23;

/// 1 kg/cm³ expressed in kg/nm³.
const PER_CUBIC_CM_TO_PER_CUBIC_NM: f64 = 1e-21;

fn default_beads_per_crosslink() -> u64 {
    1
}

/// Total bead count with every intermediate checked, `None` on overflow.
fn checked_bead_total(input: &RecordInput) -> Option<u64> {
    let ends = input
        .n_bifunctional_chains
        .checked_mul(2)?
        .checked_add(input.n_monofunctional_chains)?;
    let crosslinks =
        (ends as f64 * input.stoichiometric_imbalance / input.crosslink_functionality as f64).floor();
    if crosslinks >= u64::MAX as f64 {
        return None;
    }
    [
        (input.n_beads_bifunctional, input.n_bifunctional_chains),
        (input.n_beads_monofunctional, input.n_monofunctional_chains),
        (input.n_beads_zerofunctional, input.n_zerofunctional_chains),
        (input.n_beads_xlinks, crosslinks as u64),
    ]
    .into_iter()
    .try_fold(0u64, |total, (per_chain, chains)| total.checked_add(per_chain.checked_mul(chains)?))
}

/// Raw, unvalidated request payload.
///
/// Field names follow the wire format of the prediction service so that a
/// request body deserializes straight into this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInput {
    pub stoichiometric_imbalance: f64,
    pub crosslink_conversion: f64,
    pub crosslink_functionality: u32,

    #[serde(default)]
    pub extract_solvent_before_measurement: bool,
    #[serde(default)]
    pub disable_primary_loops: bool,
    #[serde(default)]
    pub disable_secondary_loops: bool,
    #[serde(default)]
    pub functionalize_discrete: bool,

    #[serde(default)]
    pub n_zerofunctional_chains: u64,
    #[serde(default)]
    pub n_monofunctional_chains: u64,
    pub n_bifunctional_chains: u64,
    #[serde(default)]
    pub n_beads_zerofunctional: u64,
    #[serde(default)]
    pub n_beads_monofunctional: u64,
    pub n_beads_bifunctional: u64,
    #[serde(default = "default_beads_per_crosslink")]
    pub n_beads_xlinks: u64,

    pub temperature: Temperature,
    pub density: Density,
    pub bead_mass: MolarMass,
    pub mean_squared_bead_distance: Area,
    pub plateau_modulus: Modulus,
    pub entanglement_sampling_cutoff: Length,

    #[serde(default)]
    pub polymer_name: Option<String>,
}

/// Validated, immutable set of synthesis and material parameters.
///
/// Only primitives are stored; every count derived from them (beads, chains,
/// cross-links) is recomputed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RecordInput", into = "RecordInput")]
pub struct ParameterRecord {
    input: RecordInput,
}

impl TryFrom<RecordInput> for ParameterRecord {
    type Error = PredictError;

    fn try_from(input: RecordInput) -> PredictResult<Self> {
        Self::new(input)
    }
}

impl From<ParameterRecord> for RecordInput {
    fn from(record: ParameterRecord) -> Self {
        record.input
    }
}

impl ParameterRecord {
    pub fn new(input: RecordInput) -> PredictResult<Self> {
        let r = input.stoichiometric_imbalance;
        if !r.is_finite() || r < 0.0 {
            return Err(PredictError::domain(format!(
                "stoichiometric imbalance must be a non-negative number, got {}",
                r
            )));
        }
        let p = input.crosslink_conversion;
        if !(0.0..=1.0).contains(&p) {
            return Err(PredictError::domain(format!(
                "crosslink conversion must lie in [0, 1], got {}",
                p
            )));
        }
        if input.crosslink_functionality == 0 {
            return Err(PredictError::domain("crosslink functionality must be at least 1"));
        }

        let positive = [
            ("temperature", input.temperature.in_base()),
            ("density", input.density.in_base()),
            ("bead mass", input.bead_mass.in_base()),
            ("mean squared bead distance", input.mean_squared_bead_distance.in_base()),
            ("plateau modulus", input.plateau_modulus.in_base()),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(PredictError::domain(format!(
                    "{} must be strictly positive, got {}",
                    name, value
                )));
            }
        }
        let cutoff = input.entanglement_sampling_cutoff.in_base();
        if !cutoff.is_finite() || cutoff < 0.0 {
            return Err(PredictError::domain(format!(
                "entanglement sampling cutoff must be non-negative, got {}",
                cutoff
            )));
        }

        // Derived counts below use plain arithmetic; downscaling only shrinks them.
        if checked_bead_total(&input).is_none() {
            return Err(PredictError::domain("chain and bead counts overflow the total bead count"));
        }

        Ok(Self { input })
    }

    pub fn input(&self) -> &RecordInput {
        &self.input
    }

    pub fn stoichiometric_imbalance(&self) -> f64 {
        self.input.stoichiometric_imbalance
    }

    pub fn crosslink_conversion(&self) -> f64 {
        self.input.crosslink_conversion
    }

    pub fn crosslink_functionality(&self) -> u32 {
        self.input.crosslink_functionality
    }

    pub fn polymer_name(&self) -> Option<&str> {
        self.input.polymer_name.as_deref()
    }

    /// Fraction of reactive chain ends sitting on bifunctional chains.
    pub fn b2(&self) -> PredictResult<f64> {
        let ends_bi = 2 * self.input.n_bifunctional_chains;
        let ends = ends_bi + self.input.n_monofunctional_chains;
        if ends == 0 {
            return Err(PredictError::domain(
                "b2 is undefined without any bifunctional or monofunctional chains",
            ));
        }
        Ok(ends_bi as f64 / ends as f64)
    }

    pub fn n_total_chains(&self) -> u64 {
        self.input.n_bifunctional_chains + self.input.n_monofunctional_chains
    }

    /// Cross-links needed to satisfy the stoichiometric imbalance.
    pub fn n_crosslinks(&self) -> u64 {
        let r = self.input.stoichiometric_imbalance;
        if r <= 0.0 {
            return 0;
        }
        let ends = (2 * self.input.n_bifunctional_chains + self.input.n_monofunctional_chains) as f64;
        (ends * r / self.input.crosslink_functionality as f64).floor() as u64
    }

    pub fn n_beads_solvent(&self) -> u64 {
        self.input.n_beads_zerofunctional * self.input.n_zerofunctional_chains
    }

    pub fn n_beads_monofunctional_total(&self) -> u64 {
        self.input.n_beads_monofunctional * self.input.n_monofunctional_chains
    }

    pub fn n_beads_bifunctional_total(&self) -> u64 {
        self.input.n_beads_bifunctional * self.input.n_bifunctional_chains
    }

    pub fn n_beads_crosslinks(&self) -> u64 {
        self.input.n_beads_xlinks * self.n_crosslinks()
    }

    /// Beads on reactive chains only; the denominator of the bead fractions
    /// the surrogate model was trained on.
    pub fn n_total_beads(&self) -> u64 {
        self.n_beads_bifunctional_total() + self.n_beads_monofunctional_total()
    }

    /// Every bead in the system, solvent and cross-links included.
    pub fn n_beads_total(&self) -> u64 {
        self.n_total_beads() + self.n_beads_solvent() + self.n_beads_crosslinks()
    }

    /// `sqrt(<b²> / (3π/8))`, in nm.
    pub fn mean_bead_distance_nm(&self) -> f64 {
        let alpha = 3.0 * PI / 8.0;
        (self.input.mean_squared_bead_distance.in_base() / alpha).sqrt()
    }

    /// Bead number density in nm⁻³.
    pub fn bead_density_per_nm3(&self) -> f64 {
        let molar = self.input.density.in_base() / self.input.bead_mass.in_base();
        molar * AVOGADRO * PER_CUBIC_CM_TO_PER_CUBIC_NM
    }

    pub fn temperature_k(&self) -> f64 {
        self.input.temperature.in_base()
    }

    pub fn density_kg_per_cm3(&self) -> f64 {
        self.input.density.in_base()
    }

    pub fn bead_mass_kg_per_mol(&self) -> f64 {
        self.input.bead_mass.in_base()
    }

    pub fn mean_squared_bead_distance_nm2(&self) -> f64 {
        self.input.mean_squared_bead_distance.in_base()
    }

    pub fn plateau_modulus_mpa(&self) -> f64 {
        self.input.plateau_modulus.in_base()
    }

    pub fn entanglement_sampling_cutoff_nm(&self) -> f64 {
        self.input.entanglement_sampling_cutoff.in_base()
    }

    /// Shrinks the chain counts proportionally so that the whole system holds
    /// at most `max_beads` beads. Records already below the cap are returned
    /// unchanged.
    pub fn downscaled(&self, max_beads: u64) -> Self {
        let total = self.n_beads_total();
        if total <= max_beads || total == 0 {
            return self.clone();
        }
        let factor = max_beads as f64 / total as f64;
        let scale = |count: u64| (count as f64 * factor).floor() as u64;

        let mut input = self.input.clone();
        input.n_bifunctional_chains = scale(input.n_bifunctional_chains);
        input.n_monofunctional_chains = scale(input.n_monofunctional_chains);
        input.n_zerofunctional_chains = scale(input.n_zerofunctional_chains);
        Self { input }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::params::units::*;
    use approx::assert_relative_eq;

    pub(crate) fn pdms_input() -> RecordInput {
        RecordInput {
            stoichiometric_imbalance: 1.0,
            crosslink_conversion: 0.95,
            crosslink_functionality: 4,
            extract_solvent_before_measurement: false,
            disable_primary_loops: false,
            disable_secondary_loops: false,
            functionalize_discrete: true,
            n_zerofunctional_chains: 10,
            n_monofunctional_chains: 100,
            n_bifunctional_chains: 1000,
            n_beads_zerofunctional: 20,
            n_beads_monofunctional: 25,
            n_beads_bifunctional: 50,
            n_beads_xlinks: 1,
            temperature: Temperature::new(298.15, TemperatureUnit::Kelvin),
            density: Density::new(0.965, DensityUnit::GramPerCubicCentimeter),
            bead_mass: MolarMass::new(0.162, MolarMassUnit::KilogramPerMole),
            mean_squared_bead_distance: Area::new(0.5, AreaUnit::SquareNanometer),
            plateau_modulus: Modulus::new(0.2, ModulusUnit::MegaPascal),
            entanglement_sampling_cutoff: Length::new(2.5, LengthUnit::Nanometer),
            polymer_name: Some("PDMS".to_string()),
        }
    }

    pub(crate) fn pdms() -> ParameterRecord {
        ParameterRecord::new(pdms_input()).unwrap()
    }

    #[test]
    fn test_derived_counts() {
        let record = pdms();
        assert_relative_eq!(record.b2().unwrap(), 2000.0 / 2100.0);
        assert_eq!(record.n_crosslinks(), 525);
        assert_eq!(record.n_total_chains(), 1100);
        assert_eq!(record.n_total_beads(), 50_000 + 2_500);
        assert_eq!(record.n_beads_total(), 52_500 + 200 + 525);
    }

    #[test]
    fn test_no_crosslinks_without_imbalance() {
        let mut input = pdms_input();
        input.stoichiometric_imbalance = 0.0;
        assert_eq!(ParameterRecord::new(input).unwrap().n_crosslinks(), 0);
    }

    #[test]
    fn test_b2_without_reactive_chains_is_domain_error() {
        let mut input = pdms_input();
        input.n_bifunctional_chains = 0;
        input.n_monofunctional_chains = 0;
        let err = ParameterRecord::new(input).unwrap().b2().unwrap_err();
        assert!(err.is_domain());
    }

    #[test]
    fn test_mean_bead_distance() {
        let record = pdms();
        assert_relative_eq!(
            record.mean_bead_distance_nm(),
            (0.5 / (3.0 * PI / 8.0)).sqrt(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_unit_normalization() {
        let record = pdms();
        assert_relative_eq!(record.density_kg_per_cm3(), 0.965e-3, max_relative = 1e-12);
        // 0.965 g/cm³ of 162 g/mol beads is roughly 3.6 beads per nm³
        assert_relative_eq!(record.bead_density_per_nm3(), 3.587, max_relative = 1e-3);
    }

    #[test]
    fn test_validation() {
        let mut input = pdms_input();
        input.crosslink_conversion = 1.5;
        assert!(ParameterRecord::new(input).unwrap_err().is_domain());

        let mut input = pdms_input();
        input.crosslink_functionality = 0;
        assert!(ParameterRecord::new(input).is_err());

        let mut input = pdms_input();
        input.temperature = Temperature::new(-300.0, TemperatureUnit::Celsius);
        assert!(ParameterRecord::new(input).is_err());
    }

    #[test]
    fn test_oversized_counts_are_domain_errors() {
        let mut input = pdms_input();
        input.n_bifunctional_chains = 10_000_000_000;
        input.n_beads_bifunctional = 10_000_000_000;
        let err = ParameterRecord::new(input).unwrap_err();
        assert!(err.is_domain());
        assert!(err.to_string().contains("overflow"));

        let mut input = pdms_input();
        input.n_bifunctional_chains = u64::MAX;
        assert!(ParameterRecord::new(input).unwrap_err().is_domain());

        let mut input = pdms_input();
        input.stoichiometric_imbalance = 1e30;
        assert!(ParameterRecord::new(input).unwrap_err().is_domain());
    }

    #[test]
    fn test_large_but_representable_counts_are_accepted() {
        let mut input = pdms_input();
        input.n_bifunctional_chains = 1_000_000_000;
        input.n_beads_bifunctional = 1_000_000_000;
        let record = ParameterRecord::new(input).unwrap();
        assert!(record.n_beads_total() > 1_000_000_000_000_000_000);
        assert!(record.downscaled(10_000).n_beads_total() <= 10_000);
    }

    #[test]
    fn test_deserialize_request_body() {
        let body = r#"{
            "stoichiometric_imbalance": 1.0,
            "crosslink_conversion": 0.9,
            "crosslink_functionality": 4,
            "n_bifunctional_chains": 500,
            "n_beads_bifunctional": 40,
            "temperature": "25 degC",
            "density": "0.965 g/cm^3",
            "bead_mass": "162 g/mol",
            "mean_squared_bead_distance": "0.5 nm^2",
            "plateau_modulus": "200 kPa",
            "entanglement_sampling_cutoff": "2.5 nm"
        }"#;
        let record: ParameterRecord = serde_json::from_str(body).unwrap();
        assert_eq!(record.input().n_beads_xlinks, 1);
        assert_relative_eq!(record.temperature_k(), 298.15, epsilon = 1e-9);
        assert_relative_eq!(record.plateau_modulus_mpa(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(record.b2().unwrap(), 1.0);
    }

    #[test]
    fn test_deserialize_rejects_invalid_values() {
        let body = r#"{
            "stoichiometric_imbalance": -1.0,
            "crosslink_conversion": 0.9,
            "crosslink_functionality": 4,
            "n_bifunctional_chains": 500,
            "n_beads_bifunctional": 40,
            "temperature": 300,
            "density": 0.001,
            "bead_mass": 0.1,
            "mean_squared_bead_distance": 0.5,
            "plateau_modulus": 0.2,
            "entanglement_sampling_cutoff": 2.5
        }"#;
        assert!(serde_json::from_str::<ParameterRecord>(body).is_err());
    }

    #[test]
    fn test_downscaled() {
        let record = pdms();
        let small = record.downscaled(3_000);
        assert!(small.n_beads_total() <= 3_000);
        assert!(small.input().n_bifunctional_chains < 1000);
        assert_eq!(small.input().n_beads_bifunctional, 50);

        let unchanged = record.downscaled(1_000_000);
        assert_eq!(unchanged.n_beads_total(), record.n_beads_total());
    }
}
