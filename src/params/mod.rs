//! Parameter Module
//!
//! Strongly typed synthesis/material inputs with explicit physical units.

pub mod units;
mod record;
mod presets;

pub use record::{ParameterRecord, RecordInput};
pub use presets::{PolymerPreset, PresetLibrary};
pub use units::{Area, Density, Length, Modulus, MolarMass, Quantity, Temperature, Unit};

#[cfg(test)]
pub(crate) use record::tests::{pdms, pdms_input};
