//! Unit-tagged physical quantities
//!
//! Every quantity remembers the unit it was given in. Conversion to the base
//! set (K, kg/cm³, kg/mol, nm², MPa, nm) only happens when a value crosses the
//! codec boundary via [`Quantity::in_base`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{PredictError, PredictResult};

/// A measurement scale belonging to one physical dimension.
pub trait Unit: Copy + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Human readable dimension name, used in error messages.
    const DIMENSION: &'static str;

    fn base() -> Self;
    fn symbol(&self) -> &'static str;
    fn from_symbol(symbol: &str) -> Option<Self>;
    fn to_base(&self, magnitude: f64) -> f64;
}

/// Accepts the spellings people actually type: `cm**3`, `cm³`, `Å`, `°C`.
/// Word aliases are only rewritten when they form a whole token between
/// `/` and `^` separators.
fn normalize_symbol(symbol: &str) -> String {
    let compact: String = symbol
        .trim()
        .replace("**", "^")
        .replace('³', "^3")
        .replace('²', "^2")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let is_separator = |c: char| c == '/' || c == '^';
    let mut out = String::with_capacity(compact.len());
    for piece in compact.split_inclusive(is_separator) {
        let (token, separator) = match piece.char_indices().last() {
            Some((at, c)) if is_separator(c) => piece.split_at(at),
            _ => (piece, ""),
        };
        if token.eq_ignore_ascii_case("angstrom") {
            out.push('Å');
        } else {
            out.push_str(token);
        }
        out.push_str(separator);
    }
    out
}

macro_rules! linear_unit {
    (
        $(#[$meta:meta])*
        $name:ident, $dimension:literal, base = $base:ident,
        { $($variant:ident => $symbol:literal, [$($alias:literal),*], $factor:expr;)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant,)+
        }

        impl Unit for $name {
            const DIMENSION: &'static str = $dimension;

            fn base() -> Self {
                Self::$base
            }

            fn symbol(&self) -> &'static str {
                match self {
                    $(Self::$variant => $symbol,)+
                }
            }

            fn from_symbol(symbol: &str) -> Option<Self> {
                let symbol = normalize_symbol(symbol);
                match symbol.as_str() {
                    $($symbol $(| $alias)* => Some(Self::$variant),)+
                    _ => None,
                }
            }

            fn to_base(&self, magnitude: f64) -> f64 {
                match self {
                    $(Self::$variant => magnitude * $factor,)+
                }
            }
        }
    };
}

linear_unit!(
    /// Mass density, base kg/cm³.
    DensityUnit, "density", base = KilogramPerCubicCentimeter,
    {
        KilogramPerCubicCentimeter => "kg/cm^3", [], 1.0;
        GramPerCubicCentimeter => "g/cm^3", ["g/cc", "g/ml", "g/mL"], 1e-3;
        KilogramPerCubicMeter => "kg/m^3", [], 1e-6;
    }
);

linear_unit!(
    /// Molar mass, base kg/mol.
    MolarMassUnit, "molar mass", base = KilogramPerMole,
    {
        KilogramPerMole => "kg/mol", [], 1.0;
        GramPerMole => "g/mol", ["Da"], 1e-3;
    }
);

linear_unit!(
    /// Area, base nm².
    AreaUnit, "area", base = SquareNanometer,
    {
        SquareNanometer => "nm^2", [], 1.0;
        SquareAngstrom => "Å^2", ["A^2"], 1e-2;
    }
);

linear_unit!(
    /// Modulus or pressure, base MPa.
    ModulusUnit, "modulus", base = MegaPascal,
    {
        MegaPascal => "MPa", [], 1.0;
        KiloPascal => "kPa", [], 1e-3;
        Pascal => "Pa", [], 1e-6;
        GigaPascal => "GPa", [], 1e3;
    }
);

linear_unit!(
    /// Length, base nm.
    LengthUnit, "length", base = Nanometer,
    {
        Nanometer => "nm", [], 1.0;
        Angstrom => "Å", ["A"], 0.1;
        Meter => "m", [], 1e9;
    }
);

/// Temperature, base K. Not a pure scale factor, so written out by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Kelvin,
    Celsius,
}

impl Unit for TemperatureUnit {
    const DIMENSION: &'static str = "temperature";

    fn base() -> Self {
        Self::Kelvin
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Kelvin => "K",
            Self::Celsius => "degC",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match normalize_symbol(symbol).as_str() {
            "K" | "kelvin" => Some(Self::Kelvin),
            "degC" | "°C" | "C" | "celsius" => Some(Self::Celsius),
            _ => None,
        }
    }

    fn to_base(&self, magnitude: f64) -> f64 {
        match self {
            Self::Kelvin => magnitude,
            Self::Celsius => magnitude + 273.15,
        }
    }
}

/// A magnitude tagged with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity<U: Unit> {
    magnitude: f64,
    unit: U,
}

impl<U: Unit> Quantity<U> {
    pub fn new(magnitude: f64, unit: U) -> Self {
        Self { magnitude, unit }
    }

    /// Magnitude already expressed in the base unit of the dimension.
    pub fn base(magnitude: f64) -> Self {
        Self::new(magnitude, U::base())
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn unit(&self) -> U {
        self.unit
    }

    pub fn in_base(&self) -> f64 {
        self.unit.to_base(self.magnitude)
    }

    fn with_symbol(magnitude: f64, symbol: &str) -> PredictResult<Self> {
        let unit = U::from_symbol(symbol).ok_or_else(|| {
            PredictError::domain(format!("unknown {} unit '{}'", U::DIMENSION, symbol))
        })?;
        Ok(Self::new(magnitude, unit))
    }
}

impl<U: Unit> fmt::Display for Quantity<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.magnitude, self.unit.symbol())
    }
}

impl<U: Unit> FromStr for Quantity<U> {
    type Err = PredictError;

    fn from_str(s: &str) -> PredictResult<Self> {
        let s = s.trim();
        let (number, symbol) = match s.split_once(char::is_whitespace) {
            Some((number, symbol)) => (number, Some(symbol)),
            None => (s, None),
        };
        let magnitude: f64 = number.parse().map_err(|_| {
            PredictError::domain(format!("invalid {} quantity '{}'", U::DIMENSION, s))
        })?;
        match symbol {
            Some(symbol) => Self::with_symbol(magnitude, symbol),
            None => Ok(Self::base(magnitude)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuantityRepr {
    Number(f64),
    Text(String),
    Parts { magnitude: f64, unit: String },
}

impl<'de, U: Unit> Deserialize<'de> for Quantity<U> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parsed = match QuantityRepr::deserialize(deserializer)? {
            QuantityRepr::Number(magnitude) => Ok(Self::base(magnitude)),
            QuantityRepr::Text(text) => text.parse(),
            QuantityRepr::Parts { magnitude, unit } => Self::with_symbol(magnitude, &unit),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

impl<U: Unit> Serialize for Quantity<U> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub type Temperature = Quantity<TemperatureUnit>;
pub type Density = Quantity<DensityUnit>;
pub type MolarMass = Quantity<MolarMassUnit>;
pub type Area = Quantity<AreaUnit>;
pub type Modulus = Quantity<ModulusUnit>;
pub type Length = Quantity<LengthUnit>;
