//! Value and value±error rendering

use std::fmt;
use std::str::FromStr;

use crate::error::{PredictError, PredictResult};

const SIGNIFICANT_DIGITS: i32 = 3;

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Three significant digits in `%g` style; exactly zero renders as `"0.00"`.
pub fn format_value(value: f64) -> String {
    if value == 0.0 {
        return "0.00".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    let precision = (SIGNIFICANT_DIGITS - 1) as usize;
    // The exponent after rounding decides between fixed and scientific form.
    let sci = format!("{:.*e}", precision, value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if (-4..SIGNIFICANT_DIGITS).contains(&exp) {
        let decimals = (SIGNIFICANT_DIGITS - 1 - exp).max(0) as usize;
        strip_zeros(&format!("{:.*}", decimals, value)).to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", strip_zeros(mantissa), sign, exp.abs())
    }
}

/// Decimal places implied by the magnitude of `error`.
pub fn error_decimals(error: f64) -> usize {
    (-error.abs().log10().floor()).max(0.0) as usize
}

/// `"{value} ± {error}"`, both rounded to the decimals implied by the error.
/// A zero or non-finite error falls back to [`format_value`].
pub fn format_value_with_error(value: f64, error: f64) -> String {
    if error == 0.0 || !error.is_finite() {
        return format_value(value);
    }
    let decimals = error_decimals(error);
    format!("{:.*} ± {:.*}", decimals, value, decimals, error.abs())
}

/// A parsed or computed `value ± error` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueWithError {
    pub value: f64,
    pub error: Option<f64>,
}

impl ValueWithError {
    pub fn new(value: f64, error: Option<f64>) -> Self {
        Self { value, error }
    }
}

impl fmt::Display for ValueWithError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error {
            Some(error) => f.write_str(&format_value_with_error(self.value, error)),
            None => f.write_str(&format_value(self.value)),
        }
    }
}

impl FromStr for ValueWithError {
    type Err = PredictError;

    fn from_str(s: &str) -> PredictResult<Self> {
        let parse = |part: &str| -> PredictResult<f64> {
            part.trim()
                .parse()
                .map_err(|_| PredictError::domain(format!("'{}' is not a number", part.trim())))
        };
        match s.split_once('±') {
            Some((value, error)) => Ok(Self::new(parse(value)?, Some(parse(error)?))),
            None => Ok(Self::new(parse(s)?, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value_significant_digits() {
        assert_eq!(format_value(0.0), "0.00");
        assert_eq!(format_value(12345.678), "1.23e+04");
        assert_eq!(format_value(1.5), "1.5");
        assert_eq!(format_value(0.123456), "0.123");
        assert_eq!(format_value(999.6), "1e+03");
        assert_eq!(format_value(-2.0), "-2");
        assert_eq!(format_value(0.00001234), "1.23e-05");
        assert_eq!(format_value(0.0001234), "0.000123");
        assert_eq!(format_value(123.4), "123");
    }

    #[test]
    fn test_format_value_with_error() {
        assert_eq!(format_value_with_error(12.3456, 0.0789), "12.35 ± 0.08");
        assert_eq!(format_value_with_error(1234.4, 56.0), "1234 ± 56");
        assert_eq!(format_value_with_error(3.0, 1.5811), "3 ± 2");
        assert_eq!(format_value_with_error(0.5, 0.002), "0.500 ± 0.002");
        assert_eq!(format_value_with_error(12345.678, 0.0), "1.23e+04");
    }

    #[test]
    fn test_decimals_match_error_magnitude() {
        for (error, decimals) in [(0.0789, 2), (0.5, 1), (0.002, 3), (7.0, 0), (250.0, 0)] {
            assert_eq!(error_decimals(error), decimals);
            let s = format_value_with_error(1.0, error);
            let (value_part, error_part) = s.split_once(" ± ").unwrap();
            for part in [value_part, error_part] {
                let after = part.split_once('.').map(|(_, d)| d.len()).unwrap_or(0);
                assert_eq!(after, decimals, "{}", s);
            }
        }
    }

    #[test]
    fn test_canonical_strings_round_trip() {
        for s in ["12.35 ± 0.08", "0.500 ± 0.002", "1234 ± 56", "1.23e+04", "0.00"] {
            let parsed: ValueWithError = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("twelve ± 1".parse::<ValueWithError>().unwrap_err().is_domain());
    }
}
