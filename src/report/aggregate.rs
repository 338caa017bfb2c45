//! Statistical aggregation of ensemble runs

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::format::ValueWithError;
use crate::error::{PredictError, PredictResult};

/// Named outputs of one successful simulation run.
pub type RunResult = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyStatistics {
    pub mean: f64,
    /// Sample standard deviation; only defined for more than one run.
    pub error: Option<f64>,
    pub n_runs: usize,
}

impl KeyStatistics {
    fn from_values(values: &[f64]) -> Self {
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let error = (n > 1).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        });
        Self { mean, error, n_runs: n }
    }

    pub fn value_with_error(&self) -> ValueWithError {
        ValueWithError::new(self.mean, self.error)
    }

    pub fn display(&self) -> String {
        self.value_with_error().to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult {
    pub stats: BTreeMap<String, KeyStatistics>,
    pub n_runs: usize,
}

impl AggregatedResult {
    pub fn get(&self, key: &str) -> Option<&KeyStatistics> {
        self.stats.get(key)
    }

    /// Flat mapping: `key`, `key_error` (more than one run), `key_str`, `n_runs`.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (key, stats) in &self.stats {
            out.insert(key.clone(), Value::from(stats.mean));
            if let Some(error) = stats.error {
                out.insert(format!("{}_error", key), Value::from(error));
            }
            out.insert(format!("{}_str", key), Value::from(stats.display()));
        }
        out.insert("n_runs".to_string(), Value::from(self.n_runs));
        Value::Object(out)
    }
}

/// Mean and sample standard deviation for every tracked key.
///
/// # Panics
/// If a tracked key is missing from any run. Runs come from one homogeneous
/// simulation configuration; the orchestrator filters incomplete runs first.
pub fn aggregate<S: AsRef<str>>(runs: &[RunResult], keys: &[S]) -> PredictResult<AggregatedResult> {
    if runs.is_empty() {
        return Err(PredictError::NoSuccessfulRuns { requested: 0 });
    }
    let mut stats = BTreeMap::new();
    for key in keys {
        let key = key.as_ref();
        let values: Vec<f64> = runs
            .iter()
            .map(|run| *run.get(key).unwrap_or_else(|| panic!("tracked key '{}' missing from a run", key)))
            .collect();
        stats.insert(key.to_string(), KeyStatistics::from_values(&values));
    }
    Ok(AggregatedResult { stats, n_runs: runs.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn run(pairs: &[(&str, f64)]) -> RunResult {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_mean_and_sample_std() {
        let runs: Vec<RunResult> = [1.0, 2.0, 3.0, 4.0, 5.0]
            .iter()
            .map(|v| run(&[("g_ant", *v)]))
            .collect();
        let result = aggregate(&runs, &["g_ant"]).unwrap();
        let g = result.get("g_ant").unwrap();
        assert_relative_eq!(g.mean, 3.0);
        assert_relative_eq!(g.error.unwrap(), 1.5811, epsilon = 1e-4);
        assert_eq!(result.n_runs, 5);
        assert_eq!(g.display(), "3 ± 2");
    }

    #[test]
    fn test_single_run_has_no_error() {
        let result = aggregate(&[run(&[("g_ant", 0.1234)])], &["g_ant"]).unwrap();
        let g = result.get("g_ant").unwrap();
        assert_eq!(g.error, None);
        assert_eq!(g.display(), "0.123");

        let json = result.to_json();
        assert_eq!(json["n_runs"], 1);
        assert_eq!(json["g_ant_str"], "0.123");
        assert!(json.get("g_ant_error").is_none());
    }

    #[test]
    fn test_json_shape_for_many_runs() {
        let runs = vec![
            run(&[("g_ant", 12.3), ("w_soluble", 0.0)]),
            run(&[("g_ant", 12.4), ("w_soluble", 0.0)]),
        ];
        let json = aggregate(&runs, &["g_ant", "w_soluble"]).unwrap().to_json();
        assert_relative_eq!(json["g_ant"].as_f64().unwrap(), 12.35, epsilon = 1e-12);
        assert!(json["g_ant_error"].as_f64().unwrap() > 0.0);
        assert_eq!(json["w_soluble_error"], 0.0);
        assert_eq!(json["w_soluble_str"], "0.00");
        assert_eq!(json["n_runs"], 2);
    }

    #[test]
    fn test_empty_is_domain_error() {
        let err = aggregate::<&str>(&[], &["g_ant"]).unwrap_err();
        assert!(err.is_domain());
    }

    #[test]
    #[should_panic(expected = "missing from a run")]
    fn test_heterogeneous_runs_panic() {
        let runs = vec![run(&[("g_ant", 1.0)]), run(&[("g_phantom", 1.0)])];
        let _ = aggregate(&runs, &["g_ant"]);
    }
}
