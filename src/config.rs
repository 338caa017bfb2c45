//! Predictor configuration
//!
//! Feature names, output axes and translation tables are versioned together
//! with the trained artifacts, so they live in one explicit struct that is
//! handed to the codec, predictor and orchestrator at construction time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::codec::ResultKey;
use crate::error::{PredictError, PredictResult};

const G_MEAN: &str = "G [MPa] from gamma Mean, Entangled FB No Slipping";
const G_PHANTOM_FIT: &str = "Phantom, FB/FR, G_ANT [MPa]";
const G_PHANTOM_SIM: &str = "Phantom, Force Balance, G_ANT [MPa]";
const W_DANGLING: &str = "dangling_fraction Mean, Entangled FB No Slipping";
const W_SOLUBLE: &str = "soluble_fraction Mean, Entangled FB No Slipping";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleSettings {
    /// Upper clamp for caller-requested run counts.
    pub max_runs: usize,
    /// Upper bound on concurrently executing simulations.
    pub max_workers: usize,
    pub default_runs: usize,
    /// Stop waiting for stragglers after this many seconds.
    pub timeout_secs: Option<u64>,
    pub tracked_keys: Vec<String>,
    /// Cap on the simulated system size, applied before fan-out.
    pub max_beads: Option<u64>,
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        Self {
            max_runs: 10,
            max_workers: 8,
            default_runs: 5,
            timeout_secs: None,
            tracked_keys: ["g_ant", "g_phantom", "g_entangled", "w_dangling", "w_soluble", "w_backbone"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_beads: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Executable implementing the simulation engine.
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    /// Engine output label -> short result key.
    pub label_map: Vec<ResultKey>,
    /// Kill an engine process running longer than this.
    pub timeout_secs: Option<u64>,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            label_map: vec![
                ResultKey::new("g_ant", G_MEAN),
                ResultKey::new("g_phantom", G_PHANTOM_SIM),
                ResultKey::new("w_soluble", W_SOLUBLE),
                ResultKey::new("w_dangling", W_DANGLING),
            ],
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub artifact_dir: PathBuf,
    /// Identifier of the training data set the artifacts were fitted on.
    pub file_id: String,
    pub feature_names: Vec<String>,
    pub output_axes: Vec<String>,
    /// Short result key -> output axis label.
    pub result_keys: Vec<ResultKey>,
    pub ensemble: EnsembleSettings,
    pub simulator: SimulatorSettings,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        let feature_names = [
            "r",
            "p",
            "b2",
            "ge_1 [MPa]",
            "temperature [K]",
            "density [g/cm^3]",
            "param's <b> [nm]",
            "param's Mw [kg/mol]",
            "Mw [kg/mol]",
            "Mw [kg/mol] monofunctional chains",
            "Mw [kg/mol] solvent chains",
            "Mw [kg/mol] xlink chains",
            "functionality_per_xlink_chain",
            "functionalize_discrete",
            "solvent_fraction_of_beads",
            "monofunctional_fraction_of_beads",
            "bifunctional_fraction_of_beads",
            "entanglement_sampling_cutoff [nm]",
        ];
        Self {
            artifact_dir: PathBuf::from("artifacts"),
            file_id: "combined_data_with_loops_5filtered_mean".to_string(),
            feature_names: feature_names.into_iter().map(String::from).collect(),
            output_axes: [G_MEAN, G_PHANTOM_FIT, W_DANGLING, W_SOLUBLE]
                .into_iter()
                .map(String::from)
                .collect(),
            result_keys: vec![
                ResultKey::new("g_eq", G_MEAN),
                ResultKey::new("g_phantom", G_PHANTOM_FIT),
                ResultKey::new("w_dangling", W_DANGLING),
                ResultKey::new("w_soluble", W_SOLUBLE),
            ],
            ensemble: EnsembleSettings::default(),
            simulator: SimulatorSettings::default(),
        }
    }
}

impl PredictorConfig {
    /// Reads YAML (`.yaml`/`.yml`) or JSON, then validates.
    pub fn load(path: impl AsRef<Path>) -> PredictResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PredictError::config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let parsed = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };
        let config: PredictorConfig = parsed
            .map_err(|e| PredictError::config(format!("config {} malformed: {}", path.display(), e)))?;
        config.validate()?;
        debug!("Loaded predictor config from {}", path.display());
        Ok(config)
    }

    /// Applies `POLYNET_*` environment variables on top of the loaded values.
    pub fn apply_env_overrides(&mut self) -> PredictResult<()> {
        if let Ok(dir) = std::env::var("POLYNET_ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(dir);
        }
        if let Ok(program) = std::env::var("POLYNET_SIMULATOR") {
            self.simulator.program = Some(PathBuf::from(program));
        }
        let parse = |var: &str| -> PredictResult<Option<usize>> {
            match std::env::var(var) {
                Ok(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| PredictError::config(format!("{} must be an integer, got '{}'", var, raw))),
                Err(_) => Ok(None),
            }
        };
        if let Some(max_runs) = parse("POLYNET_MAX_RUNS")? {
            self.ensemble.max_runs = max_runs;
        }
        if let Some(max_workers) = parse("POLYNET_MAX_WORKERS")? {
            self.ensemble.max_workers = max_workers;
        }
        self.validate()
    }

    pub fn validate(&self) -> PredictResult<()> {
        if self.feature_names.is_empty() {
            return Err(PredictError::config("feature_names must not be empty"));
        }
        if self.output_axes.is_empty() {
            return Err(PredictError::config("output_axes must not be empty"));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = self.feature_names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(PredictError::config(format!("feature '{}' listed twice", dup)));
        }
        if !self.result_keys.iter().any(|rk| self.output_axes.contains(&rk.label)) {
            return Err(PredictError::config(
                "no result key maps onto a configured output axis",
            ));
        }
        if self.ensemble.max_runs == 0 {
            return Err(PredictError::config("ensemble.max_runs must be at least 1"));
        }
        if self.ensemble.max_workers == 0 {
            return Err(PredictError::config("ensemble.max_workers must be at least 1"));
        }
        Ok(())
    }

    /// Identifier shared by the model and scaler artifacts of one training run.
    pub fn fit_key(&self) -> String {
        let data = self.file_id.replace("-mean-filtered-5", "");
        let data = data.strip_suffix("data-").unwrap_or(&data);
        let outputs = match self.output_axes.as_slice() {
            [single] => single.replace("[MPa]", "").replace(',', "").trim().replace(' ', "_"),
            axes => format!("{}_output_axes", axes.len()),
        };
        format!("{}_{}-anypolymer", data, outputs)
    }

    pub fn model_path(&self) -> PathBuf {
        self.artifact_dir.join(format!("final_model_{}.safetensors", self.fit_key()))
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.artifact_dir.join(format!("scaler_{}.json", self.fit_key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PredictorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.feature_names.len(), 18);
        assert_eq!(config.ensemble.max_runs, 10);
        assert_eq!(config.ensemble.max_workers, 8);
    }

    #[test]
    fn test_fit_key() {
        let mut config = PredictorConfig::default();
        assert_eq!(
            config.fit_key(),
            "combined_data_with_loops_5filtered_mean_4_output_axes-anypolymer"
        );

        config.file_id = "data-anypolymer-mean-filtered-5".to_string();
        config.output_axes = vec!["Phantom, FB/FR, G_ANT [MPa]".to_string()];
        assert_eq!(config.fit_key(), "data-anypolymer_Phantom_FB/FR_G_ANT-anypolymer");
        assert!(config
            .scaler_path()
            .ends_with("scaler_data-anypolymer_Phantom_FB/FR_G_ANT-anypolymer.json"));
    }

    #[test]
    fn test_load_yaml_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictor.yaml");
        std::fs::write(
            &path,
            "artifact_dir: /opt/models\nensemble:\n  max_runs: 4\n  timeout_secs: 30\n",
        )
        .unwrap();
        let config = PredictorConfig::load(&path).unwrap();
        assert_eq!(config.artifact_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.ensemble.max_runs, 4);
        assert_eq!(config.ensemble.max_workers, 8);
        assert_eq!(config.ensemble.timeout_secs, Some(30));
        assert_eq!(config.output_axes.len(), 4);
    }

    #[test]
    fn test_load_json_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictor.json");
        std::fs::write(&path, r#"{"ensemble": {"max_workers": 0}}"#).unwrap();
        assert!(PredictorConfig::load(&path).unwrap_err().is_config());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictor.yaml");
        std::fs::write(&path, "ensemble:\n  max_runs: [unclosed\n").unwrap();
        let err = PredictorConfig::load(&path).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("malformed"));

        let path = dir.path().join("predictor.json");
        std::fs::write(&path, r#"{"ensemble": {"max_runs": "many"}}"#).unwrap();
        assert!(PredictorConfig::load(&path).unwrap_err().is_config());
    }

    #[test]
    fn test_validate_duplicates_and_translation() {
        let mut config = PredictorConfig::default();
        config.feature_names.push("r".to_string());
        assert!(config.validate().is_err());

        let mut config = PredictorConfig::default();
        config.result_keys = vec![ResultKey::new("g_eq", "not an axis")];
        assert!(config.validate().unwrap_err().is_config());
    }
}
