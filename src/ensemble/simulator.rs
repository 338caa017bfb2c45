//! Simulation collaborator
//!
//! The physics engine is opaque: it takes a parameter record and returns a
//! flat mapping of named measurements, or fails for that one call.

use serde_json::{Map, Value};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::codec::{composite, ResultKey};
use crate::config::SimulatorSettings;
use crate::error::{PredictError, PredictResult};
use crate::params::ParameterRecord;
use crate::report::RunResult;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One stochastic simulation run. Implementations must not share mutable
/// state between calls; the orchestrator invokes them concurrently.
pub trait Simulator: Send + Sync {
    fn simulate(&self, record: &ParameterRecord) -> PredictResult<RunResult>;
}

/// Runs an engine executable per call: the record goes to stdin as JSON, a
/// JSON object of measurements is read back from stdout.
#[derive(Debug, Clone)]
pub struct ExternalSimulator {
    program: PathBuf,
    args: Vec<String>,
    /// Engine label -> short key.
    label_map: Vec<ResultKey>,
    timeout: Option<Duration>,
}

/// Kills and reaps the engine on drop unless it already exited.
struct EngineProcess(Child);

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = self.0.kill();
            let _ = self.0.wait();
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl ExternalSimulator {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, label_map: Vec<ResultKey>) -> Self {
        Self { program: program.into(), args, label_map, timeout: None }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    pub fn from_settings(settings: &SimulatorSettings) -> PredictResult<Self> {
        let program = settings.program.clone().ok_or_else(|| {
            PredictError::config("no simulator program configured (set simulator.program or POLYNET_SIMULATOR)")
        })?;
        let simulator = Self::new(program, settings.args.clone(), settings.label_map.clone());
        Ok(match settings.timeout_secs {
            Some(secs) => simulator.with_timeout(secs),
            None => simulator,
        })
    }

    /// Renames engine labels to short keys and derives the composites.
    ///
    /// Mapped labels must carry finite numbers. Anything else the engine
    /// reports (timestamps, versions, mode names) is kept when numeric and
    /// skipped otherwise.
    pub fn translate(&self, raw: Map<String, Value>) -> PredictResult<RunResult> {
        let mut run = RunResult::new();
        for (label, value) in raw {
            let mapped = self.label_map.iter().find(|rk| rk.label == label || rk.key == label);
            match (value.as_f64().filter(|v| v.is_finite()), mapped) {
                (Some(number), Some(rk)) => {
                    run.insert(rk.key.clone(), number);
                }
                (Some(number), None) => {
                    run.insert(label, number);
                }
                (None, Some(_)) => {
                    return Err(PredictError::simulation(format!(
                        "engine output '{}' is not a finite number: {}",
                        label, value
                    )));
                }
                (None, None) => debug!("Skipping non-numeric engine output '{}': {}", label, value),
            }
        }

        let get = |key: &str| run.get(key).copied();
        let entangled = composite::entangled(get("g_ant"), get("g_phantom"));
        let backbone = composite::backbone(get("w_dangling"), get("w_soluble"));
        if let Some(v) = entangled {
            run.insert("g_entangled".to_string(), v);
        }
        if let Some(v) = backbone {
            run.insert("w_backbone".to_string(), v);
        }
        Ok(run)
    }

    fn wait(&self, engine: &mut EngineProcess) -> PredictResult<ExitStatus> {
        let not_finished = |e: std::io::Error| PredictError::simulation(format!("engine did not finish: {}", e));
        let Some(limit) = self.timeout else {
            return engine.0.wait().map_err(not_finished);
        };
        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = engine.0.try_wait().map_err(not_finished)? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!("Engine {} exceeded {}s, killing it", self.program.display(), limit.as_secs());
                return Err(PredictError::simulation(format!(
                    "engine exceeded {}s and was killed",
                    limit.as_secs()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Simulator for ExternalSimulator {
    fn simulate(&self, record: &ParameterRecord) -> PredictResult<RunResult> {
        let payload = serde_json::to_vec(record)?;
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PredictError::simulation(format!("cannot start {}: {}", self.program.display(), e))
            })?;
        let mut engine = EngineProcess(child);

        if let Some(mut stdin) = engine.0.stdin.take() {
            stdin
                .write_all(&payload)
                .map_err(|e| PredictError::simulation(format!("cannot send parameters: {}", e)))?;
        }
        let stdout = drain(engine.0.stdout.take());
        let stderr = drain(engine.0.stderr.take());
        let status = self.wait(&mut engine)?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(PredictError::simulation(format!(
                "engine exited with {}: {}",
                status,
                stderr.trim()
            )));
        }
        let parsed: Value = serde_json::from_slice(&stdout)
            .map_err(|e| PredictError::simulation(format!("unparsable engine output: {}", e)))?;
        let Value::Object(raw) = parsed else {
            return Err(PredictError::simulation("engine output is not a JSON object"));
        };
        debug!("Engine returned {} measurements", raw.len());
        self.translate(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorSettings;
    use serde_json::json;

    fn engine_labels() -> ExternalSimulator {
        let settings = SimulatorSettings { program: Some("engine".into()), ..Default::default() };
        ExternalSimulator::from_settings(&settings).unwrap()
    }

    #[test]
    fn test_translate_renames_and_derives() {
        let raw = json!({
            "G [MPa] from gamma Mean, Entangled FB No Slipping": 0.9,
            "Phantom, Force Balance, G_ANT [MPa]": 0.4,
            "soluble_fraction Mean, Entangled FB No Slipping": 0.05,
            "dangling_fraction Mean, Entangled FB No Slipping": 0.15,
            "extra": 3.0
        });
        let Value::Object(raw) = raw else { unreachable!() };
        let run = engine_labels().translate(raw).unwrap();
        assert_eq!(run["g_ant"], 0.9);
        assert_eq!(run["g_phantom"], 0.4);
        assert!((run["g_entangled"] - 0.5).abs() < 1e-12);
        assert!((run["w_backbone"] - 0.8).abs() < 1e-12);
        assert_eq!(run["extra"], 3.0);
    }

    #[test]
    fn test_translate_skips_engine_metadata() {
        let raw = json!({
            "G [MPa] from gamma Mean, Entangled FB No Slipping": 0.9,
            "Phantom, Force Balance, G_ANT [MPa]": 0.4,
            "soluble_fraction Mean, Entangled FB No Slipping": 0.05,
            "dangling_fraction Mean, Entangled FB No Slipping": 0.15,
            "now": "2024-05-02 13:37:00",
            "pylimer_tools_v": "0.3.1",
            "entanglement_type": "link",
            "seed": 17
        });
        let Value::Object(raw) = raw else { unreachable!() };
        let run = engine_labels().translate(raw).unwrap();
        assert_eq!(run["g_ant"], 0.9);
        assert_eq!(run["seed"], 17.0);
        assert!(!run.contains_key("now"));
        assert!(!run.contains_key("entanglement_type"));
        assert!(!run.contains_key("pylimer_tools_v"));
    }

    #[test]
    fn test_translate_rejects_non_numbers_for_mapped_labels() {
        let Value::Object(raw) = json!({"g_ant": null}) else { unreachable!() };
        assert!(engine_labels().translate(raw).unwrap_err().is_transient());

        let Value::Object(raw) = json!({"soluble_fraction Mean, Entangled FB No Slipping": "n/a"}) else {
            unreachable!()
        };
        assert!(engine_labels().translate(raw).unwrap_err().is_transient());
    }

    #[test]
    fn test_missing_program_is_config_error() {
        let err = ExternalSimulator::from_settings(&SimulatorSettings::default()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_timeout_comes_from_settings() {
        let settings = SimulatorSettings {
            program: Some("engine".into()),
            timeout_secs: Some(3),
            ..Default::default()
        };
        let simulator = ExternalSimulator::from_settings(&settings).unwrap();
        assert_eq!(simulator.timeout, Some(Duration::from_secs(3)));
        assert_eq!(engine_labels().timeout, None);
    }
}
