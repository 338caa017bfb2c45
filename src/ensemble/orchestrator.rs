//! Ensemble Orchestrator
//!
//! Fans one parameter record out to N independent simulation runs on a
//! bounded pool, keeps what succeeds and aggregates it.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::simulator::Simulator;
use crate::config::EnsembleSettings;
use crate::error::{PredictError, PredictResult};
use crate::params::ParameterRecord;
use crate::report::{aggregate, AggregatedResult, RunResult};

/// A lost ensemble member.
#[derive(Debug)]
pub struct RunFailure {
    pub index: usize,
    pub error: PredictError,
}

#[derive(Debug)]
pub struct EnsembleOutcome {
    pub successes: Vec<RunResult>,
    pub failures: Vec<RunFailure>,
    /// Run count after clamping.
    pub requested: usize,
    /// Pool size; 0 when the single run was executed directly.
    pub workers: usize,
}

pub struct EnsembleOrchestrator {
    simulator: Arc<dyn Simulator>,
    settings: EnsembleSettings,
}

impl EnsembleOrchestrator {
    pub fn new(simulator: Arc<dyn Simulator>, settings: EnsembleSettings) -> Self {
        Self { simulator, settings }
    }

    pub fn settings(&self) -> &EnsembleSettings {
        &self.settings
    }

    /// Caller input is untrusted; always lands in `[1, max_runs]`.
    pub fn clamp_runs(&self, requested: i64) -> usize {
        let max = self.settings.max_runs.max(1) as i64;
        requested.clamp(1, max) as usize
    }

    /// Runs missing a tracked key cannot be aggregated and count as failed.
    fn check_complete(&self, run: RunResult) -> PredictResult<RunResult> {
        match self.settings.tracked_keys.iter().find(|k| !run.contains_key(*k)) {
            Some(missing) => Err(PredictError::simulation(format!(
                "run is missing tracked key '{}'",
                missing
            ))),
            None => Ok(run),
        }
    }

    fn record_result(&self, outcome: &mut EnsembleOutcome, index: usize, result: PredictResult<RunResult>) {
        match result.and_then(|run| self.check_complete(run)) {
            Ok(run) => {
                debug!("Ensemble run {} finished", index);
                outcome.successes.push(run);
            }
            Err(error) => {
                warn!("Ensemble run {} failed and is excluded: {}", index, error);
                outcome.failures.push(RunFailure { index, error });
            }
        }
    }

    pub async fn run_ensemble(&self, record: &ParameterRecord, requested: i64) -> PredictResult<EnsembleOutcome> {
        let n = self.clamp_runs(requested);
        if n as i64 != requested {
            debug!("Requested {} runs, clamped to {}", requested, n);
        }
        let record = match self.settings.max_beads {
            Some(max_beads) => record.downscaled(max_beads),
            None => record.clone(),
        };

        let mut outcome = EnsembleOutcome {
            successes: Vec::with_capacity(n),
            failures: Vec::new(),
            requested: n,
            workers: 0,
        };

        if n == 1 {
            let result = match self.settings.timeout_secs {
                None => self.simulator.simulate(&record),
                Some(secs) => self.run_alone(record, secs).await,
            };
            self.record_result(&mut outcome, 0, result);
            return Ok(outcome);
        }

        let workers = n.min(self.settings.max_workers.max(1));
        outcome.workers = workers;
        let semaphore = Arc::new(Semaphore::new(workers));
        let record = Arc::new(record);

        let mut pending = FuturesUnordered::new();
        for index in 0..n {
            let semaphore = semaphore.clone();
            let simulator = self.simulator.clone();
            let record = record.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PredictError::simulation(format!("worker pool closed: {}", e)))?;
                tokio::task::spawn_blocking(move || simulator.simulate(&record))
                    .await
                    .map_err(|e| PredictError::simulation(format!("worker aborted: {}", e)))?
            });
            pending.push(async move {
                let result = handle
                    .await
                    .map_err(|e| PredictError::simulation(format!("worker aborted: {}", e)))
                    .and_then(|r| r);
                (index, result)
            });
        }

        let mut finished = vec![false; n];
        let collect = async {
            while let Some((index, result)) = pending.next().await {
                finished[index] = true;
                self.record_result(&mut outcome, index, result);
            }
        };
        let timed_out = match self.settings.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), collect).await.is_err(),
            None => {
                collect.await;
                false
            }
        };
        if timed_out {
            // Queued runs must not start once the caller has given up on them.
            semaphore.close();
            for index in (0..n).filter(|&i| !finished[i]) {
                warn!("Ensemble run {} still running at the deadline, discarded", index);
                outcome.failures.push(RunFailure {
                    index,
                    error: PredictError::simulation("timed out"),
                });
            }
        }

        info!(
            "Ensemble finished: {}/{} runs succeeded on {} workers",
            outcome.successes.len(),
            n,
            workers
        );
        Ok(outcome)
    }

    /// A single run under a deadline still needs its own blocking thread, but
    /// never a pool.
    async fn run_alone(&self, record: ParameterRecord, secs: u64) -> PredictResult<RunResult> {
        let simulator = self.simulator.clone();
        let handle = tokio::task::spawn_blocking(move || simulator.simulate(&record));
        match tokio::time::timeout(Duration::from_secs(secs), handle).await {
            Ok(joined) => joined.map_err(|e| PredictError::simulation(format!("worker aborted: {}", e)))?,
            Err(_) => {
                warn!("Ensemble run 0 still running at the deadline, discarded");
                Err(PredictError::simulation("timed out"))
            }
        }
    }

    /// Runs the ensemble and reduces it to mean ± sample standard deviation
    /// per tracked key.
    pub async fn predict_ensemble(&self, record: &ParameterRecord, requested: i64) -> PredictResult<AggregatedResult> {
        let outcome = self.run_ensemble(record, requested).await?;
        if outcome.successes.is_empty() {
            return Err(PredictError::NoSuccessfulRuns { requested: outcome.requested });
        }
        aggregate(&outcome.successes, &self.settings.tracked_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::pdms;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        keys: Vec<String>,
    }

    impl Simulator for Counting {
        fn simulate(&self, _record: &ParameterRecord) -> PredictResult<RunResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.keys.iter().map(|k| (k.clone(), call as f64)).collect())
        }
    }

    fn settings(keys: &[&str]) -> EnsembleSettings {
        EnsembleSettings {
            tracked_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_clamp_runs() {
        let sim = Arc::new(Counting { calls: AtomicUsize::new(0), keys: vec![] });
        let orchestrator = EnsembleOrchestrator::new(sim, EnsembleSettings::default());
        assert_eq!(orchestrator.clamp_runs(0), 1);
        assert_eq!(orchestrator.clamp_runs(-1), 1);
        assert_eq!(orchestrator.clamp_runs(15), 10);
        assert_eq!(orchestrator.clamp_runs(7), 7);
    }

    #[tokio::test]
    async fn test_incomplete_runs_are_failures() {
        let sim = Arc::new(Counting { calls: AtomicUsize::new(0), keys: vec!["g_ant".to_string()] });
        let orchestrator = EnsembleOrchestrator::new(sim, settings(&["g_ant", "g_phantom"]));
        let outcome = orchestrator.run_ensemble(&pdms(), 3).await.unwrap();
        assert!(outcome.successes.is_empty());
        assert_eq!(outcome.failures.len(), 3);
        assert!(outcome.failures.iter().all(|f| f.error.is_transient()));

        let err = orchestrator.predict_ensemble(&pdms(), 3).await.unwrap_err();
        assert!(matches!(err, PredictError::NoSuccessfulRuns { requested: 3 }));
    }

    #[tokio::test]
    async fn test_pool_is_bounded() {
        let sim = Arc::new(Counting { calls: AtomicUsize::new(0), keys: vec!["g_ant".to_string()] });
        let mut s = settings(&["g_ant"]);
        s.max_workers = 3;
        let orchestrator = EnsembleOrchestrator::new(sim.clone(), s);
        let outcome = orchestrator.run_ensemble(&pdms(), 8).await.unwrap();
        assert_eq!(outcome.workers, 3);
        assert_eq!(outcome.successes.len(), 8);
        assert_eq!(sim.calls.load(Ordering::SeqCst), 8);
    }
}
