use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use deluge_http::HttpClient;
use deluge_recording::{HttpRecordsOverTime, HttpStatsOverTime, PersistedHttpRecordsOverTime};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::Instrument as _;

use crate::config::DelugeDefinition;
use crate::error::{Error, Result};
use crate::executor::HttpExecutor;
use crate::report::{WorkerReport, WorkerScenarioReport};
use crate::scenario::ScenarioRun;
use crate::script::ScenarioLibrary;
use crate::status::{DelugeStatus, ScenarioStatus};

/// One execution of a run plan.
pub struct DelugeRun {
    id: String,
    name: String,
    global_duration: Duration,
    scenarios: BTreeMap<String, Arc<ScenarioRun>>,
    executor: Arc<dyn HttpExecutor>,
    status: Mutex<DelugeStatus>,
    status_tx: watch::Sender<DelugeStatus>,
    interrupt_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for DelugeRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelugeRun")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("global_duration", &self.global_duration)
            .field("status", &self.status())
            .field("scenarios", &self.scenarios)
            .finish_non_exhaustive()
    }
}

impl DelugeRun {
    /// Binds every configured scenario to its compiled script.
    pub fn new(definition: &DelugeDefinition, library: &ScenarioLibrary) -> Result<Self> {
        definition.validate()?;

        let mut scenarios = BTreeMap::new();
        for (id, config) in &definition.scenarios {
            let script = library
                .get(id)
                .ok_or_else(|| Error::UnknownScenario(id.clone()))?;
            let scenario = ScenarioRun::new(
                id.clone(),
                script.name.clone(),
                config,
                definition.global_duration,
                script.script.clone(),
            );
            scenarios.insert(id.clone(), Arc::new(scenario));
        }

        let (status_tx, _) = watch::channel(DelugeStatus::Virgin);
        let (interrupt_tx, _) = watch::channel(false);

        Ok(Self {
            id: definition.id.clone(),
            name: definition.name.clone(),
            global_duration: definition.global_duration,
            scenarios,
            executor: Arc::new(HttpClient::default()),
            status: Mutex::new(DelugeStatus::Virgin),
            status_tx,
            interrupt_tx,
        })
    }

    /// Replaces the HTTP executor shared by every simulated user.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn HttpExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn global_duration(&self) -> Duration {
        self.global_duration
    }

    pub fn status(&self) -> DelugeStatus {
        *self.status.lock()
    }

    pub fn scenarios(&self) -> &BTreeMap<String, Arc<ScenarioRun>> {
        &self.scenarios
    }

    pub fn scenario(&self, id: &str) -> Option<&Arc<ScenarioRun>> {
        self.scenarios.get(id)
    }

    /// Observes every status transition of the run.
    pub fn subscribe_status(&self) -> watch::Receiver<DelugeStatus> {
        self.status_tx.subscribe()
    }

    fn set_status(&self, current: &mut DelugeStatus, next: DelugeStatus) {
        *current = next;
        self.status_tx.send_replace(next);
    }

    /// Runs all scenarios concurrently and waits for them.
    ///
    /// A run that is not in `notStarted` status is left alone: this may race with
    /// [`DelugeRun::interrupt`]. An interruption during the run is never overwritten by
    /// the natural completion status.
    pub async fn run(&self) -> Result<DelugeStatus> {
        let span = tracing::info_span!("deluge", deluge = %self.id);
        self.run_scenarios().instrument(span).await
    }

    async fn run_scenarios(&self) -> Result<DelugeStatus> {
        {
            let mut status = self.status.lock();
            let current = *status;
            if current != DelugeStatus::Virgin {
                tracing::warn!(status = %current, "deluge is not in notStarted status, not running it");
                return Ok(current);
            }
            self.set_status(&mut status, DelugeStatus::InProgress);
        }
        tracing::info!(
            name = %self.name,
            scenarios = self.scenarios.len(),
            global_duration = ?self.global_duration,
            "deluge started"
        );

        let mut handles = Vec::with_capacity(self.scenarios.len());
        for (id, scenario) in &self.scenarios {
            let span = tracing::info_span!("scenario", scenario = %id);
            let task = scenario
                .clone()
                .run(
                    self.global_duration,
                    self.interrupt_tx.subscribe(),
                    self.executor.clone(),
                )
                .instrument(span);
            handles.push((id.clone(), tokio::spawn(task)));
        }

        let mut failed = false;
        let mut first_err = None;
        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(ScenarioStatus::DoneError)) => failed = true,
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    tracing::error!(scenario = %id, error = %err, "scenario did not complete");
                    failed = true;
                    first_err.get_or_insert(err);
                }
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => {
                    tracing::error!(scenario = %id, error = %err, "scenario task was cancelled");
                    failed = true;
                }
            }
        }

        let finished = {
            let mut status = self.status.lock();
            if *status == DelugeStatus::InProgress {
                let next = if failed {
                    DelugeStatus::DoneError
                } else {
                    DelugeStatus::DoneSuccess
                };
                self.set_status(&mut status, next);
            }
            *status
        };
        tracing::info!(status = %finished, "deluge finished");

        match first_err {
            Some(err) => Err(err),
            None => Ok(finished),
        }
    }

    /// Stops the run at the next iteration boundary of every user.
    ///
    /// Returns `false` when the run had already finished or been interrupted.
    pub fn interrupt(&self) -> bool {
        let mut status = self.status.lock();
        if !matches!(*status, DelugeStatus::Virgin | DelugeStatus::InProgress) {
            return false;
        }
        self.set_status(&mut status, DelugeStatus::Interrupted);
        self.interrupt_tx.send_replace(true);
        tracing::info!(deluge = %self.id, "deluge interrupted");
        true
    }

    /// Live measurement trees of the scenarios currently running.
    pub async fn records_snapshot(&self) -> BTreeMap<String, Result<PersistedHttpRecordsOverTime>> {
        let mut out = BTreeMap::new();
        for (id, scenario) in &self.scenarios {
            if scenario.status() == ScenarioStatus::InProgress {
                out.insert(id.clone(), scenario.records_snapshot().await);
            }
        }
        out
    }

    /// Report of this run as seen by one worker of a job.
    pub fn report(&self, worker_id: impl Into<String>, job_id: impl Into<String>) -> WorkerReport {
        let scenarios = self
            .scenarios
            .iter()
            .map(|(id, scenario)| {
                let records = scenario.records();
                let report = WorkerScenarioReport {
                    status: scenario.status(),
                    errors: scenario.errors().iter().map(ToString::to_string).collect(),
                    iteration_duration: scenario.iteration_duration(),
                    stats: records.as_ref().map(HttpStatsOverTime::from_records),
                    records: records.as_ref().map(HttpRecordsOverTime::export),
                };
                (id.clone(), report)
            })
            .collect();

        WorkerReport {
            worker_id: worker_id.into(),
            job_id: job_id.into(),
            status: self.status(),
            scenarios,
        }
    }
}
