use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use deluge_recording::{HttpRecorder, HttpRecordsOverTime, PersistedHttpRecordsOverTime};
use deluge_value::Value;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::Instrument as _;

use crate::config::ScenarioConfig;
use crate::error::Result;
use crate::executor::HttpExecutor;
use crate::http_call::HttpBuiltin;
use crate::script::{CompiledScript, ScriptError};
use crate::status::{ScenarioStatus, UserStatus};
use crate::user::{SimulatedUser, UserShared};

#[derive(Debug, Default)]
struct ScenarioState {
    status: ScenarioStatus,
    errors: Vec<ScriptError>,
    records: Option<HttpRecordsOverTime>,
}

/// One scenario of a run: `concurrent` simulated users sharing a recorder.
pub struct ScenarioRun {
    id: String,
    name: String,
    concurrency: usize,
    iteration_duration: Duration,
    script: Arc<dyn CompiledScript>,
    args: Arc<Value>,
    recorder: Arc<HttpRecorder>,
    effective_user_count: Arc<AtomicU64>,
    effective_exec_count: Arc<AtomicU64>,
    state: Mutex<ScenarioState>,
}

impl std::fmt::Debug for ScenarioRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioRun")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("concurrency", &self.concurrency)
            .field("iteration_duration", &self.iteration_duration)
            .finish_non_exhaustive()
    }
}

impl ScenarioRun {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        config: &ScenarioConfig,
        global_duration: Duration,
        script: Arc<dyn CompiledScript>,
    ) -> Self {
        let iteration_count = config.expected_iterations(global_duration);
        Self {
            id: id.into(),
            name: name.into(),
            concurrency: config.concurrent,
            iteration_duration: config.delay,
            script,
            args: Arc::new(Value::from(config.args.clone())),
            recorder: Arc::new(HttpRecorder::new(iteration_count, config.concurrent)),
            effective_user_count: Arc::new(AtomicU64::new(0)),
            effective_exec_count: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(ScenarioState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn iteration_duration(&self) -> Duration {
        self.iteration_duration
    }

    pub fn status(&self) -> ScenarioStatus {
        self.state.lock().status
    }

    /// Script errors of every failed user, in user order.
    pub fn errors(&self) -> Vec<ScriptError> {
        self.state.lock().errors.clone()
    }

    /// Final measurement tree, once the scenario is done.
    pub fn records(&self) -> Option<HttpRecordsOverTime> {
        self.state.lock().records.clone()
    }

    pub fn effective_user_count(&self) -> u64 {
        self.effective_user_count.load(Ordering::Relaxed)
    }

    pub fn effective_exec_count(&self) -> u64 {
        self.effective_exec_count.load(Ordering::Relaxed)
    }

    /// Live export of the tree being recorded. Fails unless the scenario is running.
    pub async fn records_snapshot(&self) -> Result<PersistedHttpRecordsOverTime> {
        Ok(self.recorder.snapshot().await?.export())
    }

    /// Runs every user until `global_duration` elapses or `interrupt` flips to `true`.
    ///
    /// # Panics
    ///
    /// When the scenario was already started.
    pub async fn run(
        self: Arc<Self>,
        global_duration: Duration,
        interrupt: watch::Receiver<bool>,
        executor: Arc<dyn HttpExecutor>,
    ) -> Result<ScenarioStatus> {
        {
            let mut state = self.state.lock();
            if state.status != ScenarioStatus::Virgin {
                panic!(
                    "scenario `{}` started twice (status {})",
                    self.id, state.status
                );
            }
            state.status = ScenarioStatus::InProgress;
        }

        tracing::info!(
            concurrency = self.concurrency,
            iteration_duration = ?self.iteration_duration,
            "scenario started"
        );
        self.recorder.start()?;

        let shared = Arc::new(UserShared {
            script: self.script.clone(),
            args: self.args.clone(),
            http: HttpBuiltin::new(executor, self.recorder.clone()),
            iteration_duration: self.iteration_duration,
            end_time: Instant::now() + global_duration,
            effective_user_count: self.effective_user_count.clone(),
            effective_exec_count: self.effective_exec_count.clone(),
        });

        let mut handles = Vec::with_capacity(self.concurrency);
        for id in 0..self.concurrency {
            let shared = shared.clone();
            let interrupt = interrupt.clone();
            let span = tracing::debug_span!("user", user = id);
            handles.push(tokio::spawn(
                async move {
                    let mut user = SimulatedUser::new(id);
                    user.run(&shared, &interrupt).await;
                    user
                }
                .instrument(span),
            ));
        }

        let mut users = Vec::with_capacity(handles.len());
        for handle in handles {
            users.push(handle.await);
        }

        self.end(users).await
    }

    async fn end(
        &self,
        users: Vec<std::result::Result<SimulatedUser, tokio::task::JoinError>>,
    ) -> Result<ScenarioStatus> {
        let closed = self.recorder.close().await;

        let mut statuses = Vec::with_capacity(users.len());
        let mut errors = Vec::new();
        for user in users {
            match user {
                Ok(user) => {
                    statuses.push(user.status());
                    if let Some(err) = user.into_error() {
                        errors.push(err);
                    }
                }
                Err(err) => {
                    statuses.push(UserStatus::DoneError);
                    errors.push(ScriptError::new(format!("simulated user crashed: {err}")));
                }
            }
        }
        let status = ScenarioStatus::from_user_statuses(statuses);

        let records = match closed.and_then(|()| self.recorder.final_records()) {
            Ok(records) => Some(records),
            Err(err) => {
                tracing::error!(error = %err, "failed to read final records");
                let mut state = self.state.lock();
                state.status = ScenarioStatus::DoneError;
                state.errors = errors;
                return Err(err.into());
            }
        };

        {
            let mut state = self.state.lock();
            state.status = status;
            state.errors = errors;
            state.records = records;
        }

        tracing::info!(
            %status,
            users = self.effective_user_count(),
            iterations = self.effective_exec_count(),
            "scenario finished"
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use async_trait::async_trait;
    use deluge_http::{HttpRequest, PendingResponse};
    use deluge_recording::OkKo;

    use super::*;
    use crate::script::Bindings;

    struct Created;

    #[async_trait]
    impl HttpExecutor for Created {
        async fn send(&self, _: HttpRequest) -> deluge_http::Result<PendingResponse> {
            Ok(PendingResponse::ready(201, Vec::new(), bytes::Bytes::new()))
        }
    }

    struct OneCall;

    #[async_trait]
    impl CompiledScript for OneCall {
        async fn evaluate(
            &self,
            bindings: &mut Bindings<'_>,
        ) -> std::result::Result<Value, ScriptError> {
            let descriptor = Value::object([("url", Value::from("http://target/"))]);
            bindings.http("create", &descriptor).await
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl CompiledScript for AlwaysFails {
        async fn evaluate(
            &self,
            _: &mut Bindings<'_>,
        ) -> std::result::Result<Value, ScriptError> {
            Err(ScriptError::new("assertion failed").with_frame("line 1"))
        }
    }

    fn scenario(
        script: Arc<dyn CompiledScript>,
        concurrent: usize,
        delay: Duration,
    ) -> Arc<ScenarioRun> {
        let config = ScenarioConfig {
            concurrent,
            delay,
            args: serde_json::Value::Null,
        };
        Arc::new(ScenarioRun::new(
            "s1",
            "scenario one",
            &config,
            Duration::from_millis(200),
            script,
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_iteration_is_recorded() -> Result<()> {
        let run = scenario(Arc::new(OneCall), 10, Duration::from_millis(10));
        let (_tx, rx) = watch::channel(false);

        let status = run
            .clone()
            .run(Duration::from_millis(200), rx, Arc::new(Created))
            .await?;

        assert_eq!(status, ScenarioStatus::DoneSuccess);
        assert_eq!(run.status(), ScenarioStatus::DoneSuccess);
        assert_eq!(run.effective_user_count(), 10);
        assert!(run.errors().is_empty());

        let execs = run.effective_exec_count();
        assert!(execs > 0);
        let records = run.records().unwrap();
        let global = &records.global.request;
        assert_eq!(global.per_status[&201].len(), execs);
        assert_eq!(global.per_ok_ko[&OkKo::Ok].len(), execs);
        assert_eq!(records.global.per_requests["create"].call_count(), execs);
        Ok(())
    }

    #[tokio::test]
    async fn failing_body_stops_each_user_after_one_iteration() -> Result<()> {
        let run = scenario(Arc::new(AlwaysFails), 10, Duration::from_millis(10));
        let (_tx, rx) = watch::channel(false);

        let status = run
            .clone()
            .run(Duration::from_millis(200), rx, Arc::new(Created))
            .await?;

        assert_eq!(status, ScenarioStatus::DoneError);
        assert_eq!(run.errors().len(), 10);
        assert_eq!(run.effective_exec_count(), 10);
        assert_eq!(run.effective_user_count(), 10);
        assert_eq!(run.errors()[0].trace(), ["line 1".to_string()]);
        assert_eq!(run.records().unwrap().global.request.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_is_rejected_outside_a_run() {
        let run = scenario(Arc::new(OneCall), 1, Duration::from_millis(10));
        assert!(run.records_snapshot().await.is_err());
        assert!(run.records().is_none());
        assert_eq!(run.status(), ScenarioStatus::Virgin);
    }

    #[tokio::test]
    #[should_panic(expected = "started twice")]
    async fn starting_twice_panics() {
        let run = scenario(Arc::new(OneCall), 1, Duration::from_millis(10));
        let (_tx, rx) = watch::channel(true);
        run.clone()
            .run(Duration::from_millis(20), rx.clone(), Arc::new(Created))
            .await
            .unwrap();
        let _ = run.run(Duration::from_millis(20), rx, Arc::new(Created)).await;
    }
}
