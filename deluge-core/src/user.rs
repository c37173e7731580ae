use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use deluge_value::{ObjectMap, Value};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::http_call::HttpBuiltin;
use crate::script::{Bindings, CompiledScript, ScriptError};
use crate::status::UserStatus;

/// Everything the users of one scenario share.
pub(crate) struct UserShared {
    pub(crate) script: Arc<dyn CompiledScript>,
    pub(crate) args: Arc<Value>,
    pub(crate) http: HttpBuiltin,
    pub(crate) iteration_duration: Duration,
    pub(crate) end_time: Instant,
    pub(crate) effective_user_count: Arc<AtomicU64>,
    pub(crate) effective_exec_count: Arc<AtomicU64>,
}

#[derive(Debug)]
pub(crate) struct SimulatedUser {
    id: usize,
    iteration: u64,
    session: ObjectMap,
    status: UserStatus,
    error: Option<ScriptError>,
}

impl SimulatedUser {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            iteration: 0,
            session: ObjectMap::default(),
            status: UserStatus::Virgin,
            error: None,
        }
    }

    pub(crate) fn status(&self) -> UserStatus {
        self.status
    }

    pub(crate) fn into_error(self) -> Option<ScriptError> {
        self.error
    }

    /// Iterates until the deadline, an interruption or a script error.
    ///
    /// Interruption and the deadline are checked before each iteration only; an
    /// iteration in progress always completes.
    pub(crate) async fn run(&mut self, shared: &UserShared, interrupt: &watch::Receiver<bool>) {
        if self.status != UserStatus::Virgin {
            panic!("simulated user {} already ran (status {})", self.id, self.status);
        }
        self.status = UserStatus::InProgress;

        loop {
            if *interrupt.borrow() {
                self.status = UserStatus::Interrupted;
                break;
            }

            let started = Instant::now();
            if started >= shared.end_time {
                self.status = UserStatus::DoneSuccess;
                break;
            }

            let iteration_end = started + shared.iteration_duration;
            let result = {
                let mut bindings = Bindings::new(
                    &shared.args,
                    &mut self.session,
                    self.iteration,
                    &shared.http,
                );
                shared.script.evaluate(&mut bindings).await
            };
            shared.effective_exec_count.fetch_add(1, Ordering::Relaxed);

            if let Err(err) = result {
                tracing::warn!(
                    user = self.id,
                    iteration = self.iteration,
                    error = %err,
                    "scenario body failed"
                );
                self.status = UserStatus::DoneError;
                self.error = Some(err);
                break;
            }
            tracing::debug!(user = self.id, iteration = self.iteration, "iteration done");
            self.iteration += 1;

            if iteration_end < shared.end_time {
                tokio::time::sleep_until(iteration_end).await;
            } else {
                self.status = UserStatus::DoneSuccess;
                break;
            }
        }

        shared.effective_user_count.fetch_add(1, Ordering::Relaxed);
    }
}
