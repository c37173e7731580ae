use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use deluge_value::{ObjectMap, Value};

use crate::error::{Error, Result};
use crate::http_call::HttpBuiltin;

/// Runtime error raised by a scenario body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    message: String,
    trace: Vec<String>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: Vec::new(),
        }
    }

    /// Appends a call-site frame, innermost first.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for frame in &self.trace {
            write!(f, "\n    at {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

/// What a scenario body sees during one iteration.
pub struct Bindings<'a> {
    args: &'a Value,
    session: &'a mut ObjectMap,
    iteration: u64,
    http: &'a HttpBuiltin,
}

impl<'a> Bindings<'a> {
    pub(crate) fn new(
        args: &'a Value,
        session: &'a mut ObjectMap,
        iteration: u64,
        http: &'a HttpBuiltin,
    ) -> Self {
        Self {
            args,
            session,
            iteration,
            http,
        }
    }

    /// Run arguments, shared by every user of the scenario.
    pub fn args(&self) -> &Value {
        self.args
    }

    pub fn session(&self) -> &ObjectMap {
        &*self.session
    }

    /// Per-user state kept across iterations.
    pub fn session_mut(&mut self) -> &mut ObjectMap {
        &mut *self.session
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Timed HTTP call. `descriptor` is `{ url, method?, body?, headers? }`; the result is
    /// `{ status, headers, body }`.
    pub async fn http(
        &self,
        name: &str,
        descriptor: &Value,
    ) -> std::result::Result<Value, ScriptError> {
        self.http.call(self.iteration, name, descriptor).await
    }
}

/// A compiled scenario body.
#[async_trait]
pub trait CompiledScript: Send + Sync {
    async fn evaluate(
        &self,
        bindings: &mut Bindings<'_>,
    ) -> std::result::Result<Value, ScriptError>;
}

#[derive(Clone)]
pub struct ScenarioScript {
    pub name: String,
    pub script: Arc<dyn CompiledScript>,
}

impl fmt::Debug for ScenarioScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioScript")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Compiled scenarios by id.
#[derive(Debug, Clone, Default)]
pub struct ScenarioLibrary {
    scenarios: BTreeMap<String, ScenarioScript>,
}

impl ScenarioLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        script: Arc<dyn CompiledScript>,
    ) -> Result<()> {
        let id = id.into();
        if self.scenarios.contains_key(&id) {
            return Err(Error::DuplicateScenario(id));
        }
        self.scenarios.insert(
            id,
            ScenarioScript {
                name: name.into(),
                script,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ScenarioScript> {
        self.scenarios.get(id)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
