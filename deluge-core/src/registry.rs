use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deluge::DelugeRun;
use crate::error::{Error, Result};
use crate::status::DelugeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Runs known to this process, by id.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: DashMap<RunId, Arc<DelugeRun>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `run` under a fresh id.
    pub fn create(&self, run: DelugeRun) -> (RunId, Arc<DelugeRun>) {
        let run = Arc::new(run);
        loop {
            let id = RunId::new_v4();
            if let Entry::Vacant(slot) = self.runs.entry(id) {
                slot.insert(run.clone());
                return (id, run);
            }
        }
    }

    pub fn insert(&self, id: RunId, run: Arc<DelugeRun>) -> Result<()> {
        match self.runs.entry(id) {
            Entry::Occupied(_) => Err(Error::DuplicateRun(id)),
            Entry::Vacant(slot) => {
                slot.insert(run);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &RunId) -> Option<Arc<DelugeRun>> {
        self.runs.get(id).map(|run| run.value().clone())
    }

    /// Every run with its current status, ordered by id.
    pub fn list(&self) -> Vec<(RunId, DelugeStatus)> {
        let mut out: Vec<_> = self
            .runs
            .iter()
            .map(|run| (*run.key(), run.value().status()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Returns whether the interruption took effect.
    pub fn interrupt(&self, id: &RunId) -> Result<bool> {
        let run = self.get(id).ok_or(Error::UnknownRun(*id))?;
        Ok(run.interrupt())
    }

    /// Forgets a finished run.
    pub fn remove(&self, id: &RunId) -> Result<Arc<DelugeRun>> {
        match self.runs.entry(*id) {
            Entry::Vacant(_) => Err(Error::UnknownRun(*id)),
            Entry::Occupied(slot) => {
                let status = slot.get().status();
                if !status.is_terminal() {
                    return Err(Error::RunNotFinished { id: *id, status });
                }
                Ok(slot.remove())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
