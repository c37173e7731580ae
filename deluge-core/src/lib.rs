//! Load generation engine: simulated users run scenario bodies at a fixed pace while every
//! HTTP call they make is recorded into latency histograms.

pub mod config;
pub mod deluge;
pub mod error;
pub mod executor;
mod http_call;
pub mod logging;
pub mod registry;
pub mod report;
pub mod scenario;
pub mod script;
pub mod status;
mod user;

pub use config::{DelugeDefinition, ScenarioConfig};
pub use deluge::DelugeRun;
pub use error::{Error, Result};
pub use executor::HttpExecutor;
pub use logging::init_tracing;
pub use registry::{RunId, RunRegistry};
pub use report::{JobReport, WorkerReport, WorkerScenarioReport, merge_worker_reports};
pub use scenario::ScenarioRun;
pub use script::{Bindings, CompiledScript, ScenarioLibrary, ScenarioScript, ScriptError};
pub use status::{DelugeStatus, ScenarioStatus, UserStatus};

pub use deluge_value::Value;
