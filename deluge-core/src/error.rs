use crate::registry::RunId;
use crate::status::DelugeStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML deluge definition: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON deluge definition: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scenario `{0}`: `concurrent` must be a positive integer")]
    InvalidConcurrency(String),

    #[error("scenario `{0}`: `delay` must be a positive duration")]
    InvalidDelay(String),

    #[error("`globalDuration` must be a positive duration")]
    InvalidDuration,

    #[error("scenario `{0}` is defined twice")]
    DuplicateScenario(String),

    #[error("scenario `{0}` is configured but has no script")]
    UnknownScenario(String),

    #[error("deluge `{0}` configures no scenario")]
    NoScenario(String),

    #[error("recording error: {0}")]
    Recording(#[from] deluge_recording::Error),

    #[error("run {0} already exists")]
    DuplicateRun(RunId),

    #[error("run {0} does not exist")]
    UnknownRun(RunId),

    #[error("run {id} is still {status}")]
    RunNotFinished { id: RunId, status: DelugeStatus },

    #[error("worker `{0}` reported twice")]
    DuplicateWorker(String),
}
