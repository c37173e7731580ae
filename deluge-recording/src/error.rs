use crate::recorder::RecorderState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("recorder cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: RecorderState,
    },

    #[error("final records are not available while recorder is {state}")]
    NotReady { state: RecorderState },

    #[error("recorder consumer is no longer running")]
    Closed,

    #[error("recorder consumer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("histogram error: {0}")]
    Histogram(String),
}
