pub mod error;
pub mod histogram;
pub mod http;
pub mod persisted;
pub mod recorder;
pub mod stats;

pub use error::{Error, Result};
pub use histogram::{Histogram, HistogramSnapshot, duration_to_millis};
pub use http::{
    HttpRecord, HttpRecordEntry, HttpRecorder, HttpRecordsOverTime, HttpRequestRecord,
    MAX_BUCKETS, OkKo, merge_records,
};
pub use persisted::{
    PersistedHttpRecord, PersistedHttpRecordsOverTime, PersistedHttpRequestRecord,
};
pub use recorder::{Aggregator, Recorder, RecorderState};
pub use stats::{HttpRequestStats, HttpStats, HttpStatsOverTime, Stats};
