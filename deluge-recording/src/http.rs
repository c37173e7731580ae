use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::histogram::{
    Histogram, duration_to_millis, merge_into, new_histogram, record_saturating,
};
use crate::recorder::{Aggregator, Recorder, RecorderState};

/// Upper bound on the number of time buckets, whatever the iteration count.
pub const MAX_BUCKETS: u64 = 360;

/// Outcome class of a call: `Ok` below status 400, `Ko` otherwise.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum OkKo {
    Ok,
    Ko,
}

impl OkKo {
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        if status < 400 { Self::Ok } else { Self::Ko }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequestRecord {
    pub global: Histogram,
    pub per_status: BTreeMap<u16, Histogram>,
    pub per_ok_ko: BTreeMap<OkKo, Histogram>,
}

impl Default for HttpRequestRecord {
    fn default() -> Self {
        Self {
            global: new_histogram(),
            per_status: BTreeMap::new(),
            per_ok_ko: BTreeMap::new(),
        }
    }
}

impl HttpRequestRecord {
    pub fn add(&mut self, value: u64, status: u16) {
        record_saturating(&mut self.global, value);
        record_saturating(
            self.per_status.entry(status).or_insert_with(new_histogram),
            value,
        );
        record_saturating(
            self.per_ok_ko
                .entry(OkKo::from_status(status))
                .or_insert_with(new_histogram),
            value,
        );
    }

    pub fn merge(&mut self, other: &Self) {
        merge_into(&mut self.global, &other.global);
        merge_map(&mut self.per_status, &other.per_status);
        merge_map(&mut self.per_ok_ko, &other.per_ok_ko);
    }

    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.global.len()
    }
}

fn merge_map<K: Ord + Clone>(dst: &mut BTreeMap<K, Histogram>, src: &BTreeMap<K, Histogram>) {
    for (key, h) in src {
        match dst.get_mut(key) {
            Some(cur) => merge_into(cur, h),
            None => {
                dst.insert(key.clone(), h.clone());
            }
        }
    }
}

/// Aggregate over all calls plus one nested aggregate per operation name.
#[derive(Debug, Clone, Default)]
pub struct HttpRecord {
    pub request: HttpRequestRecord,
    pub per_requests: BTreeMap<String, HttpRequestRecord>,
}

impl HttpRecord {
    pub fn add(&mut self, name: &str, value: u64, status: u16) {
        self.request.add(value, status);
        match self.per_requests.get_mut(name) {
            Some(per_request) => per_request.add(value, status),
            None => {
                let mut per_request = HttpRequestRecord::default();
                per_request.add(value, status);
                self.per_requests.insert(name.to_string(), per_request);
            }
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.request.merge(&other.request);
        for (name, record) in &other.per_requests {
            match self.per_requests.get_mut(name) {
                Some(cur) => cur.merge(record),
                None => {
                    self.per_requests.insert(name.clone(), record.clone());
                }
            }
        }
    }
}

/// Measurement tree of a scenario: one global aggregate and the time buckets.
///
/// `Clone` is a deep copy: no histogram is shared between the clone and the source.
#[derive(Debug, Clone, Default)]
pub struct HttpRecordsOverTime {
    pub global: HttpRecord,
    pub time_buckets: Vec<HttpRecord>,
}

impl HttpRecordsOverTime {
    /// Merges `other` into `self`. Buckets are paired by index; the tail of the
    /// longer list is carried over as is.
    pub fn merge(&mut self, other: &Self) {
        self.global.merge(&other.global);
        for (cur, bucket) in self.time_buckets.iter_mut().zip(&other.time_buckets) {
            cur.merge(bucket);
        }
        if other.time_buckets.len() > self.time_buckets.len() {
            let tail = &other.time_buckets[self.time_buckets.len()..];
            self.time_buckets.extend(tail.iter().cloned());
        }
    }
}

/// Nil-tolerant merge of two trees. The result never shares state with its inputs.
#[must_use]
pub fn merge_records(
    a: Option<&HttpRecordsOverTime>,
    b: Option<&HttpRecordsOverTime>,
) -> Option<HttpRecordsOverTime> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (Some(a), Some(b)) => {
            let mut merged = a.clone();
            merged.merge(b);
            Some(merged)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRecordEntry {
    pub iteration: u64,
    pub name: String,
    /// Latency in milliseconds.
    pub value: u64,
    pub status: u16,
}

pub struct HttpAggregator {
    records: HttpRecordsOverTime,
    iteration_count: u64,
    bucket_count: u64,
}

impl HttpAggregator {
    #[must_use]
    pub fn new(iteration_count: u64) -> Self {
        let iteration_count = iteration_count.max(1);
        Self {
            records: HttpRecordsOverTime::default(),
            iteration_count,
            bucket_count: iteration_count.min(MAX_BUCKETS),
        }
    }

    fn bucket_index(&self, iteration: u64) -> usize {
        let index = u128::from(iteration) * u128::from(self.bucket_count)
            / u128::from(self.iteration_count);
        let index = index.min(u128::from(self.bucket_count - 1));
        usize::try_from(index).unwrap_or(usize::MAX)
    }
}

impl Aggregator for HttpAggregator {
    type Entry = HttpRecordEntry;
    type Snapshot = HttpRecordsOverTime;

    fn apply(&mut self, entry: HttpRecordEntry) {
        self.records
            .global
            .add(&entry.name, entry.value, entry.status);

        let index = self.bucket_index(entry.iteration);
        if self.records.time_buckets.len() <= index {
            self.records
                .time_buckets
                .resize_with(index + 1, HttpRecord::default);
        }
        self.records.time_buckets[index].add(&entry.name, entry.value, entry.status);
    }

    fn snapshot(&self) -> HttpRecordsOverTime {
        self.records.clone()
    }
}

/// Recorder building a scenario's measurement tree.
pub struct HttpRecorder {
    inner: Recorder<HttpAggregator>,
}

impl HttpRecorder {
    /// `iteration_count` is the expected number of iterations per user; the channel
    /// holds one pending entry per concurrent user.
    #[must_use]
    pub fn new(iteration_count: u64, concurrency: usize) -> Self {
        Self {
            inner: Recorder::new(HttpAggregator::new(iteration_count), concurrency),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.inner.state()
    }

    pub fn start(&self) -> Result<()> {
        self.inner.start()
    }

    pub fn record(&self, entry: HttpRecordEntry) -> Result<()> {
        self.inner.record(entry)
    }

    pub fn add_http_record(
        &self,
        iteration: u64,
        name: &str,
        elapsed: Duration,
        status: u16,
    ) -> Result<()> {
        self.record(HttpRecordEntry {
            iteration,
            name: name.to_string(),
            value: duration_to_millis(elapsed),
            status,
        })
    }

    pub async fn snapshot(&self) -> Result<HttpRecordsOverTime> {
        self.inner.snapshot().await
    }

    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    pub fn final_records(&self) -> Result<HttpRecordsOverTime> {
        self.inner.final_records()
    }
}
