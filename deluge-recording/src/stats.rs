use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::histogram::Histogram;
use crate::http::{HttpRecord, HttpRecordsOverTime, HttpRequestRecord, OkKo};

/// Percentiles reported for every histogram.
pub const QUANTILES: [u8; 5] = [50, 75, 90, 95, 99];

/// Latency figures of one histogram, in milliseconds. All zero when nothing was recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub call_count: u64,
    pub min_time: u64,
    pub max_time: u64,
    pub mean_time: f64,
    pub value_at_quantiles: BTreeMap<u8, u64>,
}

impl Stats {
    #[must_use]
    pub fn from_histogram(h: &Histogram) -> Self {
        let call_count = h.len();
        if call_count == 0 {
            return Self {
                value_at_quantiles: QUANTILES.iter().map(|&q| (q, 0)).collect(),
                ..Self::default()
            };
        }
        Self {
            call_count,
            min_time: h.min(),
            max_time: h.max(),
            mean_time: h.mean(),
            value_at_quantiles: QUANTILES
                .iter()
                .map(|&q| (q, h.value_at_quantile(f64::from(q) / 100.0)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestStats {
    pub global: Stats,
    #[serde(default)]
    pub per_status: BTreeMap<u16, Stats>,
    #[serde(default)]
    pub per_ok_ko: BTreeMap<OkKo, Stats>,
}

impl HttpRequestStats {
    #[must_use]
    pub fn from_record(record: &HttpRequestRecord) -> Self {
        Self {
            global: Stats::from_histogram(&record.global),
            per_status: stats_map(&record.per_status),
            per_ok_ko: stats_map(&record.per_ok_ko),
        }
    }
}

fn stats_map<K: Ord + Clone>(histograms: &BTreeMap<K, Histogram>) -> BTreeMap<K, Stats> {
    histograms
        .iter()
        .map(|(key, h)| (key.clone(), Stats::from_histogram(h)))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpStats {
    pub request: HttpRequestStats,
    #[serde(default)]
    pub per_requests: BTreeMap<String, HttpRequestStats>,
}

impl HttpStats {
    #[must_use]
    pub fn from_record(record: &HttpRecord) -> Self {
        Self {
            request: HttpRequestStats::from_record(&record.request),
            per_requests: record
                .per_requests
                .iter()
                .map(|(name, r)| (name.clone(), HttpRequestStats::from_record(r)))
                .collect(),
        }
    }
}

/// Readable summary of a scenario's measurement tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpStatsOverTime {
    pub global: HttpStats,
    #[serde(default)]
    pub per_iteration: Vec<HttpStats>,
}

impl HttpStatsOverTime {
    #[must_use]
    pub fn from_records(records: &HttpRecordsOverTime) -> Self {
        Self {
            global: HttpStats::from_record(&records.global),
            per_iteration: records.time_buckets.iter().map(HttpStats::from_record).collect(),
        }
    }
}
