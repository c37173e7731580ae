use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Latency histogram. Values are whole milliseconds.
pub type Histogram = hdrhistogram::Histogram<u64>;

pub const HISTOGRAM_LOW: u64 = 1;
/// One hour in milliseconds.
pub const HISTOGRAM_HIGH: u64 = 3_600_000;
pub const HISTOGRAM_SIGFIG: u8 = 3;

pub fn new_histogram() -> Histogram {
    match Histogram::new_with_bounds(HISTOGRAM_LOW, HISTOGRAM_HIGH, HISTOGRAM_SIGFIG) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Elapsed time in the histogram unit (nanoseconds / 1,000,000).
#[must_use]
pub fn duration_to_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos() / 1_000_000).unwrap_or(u64::MAX)
}

/// Values above the histogram's upper bound are clamped to it.
pub fn record_saturating(h: &mut Histogram, value: u64) {
    h.saturating_record(value);
}

/// Adds every count of `src` into `dst`, clamping values `dst` cannot track.
pub fn merge_into(dst: &mut Histogram, src: &Histogram) {
    if dst.add(src).is_ok() {
        return;
    }
    for v in src.iter_recorded() {
        dst.saturating_record_n(v.value_iterated_to(), v.count_at_value());
    }
}

/// Self-describing export of a histogram: its bounds plus every non-empty bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramSnapshot {
    pub low: u64,
    pub high: u64,
    pub sigfig: u8,
    /// `(value, count)` per recorded bucket, ascending by value.
    pub counts: Vec<(u64, u64)>,
}

impl HistogramSnapshot {
    #[must_use]
    pub fn export(h: &Histogram) -> Self {
        Self {
            low: h.low(),
            high: h.high(),
            sigfig: h.sigfig(),
            counts: h
                .iter_recorded()
                .map(|v| (v.value_iterated_to(), v.count_at_value()))
                .collect(),
        }
    }

    pub fn import(&self) -> Result<Histogram> {
        let mut h = Histogram::new_with_bounds(self.low, self.high, self.sigfig)
            .map_err(|e| Error::Histogram(e.to_string()))?;
        for &(value, count) in &self.counts {
            h.record_n(value, count)
                .map_err(|e| Error::Histogram(e.to_string()))?;
        }
        Ok(h)
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.counts.iter().map(|(_, c)| c).sum()
    }
}
