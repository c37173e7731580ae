use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::histogram::{Histogram, HistogramSnapshot};
use crate::http::{HttpRecord, HttpRecordsOverTime, HttpRequestRecord, OkKo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedHttpRequestRecord {
    pub global: HistogramSnapshot,
    pub per_status: BTreeMap<u16, HistogramSnapshot>,
    #[serde(rename = "perOutcome")]
    pub per_ok_ko: BTreeMap<OkKo, HistogramSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedHttpRecord {
    pub global: HistogramSnapshot,
    pub per_status: BTreeMap<u16, HistogramSnapshot>,
    #[serde(rename = "perOutcome")]
    pub per_ok_ko: BTreeMap<OkKo, HistogramSnapshot>,
    #[serde(rename = "perOperation")]
    pub per_requests: BTreeMap<String, PersistedHttpRequestRecord>,
}

/// Wire form of a measurement tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedHttpRecordsOverTime {
    pub global: PersistedHttpRecord,
    pub time_buckets: Vec<PersistedHttpRecord>,
}

fn export_map<K: Ord + Clone>(map: &BTreeMap<K, Histogram>) -> BTreeMap<K, HistogramSnapshot> {
    map.iter()
        .map(|(k, h)| (k.clone(), HistogramSnapshot::export(h)))
        .collect()
}

fn import_map<K: Ord + Clone>(
    map: &BTreeMap<K, HistogramSnapshot>,
) -> Result<BTreeMap<K, Histogram>> {
    map.iter()
        .map(|(k, s)| Ok((k.clone(), s.import()?)))
        .collect()
}

impl HttpRequestRecord {
    #[must_use]
    pub fn export(&self) -> PersistedHttpRequestRecord {
        PersistedHttpRequestRecord {
            global: HistogramSnapshot::export(&self.global),
            per_status: export_map(&self.per_status),
            per_ok_ko: export_map(&self.per_ok_ko),
        }
    }

    pub fn import(persisted: &PersistedHttpRequestRecord) -> Result<Self> {
        Ok(Self {
            global: persisted.global.import()?,
            per_status: import_map(&persisted.per_status)?,
            per_ok_ko: import_map(&persisted.per_ok_ko)?,
        })
    }
}

impl HttpRecord {
    #[must_use]
    pub fn export(&self) -> PersistedHttpRecord {
        let request = self.request.export();
        PersistedHttpRecord {
            global: request.global,
            per_status: request.per_status,
            per_ok_ko: request.per_ok_ko,
            per_requests: self
                .per_requests
                .iter()
                .map(|(name, r)| (name.clone(), r.export()))
                .collect(),
        }
    }

    pub fn import(persisted: &PersistedHttpRecord) -> Result<Self> {
        let request = HttpRequestRecord {
            global: persisted.global.import()?,
            per_status: import_map(&persisted.per_status)?,
            per_ok_ko: import_map(&persisted.per_ok_ko)?,
        };
        let per_requests = persisted
            .per_requests
            .iter()
            .map(|(name, r)| Ok((name.clone(), HttpRequestRecord::import(r)?)))
            .collect::<Result<_>>()?;
        Ok(Self {
            request,
            per_requests,
        })
    }
}

impl HttpRecordsOverTime {
    #[must_use]
    pub fn export(&self) -> PersistedHttpRecordsOverTime {
        PersistedHttpRecordsOverTime {
            global: self.global.export(),
            time_buckets: self.time_buckets.iter().map(HttpRecord::export).collect(),
        }
    }

    pub fn import(persisted: &PersistedHttpRecordsOverTime) -> Result<Self> {
        Ok(Self {
            global: HttpRecord::import(&persisted.global)?,
            time_buckets: persisted
                .time_buckets
                .iter()
                .map(HttpRecord::import)
                .collect::<Result<_>>()?,
        })
    }
}
