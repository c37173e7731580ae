use std::collections::BTreeMap;
use std::time::Duration;

use deluge_recording::{
    HttpRecordsOverTime, HttpStatsOverTime, PersistedHttpRecordsOverTime, merge_records,
};
use serde::{Deserialize, Serialize};

use crate::config::duration_format;
use crate::error::{Error, Result};
use crate::status::{DelugeStatus, ScenarioStatus};

/// What one worker sends back once its share of a job is done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReport {
    pub worker_id: String,
    pub job_id: String,
    pub status: DelugeStatus,
    pub scenarios: BTreeMap<String, WorkerScenarioReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerScenarioReport {
    pub status: ScenarioStatus,

    #[serde(default)]
    pub errors: Vec<String>,

    #[serde(with = "duration_format")]
    pub iteration_duration: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<PersistedHttpRecordsOverTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<HttpStatsOverTime>,
}

/// Consolidated view of every worker report of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: String,
    pub status: DelugeStatus,
    pub workers: Vec<String>,
    pub scenarios: BTreeMap<String, WorkerScenarioReport>,
}

struct ScenarioAcc {
    status: ScenarioStatus,
    errors: Vec<String>,
    iteration_duration: Duration,
    records: Option<HttpRecordsOverTime>,
}

/// Merges worker reports into one job report.
///
/// Reports are processed by worker id, so the result does not depend on arrival order.
/// Reports of another job are skipped; two reports from one worker are an error.
pub fn merge_worker_reports(job_id: &str, reports: &[WorkerReport]) -> Result<JobReport> {
    let mut sorted: Vec<&WorkerReport> = reports
        .iter()
        .filter(|report| {
            let same_job = report.job_id == job_id;
            if !same_job {
                tracing::warn!(
                    worker = %report.worker_id,
                    job = %report.job_id,
                    expected = %job_id,
                    "ignoring report of another job"
                );
            }
            same_job
        })
        .collect();
    sorted.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0].worker_id == pair[1].worker_id) {
        return Err(Error::DuplicateWorker(pair[0].worker_id.clone()));
    }

    let mut status = DelugeStatus::Virgin;
    let mut workers = Vec::with_capacity(sorted.len());
    let mut scenarios: BTreeMap<String, ScenarioAcc> = BTreeMap::new();

    for report in sorted {
        status = status.merge(report.status);
        workers.push(report.worker_id.clone());

        for (id, scenario) in &report.scenarios {
            let imported = scenario
                .records
                .as_ref()
                .map(HttpRecordsOverTime::import)
                .transpose()?;

            match scenarios.get_mut(id) {
                Some(acc) => {
                    acc.status = acc.status.merge(scenario.status);
                    acc.errors.extend(scenario.errors.iter().cloned());
                    acc.records = merge_records(acc.records.as_ref(), imported.as_ref());
                }
                None => {
                    scenarios.insert(
                        id.clone(),
                        ScenarioAcc {
                            status: scenario.status,
                            errors: scenario.errors.clone(),
                            iteration_duration: scenario.iteration_duration,
                            records: imported,
                        },
                    );
                }
            }
        }
    }

    let scenarios = scenarios
        .into_iter()
        .map(|(id, acc)| {
            let report = WorkerScenarioReport {
                status: acc.status,
                errors: acc.errors,
                iteration_duration: acc.iteration_duration,
                stats: acc.records.as_ref().map(HttpStatsOverTime::from_records),
                records: acc.records.as_ref().map(HttpRecordsOverTime::export),
            };
            (id, report)
        })
        .collect();

    Ok(JobReport {
        job_id: job_id.to_string(),
        status,
        workers,
        scenarios,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use deluge_recording::{HttpRecordEntry, HttpRecorder};

    use super::*;

    async fn records(calls: &[(u64, &str, u64, u16)]) -> PersistedHttpRecordsOverTime {
        let recorder = HttpRecorder::new(4, 2);
        recorder.start().unwrap();
        for &(iteration, name, ms, status) in calls {
            recorder
                .record(HttpRecordEntry {
                    iteration,
                    name: name.to_string(),
                    value: ms,
                    status,
                })
                .unwrap();
        }
        recorder.close().await.unwrap();
        recorder.final_records().unwrap().export()
    }

    fn worker(
        id: &str,
        status: DelugeStatus,
        scenario: ScenarioStatus,
        errors: &[&str],
        records: Option<PersistedHttpRecordsOverTime>,
    ) -> WorkerReport {
        WorkerReport {
            worker_id: id.to_string(),
            job_id: "job".to_string(),
            status,
            scenarios: BTreeMap::from([(
                "s1".to_string(),
                WorkerScenarioReport {
                    status: scenario,
                    errors: errors.iter().map(ToString::to_string).collect(),
                    iteration_duration: Duration::from_millis(10),
                    records,
                    stats: None,
                },
            )]),
        }
    }

    #[tokio::test]
    async fn merge_does_not_depend_on_arrival_order() {
        let a = worker(
            "w-a",
            DelugeStatus::DoneSuccess,
            ScenarioStatus::DoneSuccess,
            &[],
            Some(records(&[(0, "home", 10, 200), (3, "home", 20, 200)]).await),
        );
        let b = worker(
            "w-b",
            DelugeStatus::DoneError,
            ScenarioStatus::DoneError,
            &["boom"],
            Some(records(&[(1, "home", 30, 500), (1, "login", 5, 200)]).await),
        );
        let c = worker(
            "w-c",
            DelugeStatus::Interrupted,
            ScenarioStatus::Interrupted,
            &["late"],
            None,
        );

        let forward = merge_worker_reports("job", &[a.clone(), b.clone(), c.clone()]).unwrap();
        let backward = merge_worker_reports("job", &[c, b, a]).unwrap();
        assert_eq!(forward, backward);

        assert_eq!(forward.status, DelugeStatus::DoneError);
        assert_eq!(forward.workers, ["w-a", "w-b", "w-c"]);
        let s1 = &forward.scenarios["s1"];
        assert_eq!(s1.status, ScenarioStatus::DoneError);
        assert_eq!(s1.errors, ["boom", "late"]);

        let records = s1.records.as_ref().unwrap();
        assert_eq!(records.global.global.count(), 4);
        assert_eq!(records.global.per_status[&500].count(), 1);
        assert_eq!(records.global.per_requests["login"].global.count(), 1);

        let stats = s1.stats.as_ref().unwrap();
        assert_eq!(stats.global.request.global.call_count, 4);
        assert_eq!(stats.global.request.global.max_time, 30);
        assert_eq!(stats.global.request.per_status[&500].min_time, 30);
        assert_eq!(stats.global.per_requests["home"].global.call_count, 3);
    }

    #[test]
    fn two_reports_from_one_worker_are_rejected() {
        let first = worker(
            "w-a",
            DelugeStatus::DoneSuccess,
            ScenarioStatus::DoneSuccess,
            &[],
            None,
        );
        let second = worker(
            "w-a",
            DelugeStatus::DoneError,
            ScenarioStatus::DoneError,
            &["boom"],
            None,
        );
        let other = worker(
            "w-b",
            DelugeStatus::DoneSuccess,
            ScenarioStatus::DoneSuccess,
            &[],
            None,
        );

        assert!(matches!(
            merge_worker_reports("job", &[first.clone(), other.clone(), second.clone()]),
            Err(Error::DuplicateWorker(id)) if id == "w-a"
        ));
        assert!(matches!(
            merge_worker_reports("job", &[second, other, first]),
            Err(Error::DuplicateWorker(_))
        ));
    }

    #[test]
    fn reports_of_other_jobs_are_skipped() {
        let mut other = worker(
            "w-x",
            DelugeStatus::DoneError,
            ScenarioStatus::DoneError,
            &["nope"],
            None,
        );
        other.job_id = "other".to_string();
        let mine = worker(
            "w-a",
            DelugeStatus::DoneSuccess,
            ScenarioStatus::DoneSuccess,
            &[],
            None,
        );

        let merged = merge_worker_reports("job", &[other, mine]).unwrap();
        assert_eq!(merged.status, DelugeStatus::DoneSuccess);
        assert_eq!(merged.workers, ["w-a"]);
        assert!(merged.scenarios["s1"].records.is_none());
        assert!(merged.scenarios["s1"].stats.is_none());
    }

    #[test]
    fn report_serializes_in_camel_case() {
        let report = worker(
            "w-a",
            DelugeStatus::Virgin,
            ScenarioStatus::Virgin,
            &[],
            None,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["workerId"], "w-a");
        assert_eq!(json["status"], "notStarted");
        assert_eq!(json["scenarios"]["s1"]["iterationDuration"], "10ms");
        assert!(json["scenarios"]["s1"].get("records").is_none());
        assert!(json["scenarios"]["s1"].get("stats").is_none());

        let back: WorkerReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
