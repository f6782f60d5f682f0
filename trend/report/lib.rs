use std::{collections::BTreeMap, time::SystemTime};

use anyhow::Context;
use serde::Serialize;
use state::{EnvironmentRunRow, ReportDetail, Status, TestCaseRow, TestGroup, TestRecord};
use tracing::instrument;

mod summary;

pub use summary::{ShortSummary, SummaryOptions};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD: &str = match option_env!("TREND_BUILD") {
    Some(b) => b,
    None => "dev",
};

const BUCKETS: [Status; 3] = [Status::Pass, Status::Fail, Status::Skip];

/// The aggregated result of one test run. Built once by [`generate`] and
/// only read afterwards.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ReportSnapshot {
    results: BTreeMap<Status, Vec<TestRecord>>,
    total_tests: usize,
    total_duration: f64,
    build_version: String,
    created_on: SystemTime,
    detail: ReportDetail,
    test_time: SystemTime,
}

impl ReportSnapshot {
    /// Records for one status in encounter order. Always empty for
    /// [`Status::Unknown`].
    pub fn results(&self, status: Status) -> &[TestRecord] {
        self.results.get(&status).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn total_tests(&self) -> usize { self.total_tests }

    /// Wall time of the run in seconds, rounded to two decimals.
    pub fn total_duration(&self) -> f64 { self.total_duration }

    pub fn build_version(&self) -> &str { &self.build_version }

    pub fn created_on(&self) -> SystemTime { self.created_on }

    pub fn detail(&self) -> &ReportDetail { &self.detail }

    /// Start of the earliest test in the run.
    pub fn test_time(&self) -> SystemTime { self.test_time }

    pub fn short_summary(&self) -> ShortSummary { self.short_summary_with(&SummaryOptions::default()) }

    pub fn short_summary_with(&self, opts: &SummaryOptions) -> ShortSummary { ShortSummary::from_snapshot(self, opts) }

    /// Rows to persist for this run: the environment run row and one test
    /// case row per reported test (pass, then fail, then skip).
    pub fn persistence_rows(&self, persisted_at: SystemTime) -> (EnvironmentRunRow, Vec<TestCaseRow>) {
        let cases = BUCKETS
            .iter()
            .flat_map(|s| self.results(*s).iter().map(move |t| (s, t)))
            .map(|(s, t)| TestCaseRow {
                pr: self.detail.pr.clone(),
                commit_id: self.detail.details.clone(),
                test_name: t.test_name.clone(),
                result: *s,
                duration: t.duration,
                env_name: self.detail.name.clone(),
                test_order: t.order as i32,
                test_time: self.test_time,
            })
            .collect::<Vec<_>>();
        let run = EnvironmentRunRow {
            commit_id: self.detail.details.clone(),
            env_name: self.detail.name.clone(),
            persisted_at,
            test_time: self.test_time,
            number_of_fail: self.results(Status::Fail).len() as i32,
            number_of_pass: self.results(Status::Pass).len() as i32,
            number_of_skip: self.results(Status::Skip).len() as i32,
            total_duration: self.total_duration,
            tool_version: self.build_version.clone(),
        };
        (run, cases)
    }

    /// Pretty JSON of the full snapshot for raw output.
    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }
}

/// Aggregates the groups of one run into a [`ReportSnapshot`].
pub fn generate(detail: ReportDetail, groups: &[TestGroup]) -> ReportSnapshot {
    generate_at(SystemTime::now(), detail, groups)
}

/// Same as [`generate`] with an explicit clock, used for the creation time
/// and as the run bounds when there are no groups.
pub fn generate_at(now: SystemTime, detail: ReportDetail, groups: &[TestGroup]) -> ReportSnapshot {
    // A run's span is not first-group-to-last-group: groups overlap and
    // arrive in any order.
    let (start, end) = match groups.first() {
        Some(first) => groups
            .iter()
            .fold((first.start, first.end), |(s, e), g| (s.min(g.start), e.max(g.end))),
        None => (now, now),
    };
    let mut results: BTreeMap<Status, Vec<TestRecord>> = BUCKETS.iter().map(|s| (*s, vec![])).collect();

    for (i, g) in groups.iter().enumerate() {
        // Hidden groups still take a slot so positions stay stable.
        let order = i as u32 + 1;
        if g.hidden {
            continue;
        }
        let Some(bucket) = results.get_mut(&g.status) else {
            tracing::debug!("dropping {} with status {}", g.test_name, g.status);
            continue;
        };
        bucket.push(TestRecord {
            test_name: g.test_name.clone(),
            status: g.status,
            duration: g.events.last().map(|e| e.elapsed).unwrap_or(0.0),
            order,
            env_name: detail.name.clone(),
            test_time: start,
        });
    }

    let total_tests = results.values().map(Vec::len).sum();
    let span = end.duration_since(start).unwrap_or_default();
    ReportSnapshot {
        results,
        total_tests,
        total_duration: (span.as_secs_f64() * 100.0).round() / 100.0,
        build_version: format!("{VERSION}_{BUILD}"),
        created_on: now,
        detail,
        test_time: start,
    }
}

/// Creates the tables if needed and stores the snapshot's rows.
#[instrument(skip_all, fields(env = %snapshot.detail().name, commit = %snapshot.detail().details))]
pub fn persist(snapshot: &ReportSnapshot, db: &mut dyn state::DB) -> anyhow::Result<()> {
    db.initialize().context("failed to initialize database")?;
    let (run, cases) = snapshot.persistence_rows(SystemTime::now());
    db.set(&run, &cases)?;
    tracing::info!("persisted {} test cases", cases.len());
    Ok(())
}
