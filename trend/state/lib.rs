use std::sync::Arc;

use derivative::Derivative;
use serde::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
    Skip,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Skip => "skip",
            Status::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl Status {
    pub fn parse(s: &str) -> Self {
        match s {
            "pass" => Status::Pass,
            "fail" => Status::Fail,
            "skip" => Status::Skip,
            _ => Status::Unknown,
        }
    }
}

/// A single event emitted by the test harness for one test.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestEvent {
    /// Seconds elapsed since the test started.
    #[serde(default)]
    pub elapsed: f64,
}

/// All events for one test within a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestGroup {
    pub test_name: String,
    pub status: Status,
    pub events: Vec<TestEvent>,
    pub start: std::time::SystemTime,
    pub end: std::time::SystemTime,
    /// Setup steps and parent groupings that should not be reported.
    #[serde(default)]
    pub hidden: bool,
}

/// Metadata about the run being reported.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ReportDetail {
    /// Environment name.
    pub name: String,
    /// Commit id.
    pub details: String,
    #[serde(rename = "PR")]
    pub pr: String,
    pub repo_name: String,
    pub repo_link: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestRecord {
    pub test_name: String,
    pub status: Status,
    pub duration: f64,
    pub order: u32,
    pub env_name: String,
    pub test_time: std::time::SystemTime,
}

/// One row of `db_environment_tests`, keyed by (commit_id, env_name).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentRunRow {
    #[serde(rename = "CommitID")]
    pub commit_id: String,
    pub env_name: String,
    #[serde(rename = "ToolTime")]
    pub persisted_at: std::time::SystemTime,
    pub test_time: std::time::SystemTime,
    pub number_of_fail: i32,
    pub number_of_pass: i32,
    pub number_of_skip: i32,
    pub total_duration: f64,
    pub tool_version: String,
}

/// One row of `db_test_cases`, keyed by (commit_id, env_name, test_name).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TestCaseRow {
    #[serde(rename = "PR")]
    pub pr: String,
    pub commit_id: String,
    pub test_name: String,
    pub result: Status,
    pub duration: f64,
    pub env_name: String,
    pub test_order: i32,
    pub test_time: std::time::SystemTime,
}

/// Result of an analytical query on a backend that may not implement it.
///
/// `Supported` with empty collections means "no data"; `Unsupported` means
/// the backend cannot answer the query at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability<T> {
    Supported(T),
    Unsupported,
}

impl<T> Capability<T> {
    pub fn is_supported(&self) -> bool { matches!(self, Capability::Supported(_)) }

    pub fn supported(self) -> Option<T> {
        match self {
            Capability::Supported(t) => Some(t),
            Capability::Unsupported => None,
        }
    }
}

impl<T: Serialize> Serialize for Capability<T> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Capability::Supported(t) => t.serialize(s),
            Capability::Unsupported => {
                use ser::SerializeMap;
                let mut m = s.serialize_map(Some(1))?;
                m.serialize_entry("unsupported", &true)?;
                m.end()
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyEnvFailure {
    pub start_of_date: String,
    pub env_name: String,
    pub avg_failed_tests: f64,
    pub avg_duration: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvSummary {
    pub env_name: String,
    pub recent_number_of_fail: f64,
    pub recent_test_duration: f64,
    pub prev_number_of_fail: f64,
    pub prev_test_duration: f64,
    pub number_of_fail_growth: f64,
    pub test_duration_growth: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub summary_avg_fail: Vec<DailyEnvFailure>,
    pub summary_table: Vec<EnvSummary>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentFlake {
    pub test_name: String,
    pub recent_flake_percentage: f64,
    pub growth_rate: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlakePoint {
    pub test_name: String,
    pub start_of_date: String,
    pub flake_percentage: f64,
    pub commit_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CountsAndDuration {
    pub start_of_date: String,
    pub number_of_runs: usize,
    pub avg_test_count: f64,
    pub avg_failed_tests: f64,
    pub avg_duration: f64,
    pub commit_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvCharts {
    pub recent_flake_percent_table: Vec<RecentFlake>,
    pub flake_rate_by_week: Vec<FlakePoint>,
    pub flake_rate_by_day: Vec<FlakePoint>,
    pub counts_and_durations: Vec<CountsAndDuration>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestFlakePoint {
    pub start_of_date: String,
    pub flake_percentage: f64,
    pub avg_duration: f64,
    pub number_of_runs: usize,
    pub commit_result_sequence: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestCharts {
    pub flake_by_day: Vec<TestFlakePoint>,
    pub flake_by_week: Vec<TestFlakePoint>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentTestsAndTestCases {
    pub db_environment_tests: Vec<EnvironmentRunRow>,
    pub db_test_cases: Vec<TestCaseRow>,
}

pub trait DB {
    /// Creates the tables if they are missing. Safe to call repeatedly.
    fn initialize(&mut self) -> anyhow::Result<()>;

    /// Upserts one run and all of its test cases atomically.
    fn set(&mut self, run: &EnvironmentRunRow, cases: &[TestCaseRow]) -> anyhow::Result<()>;

    fn get_overview(&mut self) -> anyhow::Result<Capability<Overview>> { Ok(Capability::Unsupported) }

    fn get_env_charts(&mut self, _env: &str, _tests_in_top: usize) -> anyhow::Result<Capability<EnvCharts>> {
        Ok(Capability::Unsupported)
    }

    fn get_test_charts(&mut self, _env: &str, _test: &str) -> anyhow::Result<Capability<TestCharts>> {
        Ok(Capability::Unsupported)
    }

    fn get_environment_tests_and_test_cases(&mut self) -> anyhow::Result<Capability<EnvironmentTestsAndTestCases>> {
        Ok(Capability::Unsupported)
    }
}

pub trait DBManager: std::marker::Send + std::marker::Sync {
    fn get(&self) -> anyhow::Result<Box<dyn DB>>;
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Global {
    #[derivative(Debug = "ignore")]
    pub db_manager: Arc<dyn DBManager>,
}
