use std::collections::BTreeMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use state::{ReportDetail, Status};

use crate::{ReportSnapshot, BUILD, VERSION};

/// Knobs for [`ShortSummary`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Skipped tests report ~0s and would skew duration trends, so they are
    /// left out of `Durations` unless this is set.
    pub include_skip_durations: bool,
}

/// Compact machine readable summary of a run: names and durations only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ShortSummary {
    pub number_of_tests: usize,
    pub number_of_fail: usize,
    pub number_of_pass: usize,
    pub number_of_skip: usize,
    pub failed_tests: Vec<String>,
    pub passed_tests: Vec<String>,
    pub skipped_tests: Vec<String>,
    pub durations: BTreeMap<String, f64>,
    pub total_duration: f64,
    pub version: String,
    pub build: String,
    pub detail: ReportDetail,
}

impl ShortSummary {
    pub(crate) fn from_snapshot(snapshot: &ReportSnapshot, opts: &SummaryOptions) -> Self {
        let mut ss = ShortSummary {
            total_duration: snapshot.total_duration(),
            version: VERSION.to_string(),
            build: BUILD.to_string(),
            detail: snapshot.detail().clone(),
            ..Default::default()
        };
        for t in snapshot.results(Status::Pass) {
            ss.passed_tests.push(t.test_name.clone());
            ss.durations.insert(t.test_name.clone(), t.duration);
        }
        for t in snapshot.results(Status::Fail) {
            ss.failed_tests.push(t.test_name.clone());
            ss.durations.insert(t.test_name.clone(), t.duration);
        }
        for t in snapshot.results(Status::Skip) {
            ss.skipped_tests.push(t.test_name.clone());
            if opts.include_skip_durations {
                ss.durations.insert(t.test_name.clone(), t.duration);
            }
        }
        ss.number_of_pass = ss.passed_tests.len();
        ss.number_of_fail = ss.failed_tests.len();
        ss.number_of_skip = ss.skipped_tests.len();
        ss.number_of_tests = ss.number_of_pass + ss.number_of_fail + ss.number_of_skip;
        ss
    }

    /// JSON with four space indentation.
    pub fn to_json_pretty(&self) -> anyhow::Result<Vec<u8>> {
        let mut buf = vec![];
        let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
        self.serialize(&mut ser).context("failed to serialize summary")?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use state::{TestEvent, TestGroup};

    use super::*;

    fn run() -> ReportSnapshot {
        let t0 = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mk = |name: &str, status, elapsed| TestGroup {
            test_name: name.to_string(),
            status,
            events: vec![TestEvent { elapsed }],
            start: t0,
            end: t0 + Duration::from_secs(3),
            hidden: false,
        };
        let groups = vec![
            mk("TestPass", Status::Pass, 2.0),
            mk("TestFail", Status::Fail, 3.0),
            mk("TestSkip", Status::Skip, 0.75),
        ];
        let detail = ReportDetail {
            name: "KVM_Linux".to_string(),
            details: "deadbeef".to_string(),
            ..Default::default()
        };
        crate::generate_at(SystemTime::now(), detail, &groups)
    }

    #[test]
    fn test_summary_excludes_skip_durations() {
        let ss = run().short_summary();
        assert_eq!(ss.number_of_tests, 3);
        assert_eq!((ss.number_of_pass, ss.number_of_fail, ss.number_of_skip), (1, 1, 1));
        assert_eq!(ss.skipped_tests, vec!["TestSkip".to_string()]);
        assert_eq!(ss.durations.len(), 2);
        assert_eq!(ss.durations["TestPass"], 2.0);
        assert_eq!(ss.durations["TestFail"], 3.0);
        assert!(!ss.durations.contains_key("TestSkip"));
        assert_eq!(ss.total_duration, 3.0);
        assert_eq!(ss.detail.name, "KVM_Linux");
    }

    #[test]
    fn test_summary_include_skip_durations() {
        let opts = SummaryOptions { include_skip_durations: true };
        let ss = run().short_summary_with(&opts);
        assert_eq!(ss.durations["TestSkip"], 0.75);
    }

    #[test]
    fn test_summary_does_not_touch_snapshot() {
        let r = run();
        let before = r.clone();
        let _ = r.short_summary();
        assert_eq!(r, before);
    }

    #[test]
    fn test_summary_json_schema() {
        let out = run().short_summary().to_json_pretty().unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("{\n    \"NumberOfTests\": 3"));
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        for key in [
            "NumberOfFail",
            "NumberOfPass",
            "NumberOfSkip",
            "FailedTests",
            "PassedTests",
            "SkippedTests",
            "Durations",
            "TotalDuration",
            "Version",
            "Build",
            "Detail",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(v["Detail"]["Name"], "KVM_Linux");
    }
}
