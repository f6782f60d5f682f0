//! Fixed aggregate shapes computed over rows loaded by a backend.
//!
//! Backends only filter by environment, test and time window; everything
//! else happens here so every backend answers the same way.

use std::{
    collections::{BTreeMap, HashMap},
    time::{Duration, SystemTime},
};

use state::{
    CountsAndDuration, DailyEnvFailure, EnvCharts, EnvSummary, EnvironmentRunRow, FlakePoint, Overview,
    RecentFlake, Status, TestCaseRow, TestCharts, TestFlakePoint,
};

use crate::timefmt::{day_of, week_of};

/// How far back the overview and charts look.
pub(crate) const CHART_WINDOW_DAYS: u64 = 90;
/// Length of the "recent" and "previous" windows used for growth.
pub(crate) const RECENT_WINDOW_DAYS: u64 = 15;

fn days_before(now: SystemTime, days: u64) -> SystemTime {
    now.checked_sub(Duration::from_secs(days * 24 * 60 * 60))
        .unwrap_or(std::time::UNIX_EPOCH)
}

/// Oldest test time included in any analytical query.
pub(crate) fn window_start(now: SystemTime) -> SystemTime { days_before(now, CHART_WINDOW_DAYS) }

fn round2(x: f64) -> f64 { (x * 100.0).round() / 100.0 }

fn mean(xs: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = xs.fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if n == 0 {
        return 0.0;
    }
    round2(sum / n as f64)
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Flake {
    pass: usize,
    fail: usize,
}

impl Flake {
    fn of<'a>(cases: impl Iterator<Item = &'a TestCaseRow>) -> Self {
        cases.fold(Flake::default(), |mut f, c| {
            match c.result {
                Status::Pass => f.pass += 1,
                Status::Fail => f.fail += 1,
                _ => {},
            }
            f
        })
    }

    fn runs(&self) -> usize { self.pass + self.fail }

    /// Share of non-skipped runs that disagreed with the most common result.
    fn percentage(&self) -> f64 {
        if self.runs() == 0 {
            return 0.0;
        }
        round2(100.0 * self.pass.min(self.fail) as f64 / self.runs() as f64)
    }
}

pub(crate) fn overview(now: SystemTime, runs: &[EnvironmentRunRow]) -> Overview {
    let start = window_start(now);
    let recent = days_before(now, RECENT_WINDOW_DAYS);
    let prev = days_before(now, 2 * RECENT_WINDOW_DAYS);

    let mut daily: BTreeMap<(time::Date, &str), Vec<&EnvironmentRunRow>> = BTreeMap::new();
    let mut by_env: BTreeMap<&str, Vec<&EnvironmentRunRow>> = BTreeMap::new();
    for r in runs.iter().filter(|r| r.test_time >= start) {
        daily.entry((day_of(&r.test_time), r.env_name.as_str())).or_default().push(r);
        by_env.entry(r.env_name.as_str()).or_default().push(r);
    }

    let summary_avg_fail = daily
        .into_iter()
        .map(|((day, env), rs)| DailyEnvFailure {
            start_of_date: day.to_string(),
            env_name: env.to_string(),
            avg_failed_tests: mean(rs.iter().map(|r| r.number_of_fail as f64)),
            avg_duration: mean(rs.iter().map(|r| r.total_duration)),
        })
        .collect();

    let mut summary_table = by_env
        .into_iter()
        .map(|(env, rs)| {
            let recent_rs = rs.iter().filter(|r| r.test_time >= recent).collect::<Vec<_>>();
            let prev_rs = rs
                .iter()
                .filter(|r| r.test_time >= prev && r.test_time < recent)
                .collect::<Vec<_>>();
            let recent_fail = mean(recent_rs.iter().map(|r| r.number_of_fail as f64));
            let recent_dur = mean(recent_rs.iter().map(|r| r.total_duration));
            let prev_fail = mean(prev_rs.iter().map(|r| r.number_of_fail as f64));
            let prev_dur = mean(prev_rs.iter().map(|r| r.total_duration));
            EnvSummary {
                env_name: env.to_string(),
                recent_number_of_fail: recent_fail,
                recent_test_duration: recent_dur,
                prev_number_of_fail: prev_fail,
                prev_test_duration: prev_dur,
                number_of_fail_growth: round2(recent_fail - prev_fail),
                test_duration_growth: round2(recent_dur - prev_dur),
            }
        })
        .collect::<Vec<_>>();
    summary_table.sort_by(|a, b| {
        b.recent_number_of_fail
            .total_cmp(&a.recent_number_of_fail)
            .then_with(|| a.env_name.cmp(&b.env_name))
    });

    Overview {
        summary_avg_fail,
        summary_table,
    }
}

fn sorted_in_window(now: SystemTime, cases: &[TestCaseRow]) -> Vec<&TestCaseRow> {
    let start = window_start(now);
    let mut v = cases.iter().filter(|c| c.test_time >= start).collect::<Vec<_>>();
    v.sort_by(|a, b| {
        a.test_time
            .cmp(&b.test_time)
            .then_with(|| a.commit_id.cmp(&b.commit_id))
    });
    v
}

fn flake_points(
    cases: &[&TestCaseRow],
    top: &HashMap<&str, usize>,
    bucket: fn(&SystemTime) -> time::Date,
) -> Vec<FlakePoint> {
    let mut buckets: BTreeMap<(time::Date, usize), Vec<&TestCaseRow>> = BTreeMap::new();
    for c in cases.iter().copied() {
        if let Some(rank) = top.get(c.test_name.as_str()) {
            buckets.entry((bucket(&c.test_time), *rank)).or_default().push(c);
        }
    }
    buckets
        .into_iter()
        .filter_map(|((date, _), cs)| {
            let flake = Flake::of(cs.iter().copied());
            if flake.runs() == 0 {
                return None;
            }
            Some(FlakePoint {
                test_name: cs[0].test_name.clone(),
                start_of_date: date.to_string(),
                flake_percentage: flake.percentage(),
                commit_ids: cs.iter().map(|c| c.commit_id.clone()).collect(),
            })
        })
        .collect()
}

pub(crate) fn env_charts(
    now: SystemTime,
    runs: &[EnvironmentRunRow],
    cases: &[TestCaseRow],
    tests_in_top: usize,
) -> EnvCharts {
    let recent = days_before(now, RECENT_WINDOW_DAYS);
    let prev = days_before(now, 2 * RECENT_WINDOW_DAYS);
    let cases = sorted_in_window(now, cases);

    let mut by_test: BTreeMap<&str, Vec<&TestCaseRow>> = BTreeMap::new();
    for c in cases.iter().copied() {
        by_test.entry(c.test_name.as_str()).or_default().push(c);
    }
    let mut table = by_test
        .into_iter()
        .filter_map(|(name, cs)| {
            let recent_flake = Flake::of(cs.iter().copied().filter(|c| c.test_time >= recent));
            if recent_flake.runs() == 0 {
                return None;
            }
            let prev_flake = Flake::of(
                cs.iter()
                    .copied()
                    .filter(|c| c.test_time >= prev && c.test_time < recent),
            );
            Some(RecentFlake {
                test_name: name.to_string(),
                recent_flake_percentage: recent_flake.percentage(),
                growth_rate: round2(recent_flake.percentage() - prev_flake.percentage()),
            })
        })
        .collect::<Vec<_>>();
    table.sort_by(|a, b| {
        b.recent_flake_percentage
            .total_cmp(&a.recent_flake_percentage)
            .then_with(|| a.test_name.cmp(&b.test_name))
    });
    table.truncate(tests_in_top);

    let top = table
        .iter()
        .enumerate()
        .map(|(i, t)| (t.test_name.as_str(), i))
        .collect::<HashMap<_, _>>();
    let flake_rate_by_day = flake_points(&cases, &top, day_of);
    let flake_rate_by_week = flake_points(&cases, &top, week_of);

    let start = window_start(now);
    let mut runs = runs.iter().filter(|r| r.test_time >= start).collect::<Vec<_>>();
    runs.sort_by(|a, b| a.test_time.cmp(&b.test_time).then_with(|| a.commit_id.cmp(&b.commit_id)));
    let mut daily: BTreeMap<time::Date, Vec<&EnvironmentRunRow>> = BTreeMap::new();
    for r in runs {
        daily.entry(day_of(&r.test_time)).or_default().push(r);
    }
    let counts_and_durations = daily
        .into_iter()
        .map(|(day, rs)| CountsAndDuration {
            start_of_date: day.to_string(),
            number_of_runs: rs.len(),
            avg_test_count: mean(
                rs.iter()
                    .map(|r| (r.number_of_pass + r.number_of_fail + r.number_of_skip) as f64),
            ),
            avg_failed_tests: mean(rs.iter().map(|r| r.number_of_fail as f64)),
            avg_duration: mean(rs.iter().map(|r| r.total_duration)),
            commit_ids: rs.iter().map(|r| r.commit_id.clone()).collect(),
        })
        .collect();

    EnvCharts {
        recent_flake_percent_table: table,
        flake_rate_by_week,
        flake_rate_by_day,
        counts_and_durations,
    }
}

fn test_points(cases: &[&TestCaseRow], bucket: fn(&SystemTime) -> time::Date) -> Vec<TestFlakePoint> {
    let mut buckets: BTreeMap<time::Date, Vec<&TestCaseRow>> = BTreeMap::new();
    for c in cases.iter().copied() {
        buckets.entry(bucket(&c.test_time)).or_default().push(c);
    }
    buckets
        .into_iter()
        .filter_map(|(date, cs)| {
            let flake = Flake::of(cs.iter().copied());
            if flake.runs() == 0 {
                return None;
            }
            Some(TestFlakePoint {
                start_of_date: date.to_string(),
                flake_percentage: flake.percentage(),
                avg_duration: mean(
                    cs.iter()
                        .filter(|c| c.result != Status::Skip)
                        .map(|c| c.duration),
                ),
                number_of_runs: flake.runs(),
                commit_result_sequence: cs
                    .iter()
                    .map(|c| format!("{}:{}", c.commit_id, c.result))
                    .collect(),
            })
        })
        .collect()
}

pub(crate) fn test_charts(now: SystemTime, cases: &[TestCaseRow]) -> TestCharts {
    let cases = sorted_in_window(now, cases);
    TestCharts {
        flake_by_day: test_points(&cases, day_of),
        flake_by_week: test_points(&cases, week_of),
    }
}
