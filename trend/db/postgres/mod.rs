use anyhow::Context;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use diesel_tracing::pg::InstrumentedPgConnection;
use r2d2::PooledConnection;

const CREATE_TABLES: &str = include_str!("create_tables.sql");

pub struct Postgres {
    pub(crate) conn: PooledConnection<ConnectionManager<InstrumentedPgConnection>>,
}

impl_db!(Postgres, CREATE_TABLES);

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use state::DB;

    use crate::manager::PostgresManager;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn run(commit: &str, fail: i32, when: SystemTime) -> state::EnvironmentRunRow {
        state::EnvironmentRunRow {
            commit_id: commit.to_string(),
            env_name: "linux".to_string(),
            persisted_at: when,
            test_time: when,
            number_of_fail: fail,
            number_of_pass: 3 - fail,
            number_of_skip: 0,
            total_duration: 12.5,
            tool_version: "0.1.0_dev".to_string(),
        }
    }

    fn case(commit: &str, name: &str, result: state::Status, when: SystemTime) -> state::TestCaseRow {
        state::TestCaseRow {
            pr: "7".to_string(),
            commit_id: commit.to_string(),
            test_name: name.to_string(),
            result,
            duration: 0.5,
            env_name: "linux".to_string(),
            test_order: 2,
            test_time: when,
        }
    }

    #[test]
    #[ignore = "needs a postgres install in PG_BIN_DIR"]
    fn test_initialize() {
        let tmp = tempdir::TempDir::new("test_initialize").unwrap();
        let harness = harness::new(tmp.path().to_str().unwrap()).unwrap();
        let mgr = PostgresManager::new(&harness.uri()).unwrap();
        let mut db = mgr.connect().unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();
        let all = db.get_environment_tests_and_test_cases().unwrap().supported().unwrap();
        assert!(all.db_environment_tests.is_empty());
    }

    #[test]
    #[ignore = "needs a postgres install in PG_BIN_DIR"]
    fn test_set() {
        let tmp = tempdir::TempDir::new("test_set").unwrap();
        let harness = harness::new(tmp.path().to_str().unwrap()).unwrap();
        let mgr = PostgresManager::new(&harness.uri()).unwrap();
        let mut db = mgr.connect().unwrap();
        db.initialize().unwrap();
        let now = at(1_700_000_000);
        db.set(&run("abc", 1, now), &[case("abc", "a", state::Status::Fail, now)])
            .unwrap();
        db.set(&run("abc", 0, now), &[case("abc", "a", state::Status::Pass, now)])
            .unwrap();
        let all = db.get_environment_tests_and_test_cases().unwrap().supported().unwrap();
        assert_eq!(all.db_environment_tests, vec![run("abc", 0, now)]);
        assert_eq!(all.db_test_cases, vec![case("abc", "a", state::Status::Pass, now)]);
    }

    #[test]
    #[ignore = "needs a postgres install in PG_BIN_DIR"]
    fn test_charts() {
        let tmp = tempdir::TempDir::new("test_charts").unwrap();
        let harness = harness::new(tmp.path().to_str().unwrap()).unwrap();
        let mgr = PostgresManager::new(&harness.uri()).unwrap();
        let mut db = mgr.connect().unwrap();
        db.initialize().unwrap();
        let now = SystemTime::now();
        let earlier = now - Duration::from_secs(60 * 60);
        db.set(&run("c1", 1, earlier), &[case("c1", "a", state::Status::Fail, earlier)])
            .unwrap();
        db.set(&run("c2", 0, now), &[case("c2", "a", state::Status::Pass, now)])
            .unwrap();

        let overview = db.get_overview().unwrap().supported().unwrap();
        assert_eq!(overview.summary_table[0].recent_number_of_fail, 0.5);
        let charts = db.get_env_charts("linux", 10).unwrap().supported().unwrap();
        assert_eq!(charts.recent_flake_percent_table[0].recent_flake_percentage, 50.0);
        let charts = db.get_test_charts("linux", "a").unwrap().supported().unwrap();
        assert!(!charts.flake_by_week.is_empty());
    }
}
