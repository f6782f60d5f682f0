use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use anyhow::Result;
use lazy_static::lazy_static;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge, histogram::Histogram};
use tracing::instrument;

lazy_static! {
    static ref DB_EXEC_TOTAL: Counter::<u64> = metrics::register_metric(
        "db_exec",
        "Total number of DB executions via spawn_blocking",
        Counter::default()
    );
    static ref DB_EXEC_ERRORS: Counter::<u64> = metrics::register_metric(
        "db_exec_errors",
        "Total number of DB executions that returned an error",
        Counter::default()
    );
    static ref DB_BLOCKING_INFLIGHT: Gauge::<u32, AtomicU32> = metrics::register_metric(
        "db_blocking_inflight",
        "Number of DB operations currently running in spawn_blocking",
        Gauge::default()
    );
    static ref DB_EXEC_DURATION: Histogram = {
        let buckets = [0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0];
        metrics::register_metric(
            "db_exec_duration_seconds",
            "Duration of DB operations in spawn_blocking",
            Histogram::new(buckets.into_iter()),
        )
    };
}

/// Runs a synchronous database operation on the blocking pool with a
/// connection checked out from `mgr`.
#[instrument(skip(mgr, f), name = "db_exec")]
pub async fn run<T, F>(mgr: Arc<dyn state::DBManager>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn state::DB) -> Result<T> + Send + 'static,
{
    DB_EXEC_TOTAL.inc();
    DB_BLOCKING_INFLIGHT.inc();
    let start = std::time::Instant::now();

    let result = tokio::task::spawn_blocking(move || {
        let mut db = mgr.get()?;
        f(db.as_mut())
    })
    .await
    .map_err(|e| anyhow::anyhow!("DB task join error: {e}"))
    .and_then(|r| r);

    DB_BLOCKING_INFLIGHT.dec();
    DB_EXEC_DURATION.observe(start.elapsed().as_secs_f64());
    if result.is_err() {
        DB_EXEC_ERRORS.inc();
    }
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;

    struct Empty;

    impl state::DB for Empty {
        fn initialize(&mut self) -> anyhow::Result<()> { Ok(()) }

        fn set(&mut self, _run: &state::EnvironmentRunRow, _cases: &[state::TestCaseRow]) -> anyhow::Result<()> {
            Err(anyhow!("read only"))
        }
    }

    struct EmptyManager;

    impl state::DBManager for EmptyManager {
        fn get(&self) -> anyhow::Result<Box<dyn state::DB>> { Ok(Box::new(Empty)) }
    }

    struct DownManager;

    impl state::DBManager for DownManager {
        fn get(&self) -> anyhow::Result<Box<dyn state::DB>> { Err(anyhow!("connection refused")) }
    }

    fn empty_run() -> state::EnvironmentRunRow {
        state::EnvironmentRunRow {
            commit_id: "c".to_string(),
            env_name: "e".to_string(),
            persisted_at: std::time::UNIX_EPOCH,
            test_time: std::time::UNIX_EPOCH,
            number_of_fail: 0,
            number_of_pass: 0,
            number_of_skip: 0,
            total_duration: 0.0,
            tool_version: String::new(),
        }
    }

    #[tokio::test]
    async fn test_run() {
        let mgr: Arc<dyn state::DBManager> = Arc::new(EmptyManager);
        let overview = super::run(mgr.clone(), |db| db.get_overview()).await.unwrap();
        assert!(!overview.is_supported());

        let err = super::run(mgr, |db| db.set(&empty_run(), &[])).await.unwrap_err();
        assert_eq!(err.to_string(), "read only");
    }

    #[tokio::test]
    async fn test_run_without_connection() {
        let mgr: Arc<dyn state::DBManager> = Arc::new(DownManager);
        let err = super::run(mgr, |db| db.initialize()).await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }
}
