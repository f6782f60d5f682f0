/// Implements [`state::DB`] for a backend struct holding a pooled diesel
/// connection in `self.conn`.
///
/// The query code is identical across backends; only the connection type
/// and the table DDL differ, so each backend expands this once and gets
/// type checked against its own connection.
macro_rules! impl_db {
    ($backend:ty, $create_tables:expr) => {
        impl state::DB for $backend {
            fn initialize(&mut self) -> anyhow::Result<()> {
                use diesel::connection::SimpleConnection;
                self.conn
                    .batch_execute($create_tables)
                    .context("failed to create tables")
            }

            fn set(&mut self, run: &state::EnvironmentRunRow, cases: &[state::TestCaseRow]) -> anyhow::Result<()> {
                use crate::schema::{db_environment_tests as env, db_test_cases as tc};
                let run = crate::models::EnvironmentTest::from_state(run)
                    .with_context(|| format!("failed to convert environment run {}/{}", run.commit_id, run.env_name))?;
                let cases = cases
                    .iter()
                    .map(|c| {
                        crate::models::TestCase::from_state(c)
                            .with_context(|| format!("failed to convert test case {:?}", c.test_name))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                crate::tx::atomically(&mut *self.conn, |conn| {
                    for c in &cases {
                        diesel::insert_into(tc::table)
                            .values(c)
                            .on_conflict((tc::commit_id, tc::env_name, tc::test_name))
                            .do_update()
                            .set(c)
                            .execute(conn)
                            .with_context(|| format!("failed to upsert test case {:?}", c.test_name))?;
                    }
                    diesel::insert_into(env::table)
                        .values(&run)
                        .on_conflict((env::commit_id, env::env_name))
                        .do_update()
                        .set(&run)
                        .execute(conn)
                        .context("failed to upsert environment run")?;
                    Ok(())
                })
                .with_context(|| format!("failed to set {}/{}", run.commit_id, run.env_name))
            }

            fn get_overview(&mut self) -> anyhow::Result<state::Capability<state::Overview>> {
                use crate::schema::db_environment_tests as env;
                let now = std::time::SystemTime::now();
                let since = crate::timefmt::format_time(&crate::analytics::window_start(now))?;
                let runs = env::table
                    .filter(env::test_time.ge(since))
                    .select(crate::models::EnvironmentTest::as_select())
                    .load(&mut *self.conn)
                    .context("failed to load environment runs")?;
                let runs = crate::models::runs_into_state(runs)?;
                Ok(state::Capability::Supported(crate::analytics::overview(now, &runs)))
            }

            fn get_env_charts(
                &mut self,
                env_name: &str,
                tests_in_top: usize,
            ) -> anyhow::Result<state::Capability<state::EnvCharts>> {
                use crate::schema::{db_environment_tests as env, db_test_cases as tc};
                let now = std::time::SystemTime::now();
                let since = crate::timefmt::format_time(&crate::analytics::window_start(now))?;
                let runs = env::table
                    .filter(env::env_name.eq(env_name))
                    .filter(env::test_time.ge(&since))
                    .select(crate::models::EnvironmentTest::as_select())
                    .load(&mut *self.conn)
                    .context("failed to load environment runs")?;
                let cases = tc::table
                    .filter(tc::env_name.eq(env_name))
                    .filter(tc::test_time.ge(&since))
                    .select(crate::models::TestCase::as_select())
                    .load(&mut *self.conn)
                    .context("failed to load test cases")?;
                let runs = crate::models::runs_into_state(runs)?;
                let cases = crate::models::cases_into_state(cases)?;
                Ok(state::Capability::Supported(crate::analytics::env_charts(
                    now,
                    &runs,
                    &cases,
                    tests_in_top,
                )))
            }

            fn get_test_charts(
                &mut self,
                env_name: &str,
                test_name: &str,
            ) -> anyhow::Result<state::Capability<state::TestCharts>> {
                use crate::schema::db_test_cases as tc;
                let now = std::time::SystemTime::now();
                let since = crate::timefmt::format_time(&crate::analytics::window_start(now))?;
                let cases = tc::table
                    .filter(tc::env_name.eq(env_name))
                    .filter(tc::test_name.eq(test_name))
                    .filter(tc::test_time.ge(since))
                    .select(crate::models::TestCase::as_select())
                    .load(&mut *self.conn)
                    .context("failed to load test cases")?;
                let cases = crate::models::cases_into_state(cases)?;
                Ok(state::Capability::Supported(crate::analytics::test_charts(now, &cases)))
            }

            fn get_environment_tests_and_test_cases(
                &mut self,
            ) -> anyhow::Result<state::Capability<state::EnvironmentTestsAndTestCases>> {
                use crate::schema::{db_environment_tests as env, db_test_cases as tc};
                let runs = env::table
                    .order((env::test_time.desc(), env::commit_id, env::env_name))
                    .select(crate::models::EnvironmentTest::as_select())
                    .load(&mut *self.conn)
                    .context("failed to load environment runs")?;
                let cases = tc::table
                    .order((tc::test_time.desc(), tc::commit_id, tc::env_name, tc::test_name))
                    .select(crate::models::TestCase::as_select())
                    .load(&mut *self.conn)
                    .context("failed to load test cases")?;
                Ok(state::Capability::Supported(state::EnvironmentTestsAndTestCases {
                    db_environment_tests: crate::models::runs_into_state(runs)?,
                    db_test_cases: crate::models::cases_into_state(cases)?,
                }))
            }
        }
    };
}
