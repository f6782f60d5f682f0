use anyhow::Context;
use diesel::prelude::*;

use crate::timefmt::{format_time, parse_time};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::db_environment_tests)]
#[diesel(primary_key(commit_id, env_name))]
pub struct EnvironmentTest {
    pub commit_id: String,
    pub env_name: String,
    pub tool_time: String,
    pub test_time: String,
    pub number_of_fail: i32,
    pub number_of_pass: i32,
    pub number_of_skip: i32,
    pub total_duration: f64,
    pub tool_version: String,
}

impl EnvironmentTest {
    pub fn from_state(row: &state::EnvironmentRunRow) -> anyhow::Result<Self> {
        Ok(Self {
            commit_id: row.commit_id.clone(),
            env_name: row.env_name.clone(),
            tool_time: format_time(&row.persisted_at)?,
            test_time: format_time(&row.test_time)?,
            number_of_fail: row.number_of_fail,
            number_of_pass: row.number_of_pass,
            number_of_skip: row.number_of_skip,
            total_duration: row.total_duration,
            tool_version: row.tool_version.clone(),
        })
    }

    pub fn into_state(self) -> anyhow::Result<state::EnvironmentRunRow> {
        Ok(state::EnvironmentRunRow {
            persisted_at: parse_time(&self.tool_time)?,
            test_time: parse_time(&self.test_time)
                .with_context(|| format!("bad run {}/{}", self.commit_id, self.env_name))?,
            commit_id: self.commit_id,
            env_name: self.env_name,
            number_of_fail: self.number_of_fail,
            number_of_pass: self.number_of_pass,
            number_of_skip: self.number_of_skip,
            total_duration: self.total_duration,
            tool_version: self.tool_version,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::db_test_cases)]
#[diesel(primary_key(commit_id, env_name, test_name))]
pub struct TestCase {
    pub pr: String,
    pub commit_id: String,
    pub test_name: String,
    pub result: String,
    pub duration: f64,
    pub env_name: String,
    pub test_order: i32,
    pub test_time: String,
}

impl TestCase {
    pub fn from_state(row: &state::TestCaseRow) -> anyhow::Result<Self> {
        Ok(Self {
            pr: row.pr.clone(),
            commit_id: row.commit_id.clone(),
            test_name: row.test_name.clone(),
            result: row.result.to_string(),
            duration: row.duration,
            env_name: row.env_name.clone(),
            test_order: row.test_order,
            test_time: format_time(&row.test_time)?,
        })
    }

    pub fn into_state(self) -> anyhow::Result<state::TestCaseRow> {
        Ok(state::TestCaseRow {
            test_time: parse_time(&self.test_time)
                .with_context(|| format!("bad test case {}/{}/{}", self.commit_id, self.env_name, self.test_name))?,
            pr: self.pr,
            commit_id: self.commit_id,
            test_name: self.test_name,
            result: state::Status::parse(&self.result),
            duration: self.duration,
            env_name: self.env_name,
            test_order: self.test_order,
        })
    }
}

pub(crate) fn runs_into_state(rows: Vec<EnvironmentTest>) -> anyhow::Result<Vec<state::EnvironmentRunRow>> {
    rows.into_iter().map(EnvironmentTest::into_state).collect()
}

pub(crate) fn cases_into_state(rows: Vec<TestCase>) -> anyhow::Result<Vec<state::TestCaseRow>> {
    rows.into_iter().map(TestCase::into_state).collect()
}
