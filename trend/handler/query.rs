//! Request parameter validation, independent of the HTTP layer.

use std::collections::HashMap;

use thiserror::Error;

pub const DEFAULT_TESTS_IN_TOP: usize = 10;

/// Errors a query can fail with before or while reaching storage.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A required parameter was absent or empty.
    #[error("missing parameter: {0}")]
    MissingParam(&'static str),

    #[error("invalid parameter {name}: {value:?}")]
    InvalidParam { name: &'static str, value: String },

    /// The storage gateway failed; carries its full context chain.
    #[error("{0:#}")]
    Storage(#[from] anyhow::Error),
}

impl QueryError {
    /// True for errors caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingParam(_) | Self::InvalidParam { .. })
    }
}

fn required(params: &HashMap<String, String>, name: &'static str) -> Result<String, QueryError> {
    params
        .get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or(QueryError::MissingParam(name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvChartsQuery {
    pub env: String,
    pub tests_in_top: usize,
}

impl EnvChartsQuery {
    pub fn parse(params: &HashMap<String, String>) -> Result<Self, QueryError> {
        let env = required(params, "env")?;
        let tests_in_top = match params.get("tests_in_top").filter(|v| !v.is_empty()) {
            None => DEFAULT_TESTS_IN_TOP,
            Some(v) => v.parse::<usize>().map_err(|_| QueryError::InvalidParam {
                name: "tests_in_top",
                value: v.clone(),
            })?,
        };
        Ok(Self { env, tests_in_top })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestChartsQuery {
    pub env: String,
    pub test: String,
}

impl TestChartsQuery {
    pub fn parse(params: &HashMap<String, String>) -> Result<Self, QueryError> {
        Ok(Self {
            env: required(params, "env")?,
            test: required(params, "test")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    fn params(kv: &[(&str, &str)]) -> HashMap<String, String> {
        kv.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_env_charts_query() {
        assert_eq!(
            EnvChartsQuery::parse(&params(&[("env", "linux")])).unwrap(),
            EnvChartsQuery {
                env: "linux".to_string(),
                tests_in_top: 10
            }
        );
        assert_eq!(
            EnvChartsQuery::parse(&params(&[("env", "linux"), ("tests_in_top", "3")]))
                .unwrap()
                .tests_in_top,
            3
        );
        assert!(matches!(
            EnvChartsQuery::parse(&params(&[("tests_in_top", "3")])),
            Err(QueryError::MissingParam("env"))
        ));
        assert!(matches!(
            EnvChartsQuery::parse(&params(&[("env", "")])),
            Err(QueryError::MissingParam("env"))
        ));
        for bad in ["ten", "-1", "1.5"] {
            let err = EnvChartsQuery::parse(&params(&[("env", "linux"), ("tests_in_top", bad)])).unwrap_err();
            assert!(err.is_client_error());
            assert_eq!(err.to_string(), format!("invalid parameter tests_in_top: {bad:?}"));
        }
    }

    #[test]
    fn test_test_charts_query() {
        let q = TestChartsQuery::parse(&params(&[("env", "linux"), ("test", "//pkg:t")])).unwrap();
        assert_eq!(q.test, "//pkg:t");
        let err = TestChartsQuery::parse(&params(&[("env", "linux")])).unwrap_err();
        assert_eq!(err.to_string(), "missing parameter: test");
    }

    #[test]
    fn test_storage_error_keeps_chain() {
        let err: QueryError = Err::<(), _>(anyhow::anyhow!("connection reset"))
            .context("failed to load test cases")
            .unwrap_err()
            .into();
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "failed to load test cases: connection reset");
    }
}
