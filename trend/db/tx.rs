use anyhow::Context;
use diesel::{
    connection::{Connection, TransactionManager},
    result::QueryResult,
};

/// Runs `f` inside a transaction on `conn`.
///
/// Commits when `f` succeeds. When `f` fails the transaction is rolled back
/// before the error is returned, and a failed rollback is attached to the
/// original error instead of replacing it. A failed commit is rolled back by
/// diesel itself, which reports both causes in one error.
pub(crate) fn atomically<C, T, F>(conn: &mut C, f: F) -> anyhow::Result<T>
where
    C: Connection,
    F: FnOnce(&mut C) -> anyhow::Result<T>,
{
    C::TransactionManager::begin_transaction(conn).context("failed to begin transaction")?;
    match f(conn) {
        Ok(v) => {
            C::TransactionManager::commit_transaction(conn).context("failed to commit transaction")?;
            Ok(v)
        },
        Err(e) => Err(merge_rollback(e, C::TransactionManager::rollback_transaction(conn))),
    }
}

fn merge_rollback(err: anyhow::Error, rollback: QueryResult<()>) -> anyhow::Error {
    match rollback {
        Ok(()) => err,
        Err(rb) => {
            tracing::error!("rollback failed: {rb}");
            err.context(format!("rollback failed: {rb}"))
        },
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_merge_rollback_ok() {
        let e = merge_rollback(anyhow!("failed to upsert test case"), Ok(()));
        assert_eq!(format!("{e:#}"), "failed to upsert test case");
    }

    #[test]
    fn test_merge_rollback_keeps_both() {
        let e = merge_rollback(
            anyhow!("failed to upsert test case"),
            Err(diesel::result::Error::BrokenTransactionManager),
        );
        let msg = format!("{e:#}");
        assert!(msg.starts_with("rollback failed: "), "{msg}");
        assert!(msg.ends_with("failed to upsert test case"), "{msg}");
        assert_eq!(e.root_cause().to_string(), "failed to upsert test case");
    }
}
