use anyhow::Context;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use diesel_tracing::sqlite::InstrumentedSqliteConnection;
use r2d2::PooledConnection;

const CREATE_TABLES: &str = include_str!("create_tables.sql");

pub struct Sqlite {
    pub(crate) conn: PooledConnection<ConnectionManager<InstrumentedSqliteConnection>>,
}

impl_db!(Sqlite, CREATE_TABLES);
