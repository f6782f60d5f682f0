use anyhow::Context;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel_tracing::{pg::InstrumentedPgConnection, sqlite::InstrumentedSqliteConnection};

/// Applied to every new sqlite connection so concurrent writers wait for the
/// lock instead of failing with SQLITE_BUSY.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<InstrumentedSqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut InstrumentedSqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub struct SqliteManager {
    pool: Pool<ConnectionManager<InstrumentedSqliteConnection>>,
}

impl SqliteManager {
    pub fn new(path: &str) -> anyhow::Result<Self> {
        if let Some(dir) = std::path::Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
            }
        }
        let manager = ConnectionManager::<InstrumentedSqliteConnection>::new(path);
        let pool = Pool::builder()
            .test_on_check_out(true)
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)
            .context("failed to build db connection pool")?;
        Ok(Self { pool })
    }

    pub(crate) fn connect(&self) -> anyhow::Result<crate::sqlite::Sqlite> {
        let conn = self
            .pool
            .get()
            .context("failed to get connection from pool")?;
        Ok(crate::sqlite::Sqlite { conn })
    }
}

impl state::DBManager for SqliteManager {
    fn get(&self) -> anyhow::Result<Box<dyn state::DB>> {
        Ok(Box::new(self.connect()?))
    }
}

pub struct PostgresManager {
    pool: Pool<ConnectionManager<InstrumentedPgConnection>>,
}

impl PostgresManager {
    pub fn new(uri: &str) -> anyhow::Result<Self> {
        let manager = ConnectionManager::<InstrumentedPgConnection>::new(uri);
        let pool = Pool::builder()
            .test_on_check_out(true)
            .build(manager)
            .context("failed to build db connection pool")?;
        Ok(Self { pool })
    }

    pub(crate) fn connect(&self) -> anyhow::Result<crate::postgres::Postgres> {
        let conn = self
            .pool
            .get()
            .context("failed to get connection from pool")?;
        Ok(crate::postgres::Postgres { conn })
    }
}

impl state::DBManager for PostgresManager {
    fn get(&self) -> anyhow::Result<Box<dyn state::DB>> {
        Ok(Box::new(self.connect()?))
    }
}
