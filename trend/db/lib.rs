use std::sync::Arc;

#[macro_use]
mod backend;

mod analytics;
mod config;
mod envscrub;
pub mod exec;
mod manager;
mod models;
mod postgres;
mod schema;
mod sqlite;
mod timefmt;
mod tx;

pub use config::{Backend, Config, ConnectionMode, BACKEND_ENV, HOST_ENV, PATH_ENV};

/// Opens a connection pool for the configured backend.
///
/// Tables are not created here; callers run [`state::DB::initialize`] before
/// the first write.
#[tracing::instrument]
pub fn new(cfg: &Config) -> anyhow::Result<Arc<dyn state::DBManager>> {
    tracing::info!("opening {} database", cfg.backend);
    match cfg.backend {
        Backend::Sqlite => Ok(Arc::new(manager::SqliteManager::new(&cfg.connection_string()?)?)),
        Backend::Postgres => Ok(Arc::new(manager::PostgresManager::new(&cfg.connection_string()?)?)),
    }
}
