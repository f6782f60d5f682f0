//! Throwaway postgres server for tests.
//!
//! Binaries are looked up in `PG_BIN_DIR`. Tests that need a server are
//! `#[ignore]`d; run them with `cargo test -- --ignored` and `PG_BIN_DIR` set.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs::OpenOptions, net::TcpListener};

use anyhow::{anyhow, Context};

pub const BIN_DIR_ENV: &str = "PG_BIN_DIR";

const DB_NAME: &str = "trend";

pub struct PgHarness {
    data_path: PathBuf,
    postgres: std::process::Child,
    db_name: String,
    port: u16,
}

impl PgHarness {
    pub fn uri(&self) -> String {
        format!("postgres://localhost:{}/{}", self.port, self.db_name)
    }

    pub fn data_path(&self) -> PathBuf {
        self.data_path.clone()
    }

    pub fn close(&mut self) -> anyhow::Result<()> {
        self.postgres.wait()?;
        Ok(())
    }
}

impl Drop for PgHarness {
    fn drop(&mut self) {
        let _ = rustix::process::kill_process(
            rustix::process::Pid::from_child(&self.postgres),
            rustix::process::Signal::Term,
        );
        let _ = self.close();
    }
}

/// Directory holding `initdb`, `postgres` and `createdb`, if configured.
pub fn bin_dir() -> Option<PathBuf> {
    std::env::var_os(BIN_DIR_ENV)
        .map(PathBuf::from)
        .filter(|p| p.join("initdb").exists())
}

fn tool(bin: &Path, name: &str) -> PathBuf {
    let p = bin.join(name);
    std::fs::canonicalize(&p).unwrap_or(p)
}

pub fn new(p: &str) -> anyhow::Result<PgHarness> {
    let bin = bin_dir().ok_or_else(|| anyhow!("{BIN_DIR_ENV} is not set to a postgres bin directory"))?;
    let initdb = std::process::Command::new(tool(&bin, "initdb"))
        .arg(p)
        .status()
        .context("failed to run initdb")?;
    if !initdb.success() {
        return Err(anyhow!("failed to init db: {:#?}", initdb));
    }
    let config_path = Path::new(p).join("postgresql.conf");
    let port = {
        let lis = TcpListener::bind("127.0.0.1:0")?;
        let port = lis.local_addr()?.port();
        let mut f = OpenOptions::new().append(true).open(config_path)?;
        writeln!(f, "\nport = {port}")?;
        port
    };
    let harness = PgHarness {
        data_path: p.into(),
        postgres: std::process::Command::new(tool(&bin, "postgres"))
            .arg("-D")
            .arg(p)
            .arg("-k")
            .arg(p)
            .spawn()
            .context("failed to start postgres")?,
        db_name: DB_NAME.into(),
        port,
    };
    let mut attempts = 3;
    loop {
        let created = std::process::Command::new(tool(&bin, "createdb"))
            .arg("-h")
            .arg("127.0.0.1")
            .arg("-p")
            .arg(harness.port.to_string())
            .arg(DB_NAME)
            .status()?
            .success();
        if created {
            break;
        }
        attempts -= 1;
        if attempts == 0 {
            return Err(anyhow!("failed to create database {DB_NAME}"));
        }
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
    Ok(harness)
}
