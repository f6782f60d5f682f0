use anyhow::anyhow;

use crate::envscrub::scrub;

pub const BACKEND_ENV: &str = "DB_BACKEND";
pub const PATH_ENV: &str = "DB_PATH";
pub const HOST_ENV: &str = "DB_HOST";

/// Directory where the managed database auth proxy exposes its sockets.
const MANAGED_SOCKET_DIR: &str = "/cloudsql";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Embedded file backed database.
    Sqlite,
    /// Client/server database.
    Postgres,
}

impl Backend {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "sqlite" => Ok(Backend::Sqlite),
            "postgres" => Ok(Backend::Postgres),
            _ => Err(anyhow!("unknown backend: {s:?}")),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Backend::Sqlite => write!(f, "sqlite"),
            Backend::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    #[default]
    Direct,
    /// Hosted database reached through its auth proxy. With `iam_auth` the
    /// proxy supplies credentials and the connection string carries none.
    Managed { iam_auth: bool },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: Backend,
    /// Database file for sqlite, connection string for postgres.
    pub path: String,
    /// Instance connection name, only used in managed mode.
    pub host: Option<String>,
    pub mode: ConnectionMode,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend", &self.backend)
            .field("path", &scrub(&self.path))
            .field("host", &self.host)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Config {
    pub fn sqlite(path: &str) -> Self {
        Self {
            backend: Backend::Sqlite,
            path: path.to_string(),
            host: None,
            mode: ConnectionMode::Direct,
        }
    }

    /// Builds a config from explicit values, falling back to `DB_BACKEND`,
    /// `DB_PATH` and `DB_HOST` for the ones that are not given.
    pub fn resolve(
        path: Option<&str>,
        backend: Option<&str>,
        host: Option<&str>,
        managed: bool,
        iam_auth: bool,
    ) -> anyhow::Result<Self> {
        Self::resolve_with(|k| std::env::var(k).ok(), path, backend, host, managed, iam_auth)
    }

    pub(crate) fn resolve_with(
        env: impl Fn(&str) -> Option<String>,
        path: Option<&str>,
        backend: Option<&str>,
        host: Option<&str>,
        managed: bool,
        iam_auth: bool,
    ) -> anyhow::Result<Self> {
        let pick = |explicit: Option<&str>, key: &str| {
            explicit
                .map(str::to_string)
                .filter(|s| !s.is_empty())
                .or_else(|| env(key).filter(|s| !s.is_empty()))
        };
        let backend = pick(backend, BACKEND_ENV).ok_or_else(|| anyhow!("missing {BACKEND_ENV}"))?;
        let backend = Backend::parse(&backend)?;
        let path = pick(path, PATH_ENV).ok_or_else(|| anyhow!("missing {PATH_ENV}"))?;
        let host = pick(host, HOST_ENV);
        let mode = match (managed, iam_auth) {
            (true, iam_auth) => ConnectionMode::Managed { iam_auth },
            (false, false) => ConnectionMode::Direct,
            (false, true) => return Err(anyhow!("IAM auth requires managed mode")),
        };
        let cfg = Self {
            backend,
            path,
            host,
            mode,
        };
        cfg.connection_string()?;
        Ok(cfg)
    }

    /// The string handed to the driver.
    pub fn connection_string(&self) -> anyhow::Result<String> {
        let ConnectionMode::Managed { iam_auth } = self.mode else {
            return Ok(self.path.clone());
        };
        if self.backend != Backend::Postgres {
            return Err(anyhow!("managed mode is only supported for postgres, not {}", self.backend));
        }
        let Some(host) = self.host.as_deref() else {
            return Err(anyhow!("missing {HOST_ENV} for managed mode"));
        };
        let has = |key: &str| {
            self.path
                .split_whitespace()
                .any(|kv| kv.split_once('=').is_some_and(|(k, _)| k == key))
        };
        if has("host") {
            return Err(anyhow!("{PATH_ENV} must not set host in managed mode"));
        }
        match (iam_auth, has("password")) {
            (true, true) => return Err(anyhow!("{PATH_ENV} must not carry a password with IAM auth")),
            (false, false) => return Err(anyhow!("missing password in {PATH_ENV} for managed mode")),
            _ => {},
        }
        Ok(format!("{} host={MANAGED_SOCKET_DIR}/{host}", self.path))
    }
}
