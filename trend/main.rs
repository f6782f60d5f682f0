use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "trend", version, about = "Test run aggregation and trend queries")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON query endpoints.
    Serve {
        #[arg(short = 'H', long = "http_host", value_name = "HTTP_HOST", default_value = "[::]:3000")]
        http_host: SocketAddr,
        #[command(flatten)]
        db: DbArgs,
    },
    /// Aggregate one run's test groups and print or store the result.
    Ingest(IngestArgs),
}

#[derive(Args, Debug)]
struct DbArgs {
    /// sqlite or postgres. Falls back to DB_BACKEND.
    #[arg(long = "db_backend")]
    db_backend: Option<String>,
    /// Database file or connection string. Falls back to DB_PATH.
    #[arg(long = "db_path")]
    db_path: Option<String>,
    /// Managed instance name. Falls back to DB_HOST.
    #[arg(long = "db_host")]
    db_host: Option<String>,
    /// Connect through the managed database socket directory.
    #[arg(long = "managed")]
    managed: bool,
    /// Let the managed proxy supply credentials.
    #[arg(long = "iam_auth")]
    iam_auth: bool,
}

impl DbArgs {
    fn config(&self) -> anyhow::Result<db::Config> {
        db::Config::resolve(
            self.db_path.as_deref(),
            self.db_backend.as_deref(),
            self.db_host.as_deref(),
            self.managed,
            self.iam_auth,
        )
        .context("invalid database configuration")
    }

    async fn open(&self) -> anyhow::Result<Arc<dyn state::DBManager>> {
        let mgr = db::new(&self.config()?)?;
        db::exec::run(mgr.clone(), |db| db.initialize())
            .await
            .context("failed to initialize database")?;
        Ok(mgr)
    }
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// JSON array of test groups.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,
    /// Environment the run executed in.
    #[arg(long = "env")]
    env: String,
    #[arg(long = "commit")]
    commit: String,
    #[arg(long = "pr", default_value = "")]
    pr: String,
    #[arg(long = "repo_name", default_value = "")]
    repo_name: String,
    #[arg(long = "repo_link", default_value = "")]
    repo_link: String,
    /// Write the short summary here instead of stdout.
    #[arg(long = "summary")]
    summary: Option<PathBuf>,
    /// Also write the full snapshot as JSON.
    #[arg(long = "raw")]
    raw: Option<PathBuf>,
    #[arg(long = "include_skip_durations")]
    include_skip_durations: bool,
    /// Store the run through the configured database.
    #[arg(long = "persist")]
    persist: bool,
    #[command(flatten)]
    db: DbArgs,
}

async fn serve(http_host: SocketAddr, db: &DbArgs) -> anyhow::Result<()> {
    let db_manager = db.open().await?;
    let global = web::Data::new(state::Global { db_manager });
    info!("starting trend server at: {http_host}");
    HttpServer::new(move || {
        App::new()
            .app_data(global.clone())
            .configure(handler::configure)
            .wrap(tracing_actix_web::TracingLogger::default())
    })
    .bind(http_host)
    .with_context(|| format!("failed to bind {http_host}"))?
    .run()
    .await
    .context("server failed")
}

async fn ingest(args: &IngestArgs) -> anyhow::Result<()> {
    let raw = std::fs::read(&args.input).with_context(|| format!("failed to read {}", args.input.display()))?;
    let groups: Vec<state::TestGroup> =
        serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", args.input.display()))?;
    let detail = state::ReportDetail {
        name: args.env.clone(),
        details: args.commit.clone(),
        pr: args.pr.clone(),
        repo_name: args.repo_name.clone(),
        repo_link: args.repo_link.clone(),
    };
    let snapshot = report::generate(detail, &groups);
    info!(
        tests = snapshot.total_tests(),
        duration = snapshot.total_duration(),
        "aggregated {}",
        args.input.display()
    );

    let summary = snapshot
        .short_summary_with(&report::SummaryOptions {
            include_skip_durations: args.include_skip_durations,
        })
        .to_json_pretty()?;
    match &args.summary {
        Some(p) => std::fs::write(p, &summary).with_context(|| format!("failed to write {}", p.display()))?,
        None => println!("{}", String::from_utf8_lossy(&summary)),
    }
    if let Some(p) = &args.raw {
        std::fs::write(p, snapshot.to_json_pretty()?).with_context(|| format!("failed to write {}", p.display()))?;
    }

    if args.persist {
        let mgr = args.db.open().await?;
        db::exec::run(mgr, move |db| report::persist(&snapshot, db)).await?;
    }
    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Serve { http_host, db } => serve(*http_host, db).await,
        Command::Ingest(args) => ingest(args).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from([
            "trend",
            "ingest",
            "--input",
            "run.json",
            "--env",
            "linux",
            "--commit",
            "abc",
            "--persist",
            "--db_backend",
            "sqlite",
            "--db_path",
            "/tmp/trend.db",
        ])
        .unwrap();
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert!(args.persist);
        assert_eq!(args.db.config().unwrap(), db::Config::sqlite("/tmp/trend.db"));
    }

    #[actix_web::test]
    async fn test_ingest_persist() {
        let tmp = tempdir::TempDir::new("test_ingest_persist").unwrap();
        let input = tmp.path().join("run.json");
        let t = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let groups = vec![state::TestGroup {
            test_name: "a".to_string(),
            status: state::Status::Pass,
            events: vec![state::TestEvent { elapsed: 1.5 }],
            start: t,
            end: t,
            hidden: false,
        }];
        std::fs::write(&input, serde_json::to_vec(&groups).unwrap()).unwrap();
        let db_path = tmp.path().join("trend.db");
        let summary = tmp.path().join("summary.json");
        let raw = tmp.path().join("raw.json");
        let cli = Cli::try_parse_from([
            "trend",
            "ingest",
            "--input",
            input.to_str().unwrap(),
            "--env",
            "linux",
            "--commit",
            "abc",
            "--summary",
            summary.to_str().unwrap(),
            "--raw",
            raw.to_str().unwrap(),
            "--persist",
            "--db_backend",
            "sqlite",
            "--db_path",
            db_path.to_str().unwrap(),
        ])
        .unwrap();
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        ingest(&args).await.unwrap();

        let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&summary).unwrap()).unwrap();
        assert_eq!(written["NumberOfPass"], 1);
        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&raw).unwrap()).unwrap();
        assert_eq!(raw["Results"]["pass"][0]["test_name"], "a");
        assert_eq!(raw["TotalTests"], 1);
        assert_eq!(raw["Detail"]["Details"], "abc");
        let mgr = db::new(&db::Config::sqlite(db_path.to_str().unwrap())).unwrap();
        let all = mgr
            .get()
            .unwrap()
            .get_environment_tests_and_test_cases()
            .unwrap()
            .supported()
            .unwrap();
        assert_eq!(all.db_test_cases.len(), 1);
        assert_eq!(all.db_environment_tests[0].commit_id, "abc");
    }
}
