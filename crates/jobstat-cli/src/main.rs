//! jobstat CLI
//!
//! Operator view over job status records: list, inspect, stop, cancel and
//! delete. `demo` runs a tracked job against an in-memory store.
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use jobstat_core::app::{
    App, AppBuilder, ListQuery, PageSize, ProgressReporter, SortColumn, SortDir, StatusConfig,
    StatusJob, Submission,
};
use jobstat_core::domain::{Jid, JobError, JobStatus, UnknownStatus};
use jobstat_core::impls::InMemoryStore;
use jobstat_core::ports::SystemClock;

#[derive(Parser)]
#[command(name = "jobstat")]
#[command(about = "Inspect and control background job status records", version)]
struct Cli {
    /// Store URL
    #[arg(long, env = "JOBSTAT_REDIS_URL", default_value = "redis://127.0.0.1/", global = true)]
    redis_url: String,

    /// Path to a TOML config file (defaults apply to anything it leaves out)
    #[arg(long, short = 'c', env = "JOBSTAT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List live status records
    List {
        /// Only records in this status, or "all"
        #[arg(long, short = 's', default_value = "all")]
        status: StatusFilter,

        /// Column to sort by
        #[arg(long)]
        sort_by: Option<SortColumn>,

        /// asc or desc
        #[arg(long, default_value = "desc")]
        dir: SortDir,

        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Page size, or "all"
        #[arg(long)]
        per_page: Option<PageSize>,
    },

    /// Show one job with its derived fields
    Show { jid: String },

    /// Ask a running job to stop at its next progress report
    Stop { jid: String },

    /// Remove a not-yet-started job from the schedule and delete its record
    Cancel {
        jid: String,

        /// Scheduled execution time (unix seconds), narrows the schedule scan
        #[arg(long)]
        at: Option<f64>,
    },

    /// Delete a status record
    Delete { jid: String },

    /// Run a tracked job against an in-memory store
    Demo {
        #[arg(long, default_value_t = 10)]
        steps: i64,

        /// Delay between progress reports
        #[arg(long, default_value_t = 100)]
        step_ms: u64,

        /// Request a stop after this many milliseconds
        #[arg(long)]
        stop_after_ms: Option<u64>,
    },
}

/// `--status` value: one status, or `all` for no filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusFilter {
    All,
    Only(JobStatus),
}

impl StatusFilter {
    fn status(self) -> Option<JobStatus> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Only(status) => Some(status),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") || s.is_empty() {
            return Ok(StatusFilter::All);
        }
        s.parse().map(StatusFilter::Only)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => StatusConfig::load(path)?,
        None => StatusConfig::default(),
    };

    match cli.command {
        Commands::Demo {
            steps,
            step_ms,
            stop_after_ms,
        } => run_demo(config, steps, step_ms, stop_after_ms).await,
        command => {
            let app = connect(&cli.redis_url, config).await?;
            run_command(&app, command).await
        }
    }
}

async fn connect(url: &str, config: StatusConfig) -> anyhow::Result<App> {
    let store = jobstat_core::impls::redis::connect(url)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    Ok(AppBuilder::new(store).config(config).build()?)
}

async fn run_command(app: &App, command: Commands) -> anyhow::Result<()> {
    let tracker = &app.tracker;
    match command {
        Commands::List {
            status,
            sort_by,
            dir,
            page,
            per_page,
        } => {
            let query = ListQuery {
                status: status.status(),
                sort_by,
                sort_dir: dir,
                page,
                per_page,
            };
            print_json(&tracker.list_jobs(&query).await?)
        }
        Commands::Show { jid } => print_json(&tracker.find(&Jid::new(jid)).await?),
        Commands::Stop { jid } => {
            let jid = Jid::new(jid);
            tracker.request_stop(&jid).await?;
            print_json(&json!({ "jid": jid, "stop": true }))
        }
        Commands::Cancel { jid, at } => {
            let jid = Jid::new(jid);
            let unscheduled = tracker.cancel(&jid, at).await?;
            print_json(&json!({ "jid": jid, "unscheduled": unscheduled }))
        }
        Commands::Delete { jid } => {
            let jid = Jid::new(jid);
            let deleted = tracker.delete(&jid).await?;
            print_json(&json!({ "jid": jid, "deleted": deleted }))
        }
        Commands::Demo { .. } => anyhow::bail!("demo runs without a store connection"),
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Counts to `steps`, reporting progress after each one.
struct Countdown {
    steps: i64,
    step: Duration,
}

#[async_trait]
impl StatusJob for Countdown {
    fn name(&self) -> &str {
        "Countdown"
    }

    async fn perform(&self, progress: &mut ProgressReporter, _args: &Value) -> Result<(), JobError> {
        progress.total(self.steps).await?;
        for i in 1..=self.steps {
            sleep(self.step).await;
            let message = format!("step {i} of {}", self.steps);
            progress.at(i, Some(message.as_str())).await?;
        }
        progress.store([("finished_by", "demo")]).await?;
        Ok(())
    }
}

async fn run_demo(
    config: StatusConfig,
    steps: i64,
    step_ms: u64,
    stop_after_ms: Option<u64>,
) -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new(Arc::new(SystemClock)));
    let mut updates = store.subscribe();

    let app = AppBuilder::new(store)
        .config(config)
        .register(Arc::new(Countdown {
            steps,
            step: Duration::from_millis(step_ms),
        }))?
        .expect_workers(&["Countdown"])
        .build()?;
    let app = Arc::new(app);

    let jid = app
        .enqueue(Submission::new("Countdown", json!({ "steps": steps })))
        .await?;
    info!(jid = %jid, "demo job enqueued");

    let watcher = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            debug!(channel = %update.channel, jid = %update.message, "status update");
        }
    });

    if let Some(ms) = stop_after_ms {
        let app = app.clone();
        let jid = jid.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(ms)).await;
            if let Err(e) = app.tracker.request_stop(&jid).await {
                warn!(jid = %jid, error = %e, "stop request failed");
            }
        });
    }

    let status = app
        .runtime
        .execute(&jid, "Countdown", &json!({ "steps": steps }), false)
        .await?;
    info!(jid = %jid, %status, "demo job finished");

    print_json(&app.tracker.find(&jid).await?)?;
    if status != JobStatus::Complete {
        print_json(&app.tracker.list_jobs(&ListQuery::default()).await?)?;
    }

    watcher.abort();
    Ok(())
}
