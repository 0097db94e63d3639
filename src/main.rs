//! # LeaseWarden: lifecycle daemon for leased game servers
//!
//! Usage:
//!   leasewarden daemon                    # Run every job on its schedule
//!   leasewarden run expire                # Run one job now, with progress
//!   leasewarden runs --limit 20           # Recent executions
//!   leasewarden logs <run-id>             # Audit timeline of one execution
//!   leasewarden init                      # Write a default config file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leasewarden_channels::{
    HtmlTemplates, HttpControlPlane, HttpVersionSource, SmtpTransport, side_channel_from_config,
};
use leasewarden_core::LeaseConfig;
use leasewarden_core::traits::VersionSource;
use leasewarden_db::LeaseDb;
use leasewarden_scheduler::{
    JobDeps, JobEvent, JobKind, JobRunner, JobSettings, SchedulerEngine, spawn_scheduler,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "leasewarden",
    version,
    about = "⏳ LeaseWarden — expiry, deletion and reminders for leased servers"
)]
struct Cli {
    /// Config file (default: ~/.leasewarden/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all jobs on their cron schedules until Ctrl-C
    Daemon,
    /// Run one job now and wait for it
    Run {
        /// expire | delete | expiry-reminders | deletion-reminders | dispatch-notifications | version-check
        job: JobKind,
    },
    /// List recent executions
    Runs {
        /// Only this job
        #[arg(long)]
        job: Option<JobKind>,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show the audit timeline of one execution
    Logs { run_id: String },
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn config_path(cli: &Cli) -> PathBuf {
    match &cli.config {
        Some(p) => PathBuf::from(shellexpand::tilde(p).to_string()),
        None => LeaseConfig::default_path(),
    }
}

fn load_config(path: &Path) -> Result<LeaseConfig> {
    let config = if path.exists() {
        LeaseConfig::load_from(path)?
    } else {
        tracing::warn!("⚠️ No config at {}, using defaults", path.display());
        LeaseConfig::parse("")?
    };
    Ok(config)
}

fn open_db(config: &LeaseConfig) -> Result<Arc<LeaseDb>> {
    let path = config.database.resolved_path();
    let db = LeaseDb::open(&path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Arc::new(db))
}

/// Wire the concrete collaborators from config.
fn build_deps(config: &LeaseConfig) -> Result<Arc<JobDeps>> {
    let db = open_db(config)?;
    let mail = SmtpTransport::new(&config.smtp).context("SMTP transport")?;
    let version_source: Option<Arc<dyn VersionSource>> = if config.version.source_url.is_empty() {
        None
    } else {
        Some(Arc::new(HttpVersionSource::new(&config.version.source_url)))
    };

    Ok(Arc::new(JobDeps {
        db,
        control_plane: Arc::new(HttpControlPlane::new(&config.control_plane)),
        mail: Arc::new(mail),
        templates: Arc::new(HtmlTemplates::default()),
        side_channel: side_channel_from_config(&config.side_channel).map(Arc::from),
        version_source,
        settings: JobSettings::from_config(config),
    }))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("🛑 Ctrl-C received, stopping");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "leasewarden=debug,leasewarden_scheduler=debug,leasewarden_channels=debug"
    } else {
        "leasewarden=info,leasewarden_scheduler=info,leasewarden_channels=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    // Logs go to stderr so `--json` results on stdout stay parseable.
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let path = config_path(&cli);

    match &cli.command {
        Command::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            LeaseConfig::default().save_to(&path)?;
            println!("✅ Wrote {}", path.display());
        }

        Command::Daemon => {
            let config = load_config(&path)?;
            let deps = build_deps(&config)?;
            let runner = JobRunner::new(deps);
            let engine = SchedulerEngine::new(runner, &config.jobs, chrono::Utc::now())?;
            let shutdown = cancel_on_ctrl_c();
            spawn_scheduler(engine, config.jobs.tick_secs, shutdown).await;
        }

        Command::Run { job } => {
            let config = load_config(&path)?;
            let runner = JobRunner::new(build_deps(&config)?);
            let mut handle = runner.start(*job)?;
            let stop = cancel_on_ctrl_c();
            let job_cancel = handle.cancel_token();
            tokio::spawn(async move {
                stop.cancelled().await;
                job_cancel.cancel();
            });

            while let Some(event) = handle.next_event().await {
                match event {
                    JobEvent::Progress { processed, total } if !cli.json => {
                        eprintln!("  {processed}/{total}");
                    }
                    JobEvent::Failed { error, .. } if !cli.json => eprintln!("❌ {error}"),
                    _ => {}
                }
            }
            let report = handle.wait().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} {} {}: {}/{} processed, {} ok, {} skipped, {} failed",
                    if report.error.is_none() { "✅" } else { "⚠️" },
                    report.kind,
                    report.run_id,
                    report.stats.processed,
                    report.stats.total,
                    report.stats.succeeded,
                    report.stats.skipped,
                    report.stats.failed
                );
            }
            if report.error.is_some() {
                std::process::exit(1);
            }
        }

        Command::Runs { job, limit } => {
            let config = load_config(&path)?;
            let db = open_db(&config)?;
            let runs = db.recent_runs(job.map(|k| k.name()), *limit)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                for r in runs {
                    println!(
                        "{:<48} {:<10} {}/{} ({} failed) {}",
                        r.run_id,
                        r.status.as_str(),
                        r.processed,
                        r.total,
                        r.failed,
                        r.started_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }

        Command::Logs { run_id } => {
            let config = load_config(&path)?;
            let db = open_db(&config)?;
            let entries = db.logs_for_run(run_id)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No entries for {run_id}");
            } else {
                for e in entries {
                    let details = e.details.map(|d| d.to_string()).unwrap_or_default();
                    println!(
                        "{} {:<5} {} {}",
                        e.created_at.format("%H:%M:%S%.3f"),
                        e.level.as_str(),
                        e.message,
                        details
                    );
                }
            }
        }
    }

    Ok(())
}
