use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use floodwatch_service::archive::{replay_shift, PgArchive, ReplaySource};
use floodwatch_service::config::{Config, DEFAULT_CONFIG_PATH};
use floodwatch_service::dispatch::{ChannelDispatcher, OutboxChannel, WebhookChannel};
use floodwatch_service::ingest::{AnaClient, TelemetrySource};
use floodwatch_service::logging::init_logging;
use floodwatch_service::model::NotificationState;
use floodwatch_service::monitor::{CycleOutcome, Monitor};
use floodwatch_service::state::{JsonFileStore, StateStore};
use floodwatch_service::verify;

#[derive(Parser)]
#[command(name = "floodwatch")]
#[command(about = "River-level flood alerting from ANA telemetry")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "FLOODWATCH_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Replay archived readings from this many days ago instead of polling ANA
    #[arg(long, global = true)]
    replay_days: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll, decide and notify until stopped
    Run,
    /// Run a single cycle and exit
    Once,
    /// Post a bulletin right away, bypassing the rate gate
    PostNow {
        /// Ask the poster to clear the oldest post first, even below the cap
        #[arg(long)]
        force_cleanup: bool,
    },
    /// Print the persisted notification state
    Status,
    /// Overwrite the notification state (manual resync after clearing posts)
    ResetState {
        #[arg(long, default_value_t = 0)]
        active_count: u32,
        /// Keep the last notification time instead of clearing it
        #[arg(long)]
        keep_timestamp: bool,
    },
    /// Check that every configured station answers with recent data
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    init_logging(&config.logging.level, config.logging.file.as_deref())?;

    match cli.command {
        Commands::Run => {
            let mut monitor = build_monitor(config, cli.replay_days)?;
            monitor.run_forever()
        }
        Commands::Once => {
            let mut monitor = build_monitor(config, cli.replay_days)?;
            let report = monitor.run_cycle(Utc::now());
            println!("{}", report.status_line());
        }
        Commands::PostNow { force_cleanup } => {
            let mut monitor = build_monitor(config, cli.replay_days)?;
            let report = monitor.post_now(Utc::now(), force_cleanup);
            println!("{}", report.status_line());
            if report.outcome != CycleOutcome::Delivered {
                anyhow::bail!("manual post not delivered ({:?})", report.outcome);
            }
        }
        Commands::Status => {
            let store = JsonFileStore::new(&config.state.path);
            let state = store.load();
            let last = state
                .last_notified_at
                .map(|t| t.with_timezone(&config.polling.utc_offset()).to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!("state file:      {}", store.path().display());
            println!("last notified:   {}", last);
            println!(
                "active posts:    {}/{}",
                state.active_count, config.state.story_cap
            );
        }
        Commands::ResetState {
            active_count,
            keep_timestamp,
        } => {
            let store = JsonFileStore::new(&config.state.path);
            let previous = store.load();
            let next = NotificationState {
                last_notified_at: if keep_timestamp { previous.last_notified_at } else { None },
                active_count,
            };
            store.save(&next)?;
            info!(
                from = previous.active_count,
                to = next.active_count,
                "notification state reset"
            );
        }
        Commands::Verify { json } => {
            let report = verify::run_verification(&config, Utc::now())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                verify::print_summary(&report);
            }
        }
    }

    Ok(())
}

fn build_monitor(config: Config, replay_days: Option<i64>) -> anyhow::Result<Monitor> {
    let db_timeout = std::time::Duration::from_secs(config.polling.fetch_timeout_secs);
    let source: Box<dyn TelemetrySource> = match replay_days {
        Some(days) => {
            replay_shift(days)?;
            let archive = PgArchive::from_env(db_timeout).context("replay needs the reading archive")?;
            let replay = ReplaySource::new(archive.into_client(), days)?;
            match replay.data_range(&config.stations.local) {
                Ok(Some((start, end))) => {
                    info!(%start, %end, days = replay.days_offset(), "replaying archived readings")
                }
                Ok(None) => warn!(station = %config.stations.local, "archive has no readings to replay"),
                Err(e) => warn!(error = %e, "cannot read archive range"),
            }
            Box::new(replay)
        }
        None => Box::new(AnaClient::from_config(&config)?),
    };

    let store = Box::new(JsonFileStore::new(&config.state.path));

    let mut dispatcher =
        ChannelDispatcher::new().with_channel(Box::new(OutboxChannel::new(&config.dispatch.outbox_path)));
    if let Some(url) = &config.dispatch.webhook_url {
        let timeout = std::time::Duration::from_secs(config.dispatch.webhook_timeout_secs);
        let webhook = WebhookChannel::new(url, config.dispatch.webhook_min_severity, timeout)?;
        dispatcher = dispatcher.with_channel(Box::new(webhook));
    }

    let archive_enabled = config.archive.enabled;
    let monitor = Monitor::new(config, source, store, Box::new(dispatcher));

    if !archive_enabled {
        return Ok(monitor);
    }
    let archive = PgArchive::from_env(db_timeout).and_then(|mut archive| {
        archive.ensure_schema()?;
        Ok(archive)
    });
    match archive {
        Ok(archive) => Ok(monitor.with_archive(Box::new(archive))),
        Err(e) => {
            warn!(error = %e, "reading archive unavailable, continuing without it");
            Ok(monitor)
        }
    }
}
