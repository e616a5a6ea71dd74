//! # leia
//!
//! Command-line host for the telemetry pipeline: records events, flushes
//! them to the ingestion endpoint, and inspects what is still pending.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use leia_core::EventRecord;
use leia_logging::{DiagnosticsQuery, LoggingConfig, LoggingGuard, init_logging};
use leia_pipeline::{DurableQueue, FlushOutcome, HttpTransport, Pipeline, PipelineConfig, SessionCorrelator};
use leia_report::{ReportError, build_export, render_markdown, summarize, write_export};
use leia_settings::{LeiaSettings, leia_home, load_settings, load_settings_from_path};
use leia_store::SqliteStore;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Offline-first usage telemetry.
#[derive(Parser, Debug)]
#[command(name = "leia", about = "Offline-first usage telemetry", version)]
struct Cli {
    /// Settings file (defaults to `~/.leia/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record JSON lines `{"event_type": .., "data": {..}}` from stdin until EOF or Ctrl-C.
    Run {
        /// Log in as this user before reading events.
        #[arg(long)]
        login: Option<String>,
    },
    /// Record one event, then flush.
    Track {
        /// Event type tag, e.g. `SIDEBAR_VIEW`.
        event_type: String,
        /// JSON payload.
        #[arg(long)]
        data: Option<String>,
    },
    /// Flush pending events now, ignoring any backoff.
    Flush,
    /// Show pending events and the current session.
    Status,
    /// Summarize pending events.
    Summary {
        /// Print JSON instead of markdown.
        #[arg(long)]
        json: bool,
    },
    /// Write pending events and their summary to a file.
    Export {
        /// Output path.
        #[arg(long, default_value = "leia-analytics-export.json")]
        out: PathBuf,
    },
    /// Drop every pending event.
    Clear {
        /// Required confirmation.
        #[arg(long)]
        yes: bool,
    },
    /// List persisted warnings and errors, newest first.
    Logs {
        /// Maximum rows.
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Only this level (`WARN` or `ERROR`).
        #[arg(long)]
        level: Option<String>,
    },
}

struct Host {
    settings: LeiaSettings,
    store: Arc<SqliteStore>,
    logging: LoggingGuard,
}

impl Host {
    fn open(config: Option<&Path>) -> Result<Self> {
        let settings = match config {
            Some(path) => load_settings_from_path(path),
            None => load_settings(),
        }
        .context("failed to load settings")?;
        settings.validate().context("invalid settings")?;

        let home = leia_home();
        let logging = init_logging(&LoggingConfig {
            level: settings.logging.level.clone(),
            json: settings.logging.json,
            persist_diagnostics: settings.logging.persist_diagnostics,
            db_path: LeiaSettings::resolve_path(&home, &settings.logging.db_path),
        });

        let db_path = LeiaSettings::resolve_path(&home, &settings.storage.db_path);
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("failed to open store at {}", db_path.display()))?;

        Ok(Self {
            settings,
            store: Arc::new(store),
            logging,
        })
    }

    async fn start_pipeline(&self) -> Result<Pipeline> {
        let telemetry = &self.settings.telemetry;
        let transport = HttpTransport::new(
            telemetry.endpoint.clone(),
            telemetry.api_key.clone(),
            telemetry.request_timeout(),
        )?;
        let pipeline = Pipeline::start(
            PipelineConfig::from_settings(&self.settings),
            self.store.clone(),
            Arc::new(transport),
        )
        .await?;
        Ok(pipeline)
    }

    async fn pending(&self) -> Result<Vec<EventRecord>> {
        Ok(DurableQueue::load_all(self.store.as_ref()).await?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let host = Host::open(cli.config.as_deref())?;

    match cli.command {
        Command::Run { login } => run(&host, login).await,
        Command::Track { event_type, data } => track(&host, &event_type, data.as_deref()).await,
        Command::Flush => {
            let pipeline = host.start_pipeline().await?;
            let outcome = pipeline.flush_now().await?;
            println!("{outcome}");
            let _ = pipeline.shutdown().await;
            exit_status(&outcome)
        }
        Command::Status => status(&host).await,
        Command::Summary { json } => {
            let summary = summarize(&host.pending().await?, chrono::Utc::now());
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", render_markdown(&summary));
            }
            Ok(())
        }
        Command::Export { out } => {
            let events = host.pending().await?;
            let document = match build_export(events, &host.settings.host.extension_version, chrono::Utc::now()) {
                Ok(document) => document,
                Err(ReportError::NoData) => {
                    eprintln!("No analytics data to export");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            write_export(&document, &out)?;
            println!("Exported {} events to {}", document.events.len(), out.display());
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear pending events without --yes");
            }
            let pipeline = host.start_pipeline().await?;
            let removed = pipeline.clear().await?;
            let _ = pipeline.shutdown().await;
            println!("Cleared {removed} pending events");
            Ok(())
        }
        Command::Logs { limit, level } => logs(&host, limit, level),
    }
}

fn exit_status(outcome: &FlushOutcome) -> Result<()> {
    match outcome {
        FlushOutcome::Failed { error } => bail!("flush failed: {error}"),
        _ => Ok(()),
    }
}

async fn run(host: &Host, login: Option<String>) -> Result<()> {
    let pipeline = host.start_pipeline().await?;
    let tracker = pipeline.tracker();
    if let Some(email) = login {
        let _ = tracker.login(email).await;
    }
    let workspace_type = if std::env::current_dir().is_ok() { "single-root" } else { "no-workspace" };
    tracker.track_activation(workspace_type);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match serde_json::from_str::<Value>(&line) {
                    Ok(Value::Object(mut input)) => {
                        let event_type = input
                            .get("event_type")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let data = input.remove("data").unwrap_or(Value::Null);
                        tracker.track(event_type, data);
                    }
                    Ok(_) => warn!("ignoring input line that is not a JSON object"),
                    Err(e) => warn!(error = %e, "ignoring malformed input line"),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    tracker.track_deactivation();
    let outcome = pipeline.shutdown().await;
    eprintln!("{outcome}");
    Ok(())
}

async fn track(host: &Host, event_type: &str, data: Option<&str>) -> Result<()> {
    let payload: Value = match data {
        Some(raw) => serde_json::from_str(raw).context("--data is not valid JSON")?,
        None => Value::Null,
    };
    let pipeline = host.start_pipeline().await?;
    pipeline.tracker().track(event_type, payload);
    let outcome = pipeline.shutdown().await;
    println!("{outcome}");
    Ok(())
}

async fn status(host: &Host) -> Result<()> {
    let events = host.pending().await?;
    let sessions = SessionCorrelator::hydrate(host.store.clone()).await;
    let report = json!({
        "endpoint": host.settings.telemetry.endpoint,
        "pending": events.len(),
        "oldest": events.first().map(|e| leia_core::event::iso_millis::format(&e.timestamp())),
        "newest": events.last().map(|e| leia_core::event::iso_millis::format(&e.timestamp())),
        "session_id": sessions.current_session_id().map(|id| id.to_string()),
        "store": host.store.path().display().to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn logs(host: &Host, limit: u32, level: Option<String>) -> Result<()> {
    let Some(sink) = host.logging.diagnostics() else {
        bail!("diagnostics persistence is disabled (logging.persistDiagnostics)");
    };
    let records = sink.query(&DiagnosticsQuery {
        level,
        limit: Some(limit),
        ..DiagnosticsQuery::default()
    })?;
    if records.is_empty() {
        println!("No diagnostics recorded");
    }
    for record in records {
        let session = record.session_id.as_deref().unwrap_or("-");
        println!(
            "{} {:5} {} [{}] {}{}",
            record.timestamp,
            record.level,
            record.target,
            session,
            record.message,
            record.fields.map(|f| format!(" {f}")).unwrap_or_default(),
        );
    }
    Ok(())
}
