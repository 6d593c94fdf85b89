use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use drip_core::{CampaignKind, DripConfig, RawBatch};
use drip_engine::{mailer, CampaignDriver, DriverOptions};
use drip_scheduler::{is_business_day, Schedule, SchedulerEngine};
use drip_store::{SendLedger, SqliteStore};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "drip")]
#[command(about = "GitAuto lifecycle email campaigns", long_about = None)]
struct Cli {
    /// Config file (default: $DRIP_CONFIG, then ~/.drip/drip.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pass of a campaign, or all of them in order
    Run {
        #[arg(value_enum)]
        campaign: Target,
        /// Decide and render, but send nothing and write nothing
        #[arg(long)]
        dry_run: bool,
        /// Run even on weekends and holidays
        #[arg(long)]
        force: bool,
        /// Print each summary as one line of JSON
        #[arg(long)]
        json: bool,
    },
    /// Run all campaigns daily at the configured time until Ctrl-C
    Serve,
    /// Print the EventBridge cron expression for the configured schedule
    Schedule,
    /// Record that an owner replied to the latest email
    MarkReplied { owner_id: i64 },
    /// Create the database schema
    InitDb,
    /// Load a JSON snapshot of owner data into the local store
    Import { path: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Onboarding,
    Coverage,
    Salvage,
    All,
}

impl Target {
    fn campaigns(self) -> Vec<CampaignKind> {
        match self {
            Target::Onboarding => vec![CampaignKind::Onboarding],
            Target::Coverage => vec![CampaignKind::Coverage],
            Target::Salvage => vec![CampaignKind::Salvage],
            Target::All => CampaignKind::ALL.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drip=info,drip_engine=info,drip_store=info,drip_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // explicit --config > DRIP_CONFIG env > ~/.drip/drip.toml
    let config = DripConfig::load(cli.config.as_deref()).context("loading config")?;

    match cli.command {
        Commands::Run {
            campaign,
            dry_run,
            force,
            json,
        } => run(&config, campaign, dry_run, force, json).await,
        Commands::Serve => serve(config).await,
        Commands::Schedule => {
            let schedule = Schedule::daily(&config.schedule.time, config.schedule.weekends)?;
            println!("{}", schedule.cron_expression());
            Ok(())
        }
        Commands::MarkReplied { owner_id } => {
            let store = open_store(&config)?;
            if store.mark_replied(owner_id, Utc::now())? {
                println!("owner {owner_id}: reply recorded");
            } else {
                println!("owner {owner_id}: no delivered email to mark");
            }
            Ok(())
        }
        Commands::InitDb => {
            open_store(&config)?;
            println!("schema ready at {}", config.database.path);
            Ok(())
        }
        Commands::Import { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let batch: RawBatch = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            let store = open_store(&config)?;
            let rows = store.import_batch(&batch)?;
            println!(
                "imported {} owners ({rows} rows) from {}",
                batch.owner_count(),
                path.display()
            );
            Ok(())
        }
    }
}

async fn run(
    config: &DripConfig,
    target: Target,
    dry_run: bool,
    force: bool,
    json: bool,
) -> anyhow::Result<()> {
    validate(config)?;

    let today = Utc::now().date_naive();
    if config.driver.business_days_only && !force && !dry_run && !is_business_day(today) {
        info!(%today, "not a business day, skipping run");
        println!("{today} is not a business day; nothing sent (use --force to override)");
        return Ok(());
    }

    let driver = build_driver(config, dry_run)?;
    run_campaigns(&driver, &target.campaigns(), Utc::now(), json, &mut std::io::stdout()).await
}

/// Runs `kinds` in order, printing each summary as soon as its campaign
/// finishes. Stops at the first campaign that fails.
async fn run_campaigns(
    driver: &CampaignDriver,
    kinds: &[CampaignKind],
    as_of: DateTime<Utc>,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    for &kind in kinds {
        let summary = driver
            .run_campaign(kind, as_of)
            .await
            .with_context(|| format!("{kind} campaign failed"))?;
        if json {
            writeln!(out, "{}", serde_json::to_string(&summary)?)?;
        } else {
            writeln!(out, "{summary}")?;
        }
    }
    Ok(())
}

async fn serve(config: DripConfig) -> anyhow::Result<()> {
    validate(&config)?;

    let schedule = Schedule::daily(&config.schedule.time, config.schedule.weekends)?;
    let driver = Arc::new(build_driver(&config, false)?);
    let business_days_only = config.driver.business_days_only;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        info!("Ctrl-C received, stopping after the current run");
        let _ = shutdown_tx.send(true);
    });

    SchedulerEngine::new(schedule)
        .run(shutdown_rx, move |scheduled_for| {
            let driver = Arc::clone(&driver);
            async move {
                if business_days_only && !is_business_day(scheduled_for.date_naive()) {
                    info!(%scheduled_for, "not a business day, skipping run");
                    return;
                }
                match driver.run_all(Utc::now()).await {
                    Ok(summaries) => {
                        for summary in summaries {
                            info!(%summary, "campaign finished");
                        }
                    }
                    Err(e) => error!(error = %e, "campaign run failed"),
                }
            }
        })
        .await;
    Ok(())
}

fn validate(config: &DripConfig) -> anyhow::Result<()> {
    config.validate().map_err(|e| {
        error!(code = e.code(), error = %e, "invalid configuration");
        anyhow::Error::from(e)
    })
}

fn build_driver(config: &DripConfig, dry_run: bool) -> anyhow::Result<CampaignDriver> {
    let store = Arc::new(open_store(config)?);
    let send_timeout = Duration::from_secs(config.driver.send_timeout_secs);
    let mailer = mailer::from_config(&config.mailer, send_timeout)?;
    info!(mailer = mailer.name(), dry_run, "campaign driver ready");

    let opts = DriverOptions {
        dry_run,
        ..DriverOptions::from_config(config)
    };
    Ok(CampaignDriver::new(store.clone(), store, mailer, opts))
}

fn open_store(config: &DripConfig) -> anyhow::Result<SqliteStore> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    Ok(SqliteStore::open(db_path)?)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
