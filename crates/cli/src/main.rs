//! Unistore CLI - operator commands against the unified databases
//!
//! Works directly on the database files; safe to run next to the daemon
//! (every command is short transactions over WAL databases).

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing_subscriber::EnvFilter;

use unistore_core::application::{
    ConsolidationService, EnqueueRequest, LeaseMonitorConfig, QueueService, StuckLeaseMonitor,
};
use unistore_core::domain::{LogicalDatabase, MigrationReport, QueueItem, QueueStatus};
use unistore_core::port::{
    Migrator, QueueRepository, Retention, RetentionConfig, SystemTimeProvider, TimeProvider,
    UuidProvider,
};
use unistore_infra_sqlite::{
    PoolConfig, SqliteMigrator, SqliteQueueRepository, SqliteRetention, Storage,
};

const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser)]
#[command(name = "unistore")]
#[command(about = "Unified storage and durable posting queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the unified database files
    #[arg(long, global = true, env = "UNISTORE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show queue status: counts, pending per platform, recent failures
    Status,

    /// Enqueue content for a platform
    Enqueue {
        /// Text to post
        content: String,

        /// Target platform (e.g. telegram, twitter)
        #[arg(short, long)]
        platform: String,

        /// Priority, -100..=100 (higher = sooner)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        priority: i32,

        /// Earliest delivery time (RFC 3339)
        #[arg(long)]
        scheduled_for: Option<DateTime<Utc>>,

        /// Producer tag
        #[arg(long)]
        source: Option<String>,

        /// Retries before the item is marked failed
        #[arg(long)]
        max_retries: Option<i32>,

        /// Metadata as JSON string
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Show one queue item and its position
    Show {
        /// Queue item ID
        id: String,
    },

    /// Migrate one legacy SQLite file into a unified database
    Migrate {
        /// Legacy database file
        source: PathBuf,

        /// Target logical database (core, social, market)
        #[arg(short, long, default_value = "core")]
        target: LogicalDatabase,
    },

    /// Migrate every known legacy store found in a directory
    Consolidate {
        /// Directory containing the legacy files
        legacy_dir: PathBuf,

        /// Limit to these databases (repeatable; default: all)
        #[arg(long = "database")]
        databases: Vec<LogicalDatabase>,
    },

    /// Delete old posted/failed items and analytics samples
    Sweep {
        /// Queue horizon in days
        #[arg(long)]
        older_than_days: Option<i64>,

        /// Analytics horizon in days
        #[arg(long)]
        analytics_days: Option<i64>,

        /// Run VACUUM afterwards
        #[arg(long)]
        vacuum: bool,
    },

    /// Show file size, fragmentation and row counts per database
    Stats,

    /// List items stuck in processing
    Stuck {
        /// Lease age in minutes after which an item counts as stuck
        #[arg(long, default_value = "30")]
        older_than_mins: u64,
    },
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Count")]
    count: u64,
}

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Retries")]
    retries: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&QueueItem> for ItemRow {
    fn from(item: &QueueItem) -> Self {
        Self {
            id: item.id.clone(),
            platform: item.platform.clone(),
            status: item.status.to_string(),
            retries: format!("{}/{}", item.retry_count, item.max_retries),
            updated: item
                .updated_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            error: item.error_message.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct TableRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Attempted")]
    attempted: u64,
    #[tabled(rename = "Migrated")]
    migrated: u64,
    #[tabled(rename = "Duplicate")]
    duplicate: u64,
    #[tabled(rename = "Mismatch")]
    schema_mismatch: u64,
    #[tabled(rename = "Constraint")]
    constraint_violation: u64,
    #[tabled(rename = "Notes")]
    notes: String,
}

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Database")]
    database: String,
    #[tabled(rename = "Size (MB)")]
    size_mb: String,
    #[tabled(rename = "Fragmentation")]
    fragmentation: String,
    #[tabled(rename = "Rows")]
    rows: String,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "unistore=info" } else { "unistore=warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn open_storage(data_dir: &Path, databases: &[LogicalDatabase]) -> Result<Storage> {
    let config = PoolConfig {
        data_dir: data_dir.to_path_buf(),
        ..PoolConfig::default()
    };
    Storage::open(&config, databases)
        .await
        .with_context(|| format!("Failed to open storage in {}", data_dir.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn queue_repo(storage: &Storage) -> Result<Arc<dyn QueueRepository>> {
    let pool = storage.pool(LogicalDatabase::Core)?.clone();
    Ok(Arc::new(SqliteQueueRepository::new(pool)))
}

fn migration_rows(report: &MigrationReport) -> Vec<TableRow> {
    report
        .tables
        .iter()
        .map(|t| {
            let mut notes = Vec::new();
            if let Some(reason) = &t.aborted {
                notes.push(format!("aborted: {}", reason));
            }
            if !t.dropped_columns.is_empty() {
                notes.push(format!("dropped: {}", t.dropped_columns.join(",")));
            }
            TableRow {
                table: t.table.clone(),
                attempted: t.attempted,
                migrated: t.migrated,
                duplicate: t.skipped.duplicate,
                schema_mismatch: t.skipped.schema_mismatch,
                constraint_violation: t.skipped.constraint_violation,
                notes: notes.join("; "),
            }
        })
        .collect()
}

fn print_migration(report: &MigrationReport) {
    println!(
        "{} {} → {}",
        "Migrated".cyan().bold(),
        report.source,
        report.target
    );
    if !report.tables.is_empty() {
        println!("{}", Table::new(migration_rows(report)));
    }
    for skipped in &report.skipped_tables {
        println!("  {} {} ({:?})", "○".yellow(), skipped.table, skipped.reason);
    }
    if let Some(fixup) = &report.legacy_fixup {
        println!(
            "  {} legacy queue: {} hashes backfilled, {} statuses mapped, {} conflicts",
            "✓".green(),
            fixup.hashes_backfilled,
            fixup.statuses_mapped,
            fixup.conflicts
        );
    }
    if let Some(error) = &report.legacy_fixup_error {
        println!("  {} legacy queue fix-up failed: {}", "✗".red(), error);
    }
}

async fn cmd_status(cli: &Cli) -> Result<()> {
    let storage = open_storage(&cli.data_dir, &[LogicalDatabase::Core]).await?;
    let report = queue_repo(&storage)?.status().await?;

    if cli.json {
        return print_json(&report);
    }

    println!("{}", "Queue Status".cyan().bold());
    println!();
    let counts: Vec<CountRow> = [
        QueueStatus::Pending,
        QueueStatus::Processing,
        QueueStatus::Posted,
        QueueStatus::Failed,
    ]
    .iter()
    .map(|s| CountRow {
        key: s.to_string(),
        count: report.count(*s),
    })
    .collect();
    println!("{}", Table::new(counts));

    if !report.platform_distribution.is_empty() {
        println!();
        println!("{}", "Pending by platform".bold());
        let platforms: Vec<CountRow> = report
            .platform_distribution
            .iter()
            .map(|(platform, count)| CountRow {
                key: platform.clone(),
                count: *count,
            })
            .collect();
        println!("{}", Table::new(platforms));
    }

    if !report.recent_failures.is_empty() {
        println!();
        println!("{}", "Recent failures".red().bold());
        for failure in &report.recent_failures {
            println!(
                "  {} {} [{}] retries={} {}",
                "✗".red(),
                failure.id,
                failure.platform,
                failure.retry_count,
                failure.error_message.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn cmd_enqueue(cli: &Cli, req: EnqueueRequest) -> Result<()> {
    let storage = open_storage(&cli.data_dir, &[LogicalDatabase::Core]).await?;
    let service = QueueService::new(
        queue_repo(&storage)?,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    );
    let outcome = service.enqueue(req).await?;

    if cli.json {
        return print_json(&outcome);
    }
    if outcome.duplicate {
        println!(
            "{} already queued as {}",
            "○ Duplicate:".yellow().bold(),
            outcome.item_id
        );
    } else {
        println!("{} {}", "✓ Enqueued".green().bold(), outcome.item_id);
    }
    Ok(())
}

async fn cmd_show(cli: &Cli, id: &str) -> Result<()> {
    let storage = open_storage(&cli.data_dir, &[LogicalDatabase::Core]).await?;
    let repo = queue_repo(&storage)?;
    let item = repo
        .find_by_id(id)
        .await?
        .with_context(|| format!("Queue item {} not found", id))?;
    let position = repo.queue_position(id).await?;

    if cli.json {
        return print_json(&serde_json::json!({ "item": item, "position": position }));
    }

    println!("{}", Table::new(vec![ItemRow::from(&item)]));
    println!("  {} {}", "Content:".bold(), item.content);
    if let Some(at) = item.scheduled_for {
        println!("  {} {}", "Scheduled for:".bold(), at);
    }
    if let Some(at) = item.posted_at {
        println!("  {} {}", "Posted at:".bold(), at);
    }
    if let Some(position) = position {
        println!("  {} {}", "Queue position:".bold(), position);
    }
    Ok(())
}

async fn cmd_migrate(cli: &Cli, source: &Path, target: LogicalDatabase) -> Result<()> {
    let storage = open_storage(&cli.data_dir, &[target]).await?;
    let report = SqliteMigrator::new(&storage)
        .migrate_from(source, target)
        .await
        .with_context(|| format!("Failed to migrate {}", source.display()))?;

    if cli.json {
        return print_json(&report);
    }
    print_migration(&report);
    Ok(())
}

async fn cmd_consolidate(
    cli: &Cli,
    legacy_dir: &Path,
    databases: &[LogicalDatabase],
) -> Result<()> {
    let databases = if databases.is_empty() {
        LogicalDatabase::ALL.to_vec()
    } else {
        databases.to_vec()
    };
    let storage = open_storage(&cli.data_dir, &databases).await?;
    let service = ConsolidationService::new(Arc::new(SqliteMigrator::new(&storage)), legacy_dir);
    let report = service.consolidate(&databases).await?;

    if cli.json {
        return print_json(&report);
    }

    for entry in &report.databases {
        println!("{} {}", "Database".cyan().bold(), entry.database);
        for migration in &entry.migrated {
            print_migration(migration);
        }
        for missing in &entry.missing {
            println!("  {} not present: {}", "○".yellow(), missing.display());
        }
        for failed in &entry.failed {
            println!("  {} {}: {}", "✗".red(), failed.path.display(), failed.error);
        }
        println!();
    }
    println!(
        "{} {} rows migrated",
        "✓".green().bold(),
        report.rows_migrated()
    );
    Ok(())
}

async fn cmd_sweep(
    cli: &Cli,
    older_than_days: Option<i64>,
    analytics_days: Option<i64>,
    vacuum: bool,
) -> Result<()> {
    let defaults = RetentionConfig::default();
    let queue_days = older_than_days.unwrap_or(defaults.queue_retention_days);
    let analytics_days = analytics_days.unwrap_or(defaults.analytics_retention_days);
    if queue_days < 0 || analytics_days < 0 {
        anyhow::bail!("Retention horizons must not be negative");
    }

    let storage = open_storage(&cli.data_dir, &[LogicalDatabase::Core]).await?;
    let retention = SqliteRetention::new(storage.pool(LogicalDatabase::Core)?.clone());
    let now = SystemTimeProvider.now();

    let sweep = retention.sweep(Duration::days(queue_days), now).await?;
    let analytics_deleted = retention
        .sweep_analytics(Duration::days(analytics_days), now)
        .await?;
    let reclaimed_mb = if vacuum { retention.vacuum().await? } else { 0.0 };

    if cli.json {
        return print_json(&serde_json::json!({
            "sweep": sweep,
            "analytics_deleted": analytics_deleted,
            "reclaimed_mb": reclaimed_mb,
        }));
    }

    println!("{}", "Retention sweep".cyan().bold());
    println!("  {} {} posted deleted", "✓".green(), sweep.posted_deleted);
    println!("  {} {} failed deleted", "✓".green(), sweep.failed_deleted);
    println!("  {} {} analytics samples deleted", "✓".green(), analytics_deleted);
    if vacuum {
        println!("  {} {:.2} MB reclaimed", "✓".green(), reclaimed_mb);
    }
    Ok(())
}

async fn cmd_stats(cli: &Cli) -> Result<()> {
    let storage = open_storage(&cli.data_dir, &LogicalDatabase::ALL).await?;

    let mut all = Vec::new();
    for database in storage.databases() {
        let retention = SqliteRetention::new(storage.pool(database)?.clone());
        all.push(retention.stats().await?);
    }

    if cli.json {
        return print_json(&all);
    }

    let rows: Vec<StatsRow> = all
        .iter()
        .map(|s| StatsRow {
            database: s.database.clone(),
            size_mb: format!("{:.2}", s.db_size_mb),
            fragmentation: format!("{:.1}%", s.fragmentation_percent),
            rows: s
                .tables
                .iter()
                .map(|(table, count)| format!("{}={}", table, count))
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

async fn cmd_stuck(cli: &Cli, older_than_mins: u64) -> Result<()> {
    let storage = open_storage(&cli.data_dir, &[LogicalDatabase::Core]).await?;
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let config = LeaseMonitorConfig {
        stuck_after_secs: older_than_mins * 60,
        ..LeaseMonitorConfig::default()
    };
    let stuck = StuckLeaseMonitor::new(queue_repo(&storage)?, time_provider, config)
        .check()
        .await?;

    if cli.json {
        return print_json(&stuck);
    }
    if stuck.is_empty() {
        println!("{}", "✓ No stuck items".green());
        return Ok(());
    }

    println!(
        "{} {} item(s) processing for over {} min",
        "⚠".yellow().bold(),
        stuck.len(),
        older_than_mins
    );
    let rows: Vec<ItemRow> = stuck.iter().map(ItemRow::from).collect();
    println!("{}", Table::new(rows));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Status => cmd_status(&cli).await,
        Commands::Enqueue {
            content,
            platform,
            priority,
            scheduled_for,
            source,
            max_retries,
            metadata,
        } => {
            let mut req = EnqueueRequest::new(content.clone(), platform.clone()).priority(*priority);
            if let Some(at) = scheduled_for {
                req = req.scheduled_for(*at);
            }
            if let Some(source) = source {
                req = req.source(source.clone());
            }
            if let Some(max_retries) = max_retries {
                req = req.max_retries(*max_retries);
            }
            if let Some(raw) = metadata {
                req.metadata = Some(serde_json::from_str(raw).context("Invalid JSON metadata")?);
            }
            cmd_enqueue(&cli, req).await
        }
        Commands::Show { id } => cmd_show(&cli, id).await,
        Commands::Migrate { source, target } => cmd_migrate(&cli, source, *target).await,
        Commands::Consolidate {
            legacy_dir,
            databases,
        } => cmd_consolidate(&cli, legacy_dir, databases).await,
        Commands::Sweep {
            older_than_days,
            analytics_days,
            vacuum,
        } => cmd_sweep(&cli, *older_than_days, *analytics_days, *vacuum).await,
        Commands::Stats => cmd_stats(&cli).await,
        Commands::Stuck { older_than_mins } => cmd_stuck(&cli, *older_than_mins).await,
    }
}
