// src/cli.rs
use crate::browser::ChromePage;
use crate::config::{ConfigManager, DEFAULT_CONFIG_PATH};
use crate::core::Database;
use crate::harvest::{Harvester, RunReport};
use crate::models::NewSource;
use crate::scoring::export::{write_ranked, ExportFormat};
use crate::scoring::{rank, SkillProfile};
use crate::store::{BatchMode, JobStore, MemoryJobStore, SqliteJobStore};
use crate::utils;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "job-harvester")]
#[command(about = "Harvest job postings and rank them against a skill profile")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Overrides the configured database path
    #[arg(long, global = true)]
    pub database_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or migrate the database
    Init,
    /// Manage job sources
    Source {
        #[command(subcommand)]
        action: SourceCommand,
    },
    /// Run one search per `;`-separated keyword against a site
    Scrape {
        site: String,
        keywords: String,
        #[arg(long, default_value = "")]
        location: String,
        /// Only keep postings younger than this many seconds
        #[arg(long)]
        max_age: Option<u64>,
        /// Keep results in memory instead of the database
        #[arg(long)]
        dry_run: bool,
        /// Fail a batch on identity conflicts instead of converting them to updates
        #[arg(long)]
        strict: bool,
    },
    /// Rank stored jobs against a TOML skill-weight profile
    Rank {
        profile: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum SourceCommand {
    /// Register a configured or built-in site
    Add { site: String },
    List,
    Activate { name: String },
    Deactivate { name: String },
}

pub async fn handle_command(cli: Cli) -> Result<()> {
    let mut config = ConfigManager::load(&cli.config)?;
    if let Some(path) = cli.database_path {
        config.environment.database_path = path;
    }

    match cli.command {
        Command::Init => {
            let db = open_database(&config).await?;
            db.health_check().await?;
            info!("Database ready at {}", config.environment.database_path.display());
        }
        Command::Source { action } => {
            let db = open_database(&config).await?;
            let store = SqliteJobStore::new(&db);
            let mut listing = Vec::new();
            handle_source(action, &config, &store, &mut listing).await?;
            std::io::stdout().write_all(&listing)?;
        }
        Command::Scrape {
            site,
            keywords,
            location,
            max_age,
            dry_run,
            strict,
        } => {
            let mode = if strict {
                BatchMode::Strict
            } else {
                BatchMode::BestEffort
            };
            let reports = if dry_run {
                let store = MemoryJobStore::new();
                run_scrape(&config, &store, &site, &keywords, &location, max_age, mode).await?
            } else {
                let db = open_database(&config).await?;
                let store = SqliteJobStore::new(&db);
                run_scrape(&config, &store, &site, &keywords, &location, max_age, mode).await?
            };
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &reports)
                .context("Failed to write run report")?;
            writeln!(stdout)?;
        }
        Command::Rank {
            profile,
            out,
            format,
            limit,
        } => {
            let db = open_database(&config).await?;
            let store = SqliteJobStore::new(&db);
            let artifact = run_rank(&store, &profile, format, limit).await?;
            match out {
                Some(path) => utils::write_file_safe(&path, &artifact).await?,
                None => std::io::stdout()
                    .lock()
                    .write_all(&artifact)
                    .context("Failed to write ranking")?,
            }
        }
    }
    Ok(())
}

async fn open_database(config: &ConfigManager) -> Result<Database> {
    config.ensure_directories().await?;
    Database::new(&config.environment.database_path).await
}

async fn handle_source<W: Write>(
    action: SourceCommand,
    config: &ConfigManager,
    store: &dyn JobStore,
    out: &mut W,
) -> Result<()> {
    match action {
        SourceCommand::Add { site } => {
            let profile = config.site(&site).with_context(|| {
                format!(
                    "Unknown site '{}'. Known sites: {}",
                    site,
                    config.site_names().join(", ")
                )
            })?;
            let source = store
                .ensure_source(&NewSource {
                    name: profile.name,
                    base_url: profile.base_url,
                    description: profile.description,
                })
                .await?;
            info!("Source '{}' registered with id {}", source.name, source.id);
        }
        SourceCommand::List => {
            for source in store.list_sources().await? {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    source.id,
                    source.name,
                    if source.is_active { "active" } else { "inactive" },
                    source.base_url
                )?;
            }
        }
        SourceCommand::Activate { name } => set_active(store, &name, true).await?,
        SourceCommand::Deactivate { name } => set_active(store, &name, false).await?,
    }
    Ok(())
}

async fn set_active(store: &dyn JobStore, name: &str, active: bool) -> Result<()> {
    if store.set_source_active(name, active).await? {
        info!(
            "Source '{}' {}",
            name,
            if active { "activated" } else { "deactivated" }
        );
    } else {
        warn!("No source named '{}'", name);
    }
    Ok(())
}

async fn run_scrape(
    config: &ConfigManager,
    store: &dyn JobStore,
    site: &str,
    keywords: &str,
    location: &str,
    max_age: Option<u64>,
    mode: BatchMode,
) -> Result<Vec<RunReport>> {
    let profile = config
        .site(site)
        .with_context(|| format!("Unknown site '{}'", site))?;
    let page = ChromePage::launch(&config.browser, config.limits.navigation().timeout).await?;
    match config.cookies.as_deref() {
        Some(cookies) => page.set_cookies(cookies, &profile.base_url).await?,
        None => warn!("No session cookies configured; {} may serve a login wall", profile.name),
    }

    let reports = Harvester::new(store, &page, &profile, &config.limits)
        .with_batch_mode(mode)
        .harvest(keywords, location, max_age)
        .await;
    if let Err(e) = page.close().await {
        warn!("{:#}", e);
    }
    reports
}

/// Scores every stored job and renders the ranked artifact
async fn run_rank(
    store: &dyn JobStore,
    profile_path: &Path,
    format: ExportFormat,
    limit: Option<usize>,
) -> Result<Vec<u8>> {
    let profile = SkillProfile::from_file(profile_path).await?;
    let jobs = store.jobs_with_skills().await?;
    let mut ranked = rank(&jobs, &profile, Utc::now());
    info!(
        "Ranked {} of {} jobs against {} profile entries",
        ranked.len(),
        jobs.len(),
        profile.len()
    );
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }

    let mut buf = Vec::new();
    write_ranked(&ranked, format, &mut buf)?;
    Ok(buf)
}
