use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sendplan::catalog::SendTypeCatalog;
use sendplan::config::PlannerConfig;
use sendplan::models::PageType;
use sendplan::pipeline::{SchedulePipeline, StaticContext};

#[derive(Parser)]
#[command(
    name = "sendplan",
    version,
    about = "Weekly send-schedule planner with diversity repair, timing, pricing and consensus validation",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides SENDPLAN_LOG_FORMAT
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a week from a JSON planning context
    Plan {
        /// Planning context file (creator, trends, rankings, catalog, flagged segments)
        #[arg(short, long)]
        input: PathBuf,

        /// TOML configuration file; environment variables are used when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Fixed seed for timing jitter
        #[arg(long)]
        seed: Option<u64>,

        /// Any date in the target week (YYYY-MM-DD); defaults to today
        #[arg(long)]
        week_start: Option<NaiveDate>,
    },

    /// List the built-in send type catalog
    Catalog {
        /// Only types eligible for this page type (free, paid)
        #[arg(long)]
        page: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut env_config = PlannerConfig::default();
    env_config.apply_env();
    let logging = env_config.logging;
    let level = if cli.verbose { "debug" } else { logging.level.as_str() };
    setup_tracing(cli.log_format.as_deref().unwrap_or(&logging.format), level)?;

    match cli.command {
        Commands::Plan {
            input,
            config,
            seed,
            week_start,
        } => {
            tracing::info!(
                input = %input.display(),
                config = ?config,
                seed = ?seed,
                week_start = ?week_start,
                "Starting plan command"
            );
            plan(input, config, seed, week_start).await?;
        }

        Commands::Catalog { page } => {
            catalog(page.as_deref())?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_new(format!("sendplan={level},warn"))
        .context("Invalid log level")?;

    // Logs go to stderr so stdout stays valid JSON
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

async fn plan(
    input: PathBuf,
    config: Option<PathBuf>,
    seed: Option<u64>,
    week_start: Option<NaiveDate>,
) -> Result<()> {
    let mut config = match config {
        Some(path) => PlannerConfig::from_file(&path)?,
        None => PlannerConfig::from_env()?,
    };
    if seed.is_some() {
        config.timing.seed = seed;
    }
    config.validate()?;

    let context = StaticContext::from_file(&input)?;
    let creator_id = context.creator.id.clone();
    let week_of = week_start.unwrap_or_else(|| chrono::Local::now().date_naive());

    let outcome = SchedulePipeline::new(config)
        .run(&context, &creator_id, week_of)
        .await
        .with_context(|| format!("Planning failed for creator {creator_id}"))?;

    tracing::info!(
        creator = %creator_id,
        status = %outcome.verdict.status,
        score = outcome.verdict.score,
        "Plan command finished"
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn catalog(page: Option<&str>) -> Result<()> {
    let catalog = SendTypeCatalog::default();
    let page = match page {
        Some("free") => Some(PageType::Free),
        Some("paid") => Some(PageType::Paid),
        Some(other) => anyhow::bail!("Unknown page type '{other}', expected free or paid"),
        None => None,
    };

    let types: Vec<_> = match page {
        Some(p) => catalog.eligible(p).collect(),
        None => catalog.types.iter().collect(),
    };
    println!("{}", serde_json::to_string_pretty(&types)?);
    Ok(())
}
