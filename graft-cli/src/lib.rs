//! The graft command-line tool.
//!
//! Thin outer layer around the core crates: argument parsing, recipe
//! loading, spreadsheet ingestion, and result persistence. The
//! reconciliation itself lives in `graft-engine`.

pub mod config;
pub mod ingest;
pub mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use graft_client::HttpGraphStore;
use graft_engine::Reconciler;
use graft_mapping::RecordMapper;
use graft_types::RunReport;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Recipe;
use crate::sink::{JsonFileSink, ResultSink};

#[derive(Parser, Debug)]
#[command(name = "graft")]
#[command(about = "Reconciles spreadsheet records against a remote graph store")]
pub struct Args {
    /// Path to the TOML recipe
    #[arg(short, long)]
    pub recipe: PathBuf,

    /// Input workbooks (.xlsx/.xls), concatenated in order
    #[arg(required = true)]
    pub input: Vec<PathBuf>,

    /// Output directory for result logs (overrides the recipe)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Validate the recipe and map the input, but make no remote calls
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Initializes the global tracing subscriber. `RUST_LOG` wins when
/// set; otherwise info, or debug with `--verbose`.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback.to_string()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Runs one reconciliation end to end. Returns `None` for a dry run.
pub async fn run(args: Args) -> Result<Option<RunReport>> {
    let recipe = Recipe::load(&args.recipe)?;
    let mapper = RecordMapper::new(recipe.mapping.clone())?;

    let table = ingest::read_tables(&args.input)?;
    mapper.check_columns(&table.headers)?;
    let batch = mapper.map_all(&table.rows);
    info!(
        rows = table.rows.len(),
        entities = batch.entities.len(),
        relations = batch.relations.len(),
        "mapped input into drafts"
    );

    if args.dry_run {
        info!("dry run requested, skipping reconciliation");
        return Ok(None);
    }

    let password = recipe.server.resolve_password()?;
    let store = HttpGraphStore::new(recipe.store_config(password))?;
    let reconciler = Reconciler::new(
        Arc::new(store),
        mapper.key_spec().clone(),
        recipe.engine_config(),
    );
    let report = reconciler.run(batch).await?;

    let directory = args
        .output
        .unwrap_or_else(|| recipe.output.directory.clone());
    JsonFileSink::new(directory).persist(&report)?;

    Ok(Some(report))
}
