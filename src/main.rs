mod error;

use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use imgstock_collect::{GoogleSearch, LocalSaver, SaverHandle, SearcherHandle, collector_for};
use imgstock_config::Config;
use imgstock_store::{Database, Repository};
use imgstock_watcher::{ImgWatcher, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Keep a rotating stock of search-sourced images for every category.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (TOML, YAML or JSON). Defaults to the per-user
    /// configuration directory.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Watch this category in addition to the configured ones.
    #[arg(short = 'C', long = "category", value_name = "NAME")]
    categories: Vec<String>,
    /// Remove stored images without a downloaded file before starting (files
    /// mode only).
    #[arg(long)]
    purge: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match Config::load(args.config.as_deref()).or_raise(|| ErrorKind::Config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:?}");
            return ExitCode::FAILURE;
        },
    };
    init_logging(&config.log_level);
    tracing::debug!(
        file = ?args.config.clone().or_else(|| Config::default_path().filter(|p| p.is_file())),
        categories = ?config.categories,
        "Configuration loaded"
    );
    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "Exiting");
            ExitCode::FAILURE
        },
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn run(args: Args, config: Config) -> Result<()> {
    let db = Database::connect(&config.database).await.or_raise(|| ErrorKind::Store)?;
    let cache = imgstock_cache::select(config.cache.address(), config.cache.db).await;

    let searcher: SearcherHandle = Arc::new(GoogleSearch::new(config.search.key.clone(), config.search.cx.clone()));
    let saver: SaverHandle = Arc::new(LocalSaver::new(config.root.clone()));
    let collector = collector_for(config.watcher.collecting_mode, searcher, saver);
    let settings = Settings {
        minimal_available: config.watcher.minimal_available,
        maximum_uses: config.watcher.maximum_uses,
        check_interval: config.watcher.check_interval(),
        collecting_mode: config.watcher.collecting_mode,
    };
    tracing::info!(
        mode = %settings.collecting_mode,
        minimal_available = settings.minimal_available,
        maximum_uses = settings.maximum_uses,
        "Starting imgstock"
    );
    let watcher = ImgWatcher::new(Repository::from(&db), cache, collector, settings)
        .await
        .or_raise(|| ErrorKind::Watcher)?;

    if args.purge {
        if let Err(err) = watcher.purge_empty().await {
            tracing::error!(error = ?err, "Purging records without files failed");
        }
    }

    let mut categories = config.categories;
    categories.extend(args.categories);
    categories.sort();
    categories.dedup();
    if categories.is_empty() {
        tracing::warn!("No categories configured, only serving what is already stored");
    }
    for category in categories {
        watcher.spawn_watch(category).await;
    }
    watcher.spawn_sync();

    let signal = tokio::signal::ctrl_c().await.or_raise(|| ErrorKind::Signal);
    let synced = watcher.shutdown().await;
    db.close().await;
    signal?;
    let written = synced.or_raise(|| ErrorKind::Watcher)?;
    tracing::info!(written, "Shutdown complete");
    Ok(())
}
