mod cli;
mod logging;
mod progress_bars;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands, IndexArgs};
use colored::*;
use dotenv::dotenv;
use hashfs::config::{load_configuration, Overrides};
use hashfs::store::{Catalog, MemoryCatalog, RocksCatalog};
use hashfs::{IndexEngine, RunSummary};
use progress_bars::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Index(index_args)) => run_index(&args.config, index_args),
        Some(Commands::PrintConfig) => print_config(&args.config),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(err) => {
            error!("Error: {:#}", err);
            process::exit(1);
        }
    }
}

/// Returns `false` when the run finished with skipped or failed files.
fn run_index(config_file: &Option<std::path::PathBuf>, args: IndexArgs) -> anyhow::Result<bool> {
    let overrides = Overrides {
        source_dirs: args.dirs,
        hash_algorithm: args.hash_algorithm,
        catalog_path: args.catalog,
        concurrency: args.concurrency,
    };
    let config = load_configuration(config_file.as_deref(), &overrides)
        .context("Error loading configuration")?;

    let catalog: Arc<dyn Catalog> = if args.memory {
        info!("Using an in-memory catalog");
        Arc::new(MemoryCatalog::new())
    } else {
        let catalog = RocksCatalog::open_with_tables(
            &config.catalog_path,
            &config.files_table,
            &config.locations_table,
        )
        .with_context(|| format!("Error opening catalog at {}", config.catalog_path))?;
        Arc::new(catalog)
    };

    let engine = IndexEngine::new(config, catalog)?;
    let summary = engine.run(&CliReporter::new())?;
    print_summary(&summary);

    Ok(summary.is_clean())
}

fn print_config(config_file: &Option<std::path::PathBuf>) -> anyhow::Result<bool> {
    let config = load_configuration(config_file.as_deref(), &Overrides::default())
        .context("Error loading configuration")?;
    println!("Configuration: {:#?}", config);
    Ok(true)
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "=== Index Summary ===".bold());
    for source in &summary.sources {
        println!("  Source:              {}", source);
    }
    println!("  Files seen:          {}", summary.files_seen);
    println!(
        "  New contents:        {}",
        summary.contents_created.to_string().green()
    );
    println!(
        "  New locations:       {}",
        summary.locations_appended.to_string().green()
    );
    println!("  Already indexed:     {}", summary.already_indexed);
    println!(
        "  Skipped:             {}",
        summary.skipped.len().to_string().yellow()
    );
    println!(
        "  Failed:              {}",
        summary.failed.len().to_string().red()
    );
    println!("  Duration:            {:.2}s", summary.duration.as_secs_f64());
    if summary.cancelled {
        println!("  {}", "Run was cancelled before completion".yellow());
    }

    for failure in &summary.skipped {
        warn!("Skipped {}: {}", failure.path.display(), failure.reason);
    }
    for failure in &summary.failed {
        error!("Failed {}: {}", failure.path.display(), failure.reason);
    }
}
