// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod proc;
pub mod spec;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::expand::Batch;
use crate::config::{expand_batches, load_and_validate};
use crate::orchestrator::Orchestrator;
use crate::proc::Timings;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading + validation
/// - experiment expansion into batches
/// - one orchestrator run per batch, sequentially
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let batches = expand_batches(&cfg, args.experiment.as_deref())?;

    if args.dry_run {
        print_dry_run(&batches);
        return Ok(());
    }

    let timings = Timings {
        unit: Duration::from_millis(cfg.config.time_unit_ms),
    };
    let orchestrator = Orchestrator::new(timings);

    for batch in batches {
        info!(
            experiment = %batch.experiment,
            scale = batch.scale,
            processes = batch.specs.len(),
            "starting batch"
        );
        let reports = orchestrator.run(batch.specs).await?;
        for report in &reports {
            info!(
                proc = %report.name,
                outcome = ?report.outcome,
                "batch member finished"
            );
        }
    }

    Ok(())
}

/// Simple dry-run output: print batches, specs, and dependencies.
fn print_dry_run(batches: &[Batch]) {
    println!("sweeprun dry-run");
    println!();

    println!("batches ({}):", batches.len());
    for batch in batches {
        println!("  - {} (scale {})", batch.experiment, batch.scale);
        for spec in &batch.specs {
            println!("      {}", spec.name);
            println!("        tokens: {:?}", spec.tokens);
            println!("        timeout: {:?}", spec.timeout);
            if let Some(ref marker) = spec.terminate_marker {
                println!("        terminate_marker: {marker}");
            }
            if let Some(ref dep) = spec.depends_on {
                println!("        depends_on: {dep}");
            }
        }
    }
}
