//! `run` command implementation.

use anyhow::{Context, Result};
use config_loader::{ConfigLoader, SourceOverride};
use contracts::{PipelineBlueprint, SourceKind};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let overrides = SourceOverride {
        host: args.host.clone(),
        port: args.port,
    };
    if !overrides.is_empty() {
        info!(host = ?overrides.host, port = ?overrides.port, "Applying source overrides from CLI");
    }
    let blueprint = ConfigLoader::load_with_overrides(&args.config, &overrides)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        source = ?blueprint.source.kind,
        retention_sec = blueprint.buffer.retention_sec,
        trigger = ?blueprint.snapshot.trigger,
        storage = blueprint.storage.len(),
        detectors = blueprint.detectors.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        queue_size: args.queue_size,
        monitor: args.monitor,
    });

    info!("Starting pipeline...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        stop_reason = %stats.stop_reason,
        current_index = stats.current_index,
        duration_secs = stats.duration.as_secs_f64(),
        throughput = format!("{:.1}", stats.sample_throughput()),
        "Pipeline finished"
    );
    stats.print_summary();

    if let Some(reason) = stats.halted() {
        return Err(CliError::pipeline_halted(reason).into());
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &PipelineBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Source:");
    match blueprint.source.kind {
        SourceKind::Tcp => {
            println!("  TCP: {}:{}", blueprint.source.host, blueprint.source.port);
        }
        SourceKind::Synthetic => {
            let synthetic = &blueprint.source.synthetic;
            println!(
                "  Synthetic: {} channels @ {} Hz, {} rows/frame",
                synthetic.channels.len(),
                synthetic.sample_rate,
                synthetic.frame_rows
            );
        }
    }
    println!("  Poll interval: {} ms", blueprint.source.poll_interval_ms);

    println!("\nBuffer retention: {} s", blueprint.buffer.retention_sec);
    println!("Snapshot trigger: {:?}", blueprint.snapshot.trigger);

    if !blueprint.engine.phases.is_empty() {
        println!("\nPhases ({}):", blueprint.engine.phases.len());
        for phase in &blueprint.engine.phases {
            println!("  - {} (u: {}, i: {})", phase.name, phase.u_channel, phase.i_channel);
        }
    }

    if !blueprint.storage.is_empty() {
        println!("\nStorage ({}):", blueprint.storage.len());
        for plan in &blueprint.storage {
            println!("  - {} ({:?})", plan.name, plan.sink_type);
        }
    }

    if !blueprint.detectors.is_empty() {
        println!("\nDetectors ({}):", blueprint.detectors.len());
        for detector in &blueprint.detectors {
            println!(
                "  - {} {:?} @ {}",
                detector.channel, detector.kind, detector.threshold
            );
        }
    }

    println!();
}
