//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::{Cadence, PipelineBlueprint, SourceKind};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    source: SourceInfo,
    retention_sec: f64,
    display: DisplayInfo,
    snapshot_trigger: String,
    phases: Vec<PhaseInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    storage: Vec<StorageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_channels: Option<Vec<String>>,
    detector_count: usize,
}

#[derive(Serialize)]
struct SourceInfo {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<Vec<String>>,
    poll_interval_ms: u64,
}

#[derive(Serialize)]
struct DisplayInfo {
    min_span_sec: f64,
    max_span_sec: f64,
    default_span_sec: f64,
    refresh_ms: u64,
}

#[derive(Serialize)]
struct PhaseInfo {
    name: String,
    u_channel: String,
    i_channel: String,
}

#[derive(Serialize)]
struct StorageInfo {
    name: String,
    sink_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    channels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cadence: Option<String>,
    events: bool,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn describe_cadence(cadence: Cadence) -> String {
    match cadence {
        Cadence::Seconds(s) => format!("every {s} s"),
        Cadence::Samples(n) => format!("every {n} samples"),
    }
}

/// Output channel names, when the source layout is known offline
fn output_channel_names(blueprint: &PipelineBlueprint) -> Option<Vec<String>> {
    let source_channels = blueprint.static_source_channels()?;
    Some(
        blueprint
            .engine
            .output_channels(&source_channels)
            .iter()
            .map(ToString::to_string)
            .collect(),
    )
}

fn build_config_info(blueprint: &PipelineBlueprint, args: &InfoArgs) -> ConfigInfo {
    let source = &blueprint.source;
    let (address, sample_rate, channels) = match source.kind {
        SourceKind::Tcp => (Some(format!("{}:{}", source.host, source.port)), None, None),
        SourceKind::Synthetic => (
            None,
            Some(source.synthetic.sample_rate),
            Some(source.synthetic.channels.clone()),
        ),
    };

    let storage = if args.storage {
        blueprint
            .storage
            .iter()
            .map(|plan| StorageInfo {
                name: plan.name.clone(),
                sink_type: format!("{:?}", plan.sink_type),
                channels: plan.channels.clone(),
                cadence: plan.cadence.map(describe_cadence),
                events: plan.events,
                queue_capacity: plan.queue_capacity,
                params: plan.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        source: SourceInfo {
            kind: format!("{:?}", source.kind).to_lowercase(),
            address,
            sample_rate,
            channels,
            poll_interval_ms: source.poll_interval_ms,
        },
        retention_sec: blueprint.buffer.retention_sec,
        display: DisplayInfo {
            min_span_sec: blueprint.display.min_span_sec,
            max_span_sec: blueprint.display.max_span_sec,
            default_span_sec: blueprint.display.default_span_sec,
            refresh_ms: blueprint.display.refresh_ms,
        },
        snapshot_trigger: describe_cadence(blueprint.snapshot.trigger),
        phases: blueprint
            .engine
            .phases
            .iter()
            .map(|p| PhaseInfo {
                name: p.name.clone(),
                u_channel: p.u_channel.clone(),
                i_channel: p.i_channel.clone(),
            })
            .collect(),
        storage,
        output_channels: if args.outputs {
            output_channel_names(blueprint)
        } else {
            None
        },
        detector_count: blueprint.detectors.len(),
    }
}

fn print_config_info(blueprint: &PipelineBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                DAQ Pipeline Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    // Source
    let source = &blueprint.source;
    println!("📡 Source");
    println!("   ├─ Version: {:?}", blueprint.version);
    match source.kind {
        SourceKind::Tcp => {
            println!("   ├─ TCP server: {}:{}", source.host, source.port);
        }
        SourceKind::Synthetic => {
            println!(
                "   ├─ Synthetic: {:?} @ {} Hz, {} rows/frame",
                source.synthetic.channels, source.synthetic.sample_rate, source.synthetic.frame_rows
            );
        }
    }
    println!("   └─ Poll interval: {} ms", source.poll_interval_ms);

    // Buffer and display
    let display = &blueprint.display;
    println!("\n🗄  Buffer");
    println!("   ├─ Retention: {} s", blueprint.buffer.retention_sec);
    println!(
        "   ├─ Display span: {} s (range {}..{} s)",
        display.default_span_sec, display.min_span_sec, display.max_span_sec
    );
    println!("   └─ Refresh: {} ms", display.refresh_ms);

    // Engine
    println!("\n⚙️  Snapshots");
    println!("   ├─ Trigger: {}", describe_cadence(blueprint.snapshot.trigger));
    println!("   ├─ Tick: {} ms", blueprint.snapshot.tick_ms);
    if blueprint.engine.phases.is_empty() {
        println!("   └─ Phases: none");
    } else {
        println!("   └─ Phases ({}):", blueprint.engine.phases.len());
        for (i, phase) in blueprint.engine.phases.iter().enumerate() {
            let prefix = if i == blueprint.engine.phases.len() - 1 { "└─" } else { "├─" };
            println!(
                "        {} {} (u: {}, i: {})",
                prefix, phase.name, phase.u_channel, phase.i_channel
            );
        }
    }

    if args.outputs {
        match output_channel_names(blueprint) {
            Some(names) => {
                println!("\n📐 Output Channels ({})", names.len());
                println!("   └─ {}", names.join(", "));
            }
            None => println!("\n📐 Output Channels: known after connecting to the source"),
        }
    }

    // Storage
    if !blueprint.storage.is_empty() {
        println!("\n📤 Storage ({})", blueprint.storage.len());
        for (i, plan) in blueprint.storage.iter().enumerate() {
            let is_last = i == blueprint.storage.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            let child_prefix = if is_last { "   " } else { "│  " };

            println!("   {} {} ({:?})", prefix, plan.name, plan.sink_type);
            if args.storage {
                let channels = if plan.channels.is_empty() {
                    "all".to_string()
                } else {
                    plan.channels.join(", ")
                };
                let cadence = plan
                    .cadence
                    .map(describe_cadence)
                    .unwrap_or_else(|| "every snapshot".to_string());
                println!("   {}  ├─ Channels: {}", child_prefix, channels);
                println!("   {}  ├─ Cadence: {}", child_prefix, cadence);
                println!("   {}  └─ Events: {}", child_prefix, plan.events);
            }
        }
    }

    // Detectors
    if !blueprint.detectors.is_empty() {
        println!("\n⚡ Detectors ({})", blueprint.detectors.len());
        for (i, detector) in blueprint.detectors.iter().enumerate() {
            let prefix = if i == blueprint.detectors.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {} {:?} @ {} (hysteresis {}, min {} s)",
                prefix,
                detector.channel,
                detector.kind,
                detector.threshold,
                detector.hysteresis,
                detector.min_duration_sec
            );
        }
    }

    println!();
}
