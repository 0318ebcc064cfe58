mod config;

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use config::{Command, Config};
use firewall_path_analyzer::{FlowRequest, TopologySnapshot, analyze_batch, compare, load_flows, load_topology};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Initialize logging; RUST_LOG directives refine the configured level
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match config.command.clone() {
        Command::Analyze {
            topology,
            device,
            src,
            dst,
            port,
            protocol,
        } => {
            let snapshot = open_topology(&topology)?;
            let request = FlowRequest {
                device,
                src,
                dst,
                protocol,
                port,
            };
            let (device, flow) = request.resolve(&snapshot)?;
            tracing::info!("Analyzing {} from device {}", flow, device);

            let result = snapshot.analyze_path(&device, &flow, &config.analyze_options())?;
            tracing::info!("Verdict: {}", result.verdict);
            print_json(&result, config.pretty)?;
        }

        Command::Batch { topology, flows } => {
            let snapshot = Arc::new(open_topology(&topology)?);
            let requests = load_flows(&flows)
                .with_context(|| format!("failed to load flows from {}", flows.display()))?;

            let results = analyze_batch(snapshot, requests, config.analyze_options()).await;
            let entries = results
                .into_iter()
                .map(|result| match result {
                    Ok(result) => serde_json::to_value(result),
                    Err(e) => {
                        tracing::warn!("Flow failed: {}", e);
                        Ok(serde_json::json!({ "error": e.user_message() }))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&entries, config.pretty)?;
        }

        Command::WhatIf {
            topology,
            candidate,
            flows,
        } => {
            let baseline = Arc::new(open_topology(&topology)?);
            let candidate = Arc::new(open_topology(&candidate)?);
            let requests = load_flows(&flows)
                .with_context(|| format!("failed to load flows from {}", flows.display()))?;

            let changes = compare(baseline, candidate, requests, config.analyze_options()).await?;
            print_json(&changes, config.pretty)?;
        }
    }

    Ok(())
}

fn open_topology(path: &Path) -> anyhow::Result<TopologySnapshot> {
    load_topology(path).with_context(|| format!("failed to load topology from {}", path.display()))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}
