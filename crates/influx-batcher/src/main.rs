// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! influx-batcher CLI
//!
//! Reads newline-delimited JSON measurements from stdin and writes them to
//! InfluxDB in batches.
//!
//! # Usage
//!
//! ```bash
//! # Defaults, or INFLUXDB_* environment variables
//! my-app | influx-batcher
//!
//! # Explicit endpoint and trigger size
//! my-app | influx-batcher --url http://influx:8086/write --trigger-size 500
//!
//! # Using a configuration file
//! influx-batcher --config batcher.yaml < metrics.ndjson
//! ```

use anyhow::Context;
use clap::Parser;
use influx_batcher::mapping::parse_line;
use influx_batcher::{Engine, InstallOptions};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Buffered InfluxDB writer for newline-delimited JSON measurements
#[derive(Parser, Debug)]
#[command(name = "influx-batcher")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write endpoint (e.g. http://localhost:8086/write)
    #[arg(long)]
    url: Option<String>,

    /// Basic-auth user
    #[arg(long)]
    username: Option<String>,

    /// Basic-auth password
    #[arg(long)]
    password: Option<String>,

    /// Idle timeout before a non-empty buffer is written (milliseconds)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Pending measurements that trigger an immediate write
    #[arg(long)]
    trigger_size: Option<usize>,

    /// Maximum measurements per request
    #[arg(long)]
    max_batch_size: Option<usize>,

    /// Maximum buffered measurements before new ones are dropped
    #[arg(long)]
    max_buffer_size: Option<usize>,

    /// Maximum concurrent requests
    #[arg(long)]
    max_clients: Option<usize>,

    /// Probability that a write cycle is submitted (0.0 to 1.0)
    #[arg(long)]
    sample_probability: Option<f64>,

    /// Extra base tag (key=value, can repeat)
    #[arg(short, long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    /// Do not add the hostname base tag
    #[arg(long)]
    no_hostname_tag: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_tag(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid tag {:?} (expected key=value)", s)),
    }
}

fn build_options(args: &Args) -> anyhow::Result<InstallOptions> {
    let mut options = match args.config {
        Some(ref path) => InstallOptions::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => InstallOptions::default(),
    };

    if args.url.is_some() {
        options.url = args.url.clone();
    }
    if args.username.is_some() {
        options.username = args.username.clone();
    }
    if args.password.is_some() {
        options.password = args.password.clone();
    }
    options.timeout_interval_ms = args.interval_ms.or(options.timeout_interval_ms);
    options.trigger_size = args.trigger_size.or(options.trigger_size);
    options.max_batch_size = args.max_batch_size.or(options.max_batch_size);
    options.max_buffer_size = args.max_buffer_size.or(options.max_buffer_size);
    options.max_clients = args.max_clients.or(options.max_clients);
    options.sample_probability = args.sample_probability.or(options.sample_probability);
    if args.no_hostname_tag {
        options.tag_hostname = Some(false);
    }
    options.base_tags.extend(args.tags.iter().cloned());
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let options = build_options(&args)?;
    let engine = Engine::new();
    if !engine.install(options).context("installing engine")? {
        tracing::warn!("InfluxDB submission disabled, input will be discarded");
    }

    let base_tags = engine.base_tags();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0u64;

    loop {
        tokio::select! {
            next = lines.next_line() => {
                let Some(line) = next.context("reading stdin")? else {
                    break;
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line, &base_tags) {
                    Ok(m) => {
                        if let Err(e) = engine.add_measurement(m) {
                            tracing::warn!("line {}: {}", line_no, e);
                        }
                    }
                    Err(e) => tracing::warn!("line {}: {}", line_no, e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, draining buffer");
                break;
            }
        }
    }

    engine.shutdown().await;

    let stats = engine.stats();
    tracing::info!(
        "Done: {} admitted, {} delivered, {} rejected, {} invalid, {} sampled out",
        stats.admitted,
        stats.delivered,
        stats.rejected,
        stats.dropped_invalid,
        stats.sampled_out
    );
    Ok(())
}
