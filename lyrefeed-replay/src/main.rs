// Lyrefeed Replay - Recorded stream replay
// Copyright (c) 2025 Lyrefeed contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! # Lyrefeed Replay
//!
//! Feeds a recorded JSON-lines frame stream through the lyrefeed stage.
//!
//! ## Usage
//!
//! ```bash
//! # Replay a recording at 10 frames per second, status rows on stderr
//! lyrefeed-replay --input run42.jsonl --interval-ms 100
//!
//! # Read stdin, write output frames to a file with a custom configuration
//! cat run42.jsonl | lyrefeed-replay --config stage.json --output out.jsonl
//! ```

mod batch;
mod render;
mod replay;

use batch::BatchingSink;
use clap::Parser;
use lyrefeed::{run, Pipeline, StageConfig};
use render::TextStatus;
use replay::{open_input, Replay, ReplayConfig, ReplayError};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Lyrefeed stream replay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON-lines frame stream to replay (`-` for stdin)
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Write output frames here instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Stage configuration (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Pause between inbound frames in milliseconds
    #[arg(long, default_value = "0")]
    interval_ms: u64,

    /// Frames buffered between the reader and the stage
    #[arg(long, default_value = "64")]
    queue_depth: usize,

    /// Output frames written per batch
    #[arg(short, long, default_value = "32")]
    batch: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!("Lyrefeed Replay v{}", env!("CARGO_PKG_VERSION"));

    match execute(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Replay failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(args: &Args) -> Result<(), ReplayError> {
    let config = match &args.config {
        Some(path) => StageConfig::from_file(path)?,
        None => StageConfig::default(),
    };
    let mut stage = Pipeline::new(config)?;

    let replay_config = ReplayConfig {
        input: args.input.clone(),
        interval: Duration::from_millis(args.interval_ms),
        queue_depth: args.queue_depth,
    };
    let input = open_input(&replay_config.input)?;

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    let mut sink = BatchingSink::new(writer, args.batch);
    let mut status = TextStatus::new(io::stderr());

    let mut replay = Replay::start(input, &replay_config);
    let result = run(&mut stage, replay.frames(), &mut sink, &mut status);
    let reader_stats = replay.finish()?;
    let summary = result?;

    info!(
        "Replayed {} frames ({} unreadable lines): {} in, {} out, {} rejected, {} warnings, stopped on {:?}",
        reader_stats.frames,
        reader_stats.skipped,
        summary.frames_read,
        summary.stats.frames_out,
        summary.frames_rejected,
        summary.warnings,
        summary.stop
    );
    info!(
        "{} frames written in {} batches",
        sink.frames_written(),
        sink.batches_written()
    );
    Ok(())
}
