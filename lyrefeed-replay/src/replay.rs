// Lyrefeed Replay - Recorded stream replay
// Copyright (c) 2025 Lyrefeed contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Frame stream reader.
//!
//! Recorded streams are JSON lines, one frame per line. A reader thread
//! parses them and pushes frames into a bounded queue; the stage consumes
//! the queue on the main thread, so the stage itself is never shared.
//!
//! The reader stops at end of input or at the first frame the stage no
//! longer accepts. A reader still waiting on open input (a live stdin after
//! Shutdown) is detached rather than joined.

use lyrefeed::{Frame, PipelineError};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for a replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Input path, `-` for stdin.
    pub input: String,
    /// Pause between frames (zero = as fast as the stage consumes).
    pub interval: Duration,
    /// Frames buffered between the reader and the stage.
    pub queue_depth: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input: "-".to_string(),
            interval: Duration::ZERO,
            queue_depth: 64,
        }
    }
}

/// Counters kept by the reader thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Frames handed to the stage.
    pub frames: u64,
    /// Lines that did not parse as frames.
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct ReaderCounters {
    frames: AtomicU64,
    skipped: AtomicU64,
}

impl ReaderCounters {
    fn snapshot(&self) -> ReaderStats {
        ReaderStats {
            frames: self.frames.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
        }
    }
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Input not found: {0}")]
    InputNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Reader thread panicked")]
    ReaderPanicked,
}

/// Open the input stream.
pub fn open_input(input: &str) -> Result<Box<dyn BufRead + Send>, ReplayError> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let path = Path::new(input);
    if !path.exists() {
        return Err(ReplayError::InputNotFound(input.to_string()));
    }
    Ok(Box::new(BufReader::new(File::open(path)?)))
}

/// Running replay: the queue the stage reads from plus the reader thread.
pub struct Replay {
    frames: Receiver<Frame>,
    reader: JoinHandle<()>,
    counters: Arc<ReaderCounters>,
}

impl Replay {
    /// Start reading `input` into a queue of `config.queue_depth` frames.
    pub fn start<R>(input: R, config: &ReplayConfig) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(config.queue_depth.max(1));
        let interval = config.interval;
        let counters = Arc::new(ReaderCounters::default());
        let shared = Arc::clone(&counters);
        let reader = thread::spawn(move || read_frames(input, tx, interval, &shared));
        Self {
            frames: rx,
            reader,
            counters,
        }
    }

    /// Queue the stage consumes.
    pub fn frames(&mut self) -> &mut Receiver<Frame> {
        &mut self.frames
    }

    /// Stop consuming and release the reader.
    ///
    /// A reader blocked on a full queue wakes up and exits. One blocked on
    /// input that never reaches end of file is left detached; it exits on
    /// its next line or at EOF.
    pub fn finish(self) -> Result<ReaderStats, ReplayError> {
        // Dropping the receiver unblocks a reader waiting on a full queue
        drop(self.frames);
        if self.reader.is_finished() {
            self.reader.join().map_err(|_| ReplayError::ReaderPanicked)?;
        } else {
            debug!("Reader still waiting on input, detaching it");
        }
        Ok(self.counters.snapshot())
    }
}

fn read_frames<R: BufRead>(
    input: R,
    tx: SyncSender<Frame>,
    interval: Duration,
    counters: &ReaderCounters,
) {
    for (index, line) in input.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Read error at line {}: {}", index + 1, e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match Frame::from_json(&line) {
            Ok(frame) => {
                // Counted before the send so a consumer never sees a frame
                // the counters do not yet include
                counters.frames.fetch_add(1, Ordering::AcqRel);
                if tx.send(frame).is_err() {
                    counters.frames.fetch_sub(1, Ordering::AcqRel);
                    debug!("Stage stopped consuming, reader exiting");
                    break;
                }
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }
            Err(e) => {
                warn!("Skipping line {}: {}", index + 1, e);
                counters.skipped.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    let stats = counters.snapshot();
    debug!("Reader done: {} frames, {} skipped", stats.frames, stats.skipped);
}
