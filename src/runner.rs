// Lyrefeed - Live telemetry stage for focal-plane displays
// Copyright (c) 2025 Lyrefeed contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Host loop
//!
//! The stage never does I/O itself. Hosts plug a frame source, a frame sink
//! and a status sink into [`run`], which feeds frames through the stage one
//! at a time until Shutdown, source exhaustion or a fatal error.

use std::sync::mpsc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use crate::pipeline::{Pipeline, StageStats};
use crate::status::StatusSnapshot;

/// Supplies inbound frames in arrival order
pub trait FrameSource {
    /// Next frame, or `None` once the source is exhausted
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Accepts the frames produced for each inbound frame
pub trait FrameSink {
    /// Accept an ordered, possibly empty, batch of frames
    fn send(&mut self, frames: Vec<Frame>) -> Result<()>;

    /// Push out anything buffered
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Consumes live status snapshots
pub trait StatusSink {
    fn update(&mut self, snapshot: &StatusSnapshot) -> Result<()>;
}

impl FrameSource for mpsc::Receiver<Frame> {
    fn next_frame(&mut self) -> Option<Frame> {
        self.recv().ok()
    }
}

/// Frame source over any iterator of frames
#[derive(Debug)]
pub struct IterSource<I>(I);

impl<I: Iterator<Item = Frame>> IterSource<I> {
    pub fn new(frames: impl IntoIterator<Item = Frame, IntoIter = I>) -> Self {
        Self(frames.into_iter())
    }
}

impl<I: Iterator<Item = Frame>> FrameSource for IterSource<I> {
    fn next_frame(&mut self) -> Option<Frame> {
        self.0.next()
    }
}

impl FrameSink for Vec<Frame> {
    fn send(&mut self, frames: Vec<Frame>) -> Result<()> {
        self.extend(frames);
        Ok(())
    }
}

impl FrameSink for mpsc::Sender<Frame> {
    fn send(&mut self, frames: Vec<Frame>) -> Result<()> {
        for frame in frames {
            mpsc::Sender::send(self, frame)
                .map_err(|_| PipelineError::SinkClosed("receiver dropped".to_string()))?;
        }
        Ok(())
    }
}

impl StatusSink for Vec<StatusSnapshot> {
    fn update(&mut self, snapshot: &StatusSnapshot) -> Result<()> {
        self.push(snapshot.clone());
        Ok(())
    }
}

/// Status sink that drops every snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardStatus;

impl StatusSink for DiscardStatus {
    fn update(&mut self, _snapshot: &StatusSnapshot) -> Result<()> {
        Ok(())
    }
}

/// Why the host loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Shutdown frame processed
    Shutdown,
    /// Source ran dry without a Shutdown frame
    SourceExhausted,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub stop: StopReason,
    /// Frames taken from the source
    pub frames_read: u64,
    /// Frames skipped because of a non-fatal error
    pub frames_rejected: u64,
    /// Warnings raised by the stage
    pub warnings: u64,
    pub stats: StageStats,
}

/// Drive a stage until Shutdown, source exhaustion or a fatal error.
///
/// Non-fatal processing errors are logged and the offending frame is
/// skipped. The sink is flushed on every exit path.
pub fn run<S, K, T>(
    pipeline: &mut Pipeline,
    source: &mut S,
    sink: &mut K,
    status: &mut T,
) -> Result<RunSummary>
where
    S: FrameSource + ?Sized,
    K: FrameSink + ?Sized,
    T: StatusSink + ?Sized,
{
    let mut summary = RunSummary {
        stop: StopReason::SourceExhausted,
        frames_read: 0,
        frames_rejected: 0,
        warnings: 0,
        stats: StageStats::default(),
    };

    let driven = drive(pipeline, source, sink, status, &mut summary);
    let flushed = sink.flush();
    summary.stop = driven?;
    flushed?;
    summary.stats = pipeline.stats().clone();

    info!(
        "Run finished ({:?}): {} frames read, {} out, {} rejected, {} degraded",
        summary.stop,
        summary.frames_read,
        summary.stats.frames_out,
        summary.frames_rejected,
        summary.stats.degraded_frames
    );
    Ok(summary)
}

fn drive<S, K, T>(
    pipeline: &mut Pipeline,
    source: &mut S,
    sink: &mut K,
    status: &mut T,
    summary: &mut RunSummary,
) -> Result<StopReason>
where
    S: FrameSource + ?Sized,
    K: FrameSink + ?Sized,
    T: StatusSink + ?Sized,
{
    while let Some(frame) = source.next_frame() {
        summary.frames_read += 1;
        let output = match pipeline.process(frame) {
            Ok(output) => output,
            Err(e) if e.is_fatal() => {
                error!("Halting: {e}");
                return Err(e);
            }
            Err(e) => {
                warn!("Frame rejected: {e}");
                summary.frames_rejected += 1;
                continue;
            }
        };

        summary.warnings += output.warnings.len() as u64;
        if let Some(snapshot) = &output.status {
            if let Err(e) = status.update(snapshot) {
                warn!("Status sink failed: {e}");
            }
        }
        sink.send(output.frames)?;

        if pipeline.is_finished() {
            return Ok(StopReason::Shutdown);
        }
    }
    Ok(StopReason::SourceExhausted)
}
