// Lyrefeed - Live telemetry stage for focal-plane displays
// Copyright (c) 2025 Lyrefeed contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Pipeline stage - frame-driven state machine.
//!
//! [`Pipeline::process`] is the single transition function: it takes one
//! inbound frame, updates the stage state and returns everything derived
//! from that frame.
//!
//! | Inbound        | State change                        | Emitted                       |
//! |----------------|-------------------------------------|-------------------------------|
//! | Configuration  | topology, channel mask              | `[synthesized?, frame]`       |
//! | Calibration    | metadata authority                  | `[synthesized?, frame]`       |
//! | Housekeeping   | -                                   | `frame` + status snapshot     |
//! | Scan           | -                                   | remapped frames, or nothing   |
//! | Shutdown       | finished                            | `frame`                       |
//!
//! The first frame processed is preceded by the focal-plane announcement
//! when enabled. Frames arriving after Shutdown are dropped.

use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::StageConfig;
use crate::error::Result;
use crate::frame::{Frame, FrameType, HOUSEKEEPING, WIRING_MAP};
use crate::health::HealthEvaluator;
use crate::housekeeping::HousekeepingMap;
use crate::metadata::MetadataSynthesizer;
use crate::remap::{ChannelMask, DegradedInput, RemapOutcome, SampleRemapper};
use crate::status::{StatusBoard, StatusSnapshot};
use crate::wiring::{WiringMap, WiringState};

/// Recoverable condition reported alongside a frame's output
#[derive(Debug, Clone, PartialEq)]
pub enum StageWarning {
    /// Scan frame skipped
    DegradedInput(DegradedInput),
    /// Frame arrived after Shutdown and was dropped
    AfterShutdown(FrameType),
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageWarning::DegradedInput(d) => write!(f, "degraded input, frame skipped: {d}"),
            StageWarning::AfterShutdown(t) => {
                write!(f, "{} frame after Shutdown dropped", t.as_str())
            }
        }
    }
}

/// Everything derived from one inbound frame
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    /// Frames for the outbound sink, in order
    pub frames: Vec<Frame>,
    /// Status snapshot for the live display
    pub status: Option<StatusSnapshot>,
    pub warnings: Vec<StageWarning>,
}

/// Stage counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub frames_in: u64,
    pub frames_out: u64,
    pub scan_frames_out: u64,
    pub degraded_frames: u64,
    pub mask_updates: u64,
    pub synthesized_generations: u64,
    pub status_snapshots: u64,
    pub dropped_after_shutdown: u64,
}

/// The telemetry pipeline stage
#[derive(Debug)]
pub struct Pipeline {
    config: StageConfig,
    wiring: WiringState,
    metadata: MetadataSynthesizer,
    remapper: SampleRemapper,
    status: StatusBoard,
    announced: bool,
    finished: bool,
    stats: StageStats,
}

impl Pipeline {
    /// Create a stage from a validated configuration
    pub fn new(config: StageConfig) -> Result<Self> {
        config.validate()?;
        let remapper = SampleRemapper::new(
            config.detector_count(),
            config.target_rate_hz,
            config.raw_scale,
        );
        let status = StatusBoard::new(
            &config.status,
            HealthEvaluator::new(config.thresholds.clone()),
        );
        Ok(Self {
            announced: !config.announce_focal_plane,
            config,
            wiring: WiringState::new(),
            metadata: MetadataSynthesizer::new(),
            remapper,
            status,
            finished: false,
            stats: StageStats::default(),
        })
    }

    /// Process one inbound frame.
    ///
    /// On error the frame is dropped and the stage state is unchanged, apart
    /// from topology already accepted from a Configuration frame whose
    /// metadata synthesis failed.
    pub fn process(&mut self, frame: Frame) -> Result<StageOutput> {
        let frame_type = frame.frame_type();
        if self.finished {
            warn!("{} frame after Shutdown dropped", frame_type.as_str());
            self.stats.dropped_after_shutdown += 1;
            return Ok(StageOutput {
                warnings: vec![StageWarning::AfterShutdown(frame_type)],
                ..Default::default()
            });
        }

        self.stats.frames_in += 1;
        debug!("Processing {} frame", frame_type.as_str());

        let mut output = match frame_type {
            FrameType::Configuration => self.on_configuration(frame)?,
            FrameType::Calibration => self.on_calibration(frame)?,
            FrameType::Housekeeping => self.on_housekeeping(frame)?,
            FrameType::Scan => self.on_scan(frame)?,
            FrameType::Shutdown => {
                info!("Shutdown received");
                self.finished = true;
                StageOutput {
                    frames: vec![frame],
                    ..Default::default()
                }
            }
        };

        if !self.announced {
            output.frames.insert(0, self.config.focal_plane.announcement());
            self.announced = true;
        }
        self.stats.frames_out += output.frames.len() as u64;
        Ok(output)
    }

    fn on_configuration(&mut self, frame: Frame) -> Result<StageOutput> {
        let wiring = frame.decode::<WiringMap>(WIRING_MAP)?;
        let mask = ChannelMask::from_configuration(&frame, &self.config.mask_register)?;

        if let Some(map) = wiring {
            self.wiring.on_configuration_frame(map)?;
        }
        if let Some(mask) = mask {
            info!("Channel mask replaced ({} entries)", mask.len());
            self.remapper.set_mask(mask);
            self.stats.mask_updates += 1;
        }

        self.with_synthesized(frame)
    }

    fn on_calibration(&mut self, frame: Frame) -> Result<StageOutput> {
        self.metadata.observe_calibration(&frame);
        self.with_synthesized(frame)
    }

    fn with_synthesized(&mut self, frame: Frame) -> Result<StageOutput> {
        let mut frames = Vec::with_capacity(2);
        if let Some(synthesized) = self.metadata.maybe_synthesize(&self.wiring)? {
            self.stats.synthesized_generations += 1;
            frames.push(synthesized);
        }
        frames.push(frame);
        Ok(StageOutput {
            frames,
            ..Default::default()
        })
    }

    fn on_housekeeping(&mut self, frame: Frame) -> Result<StageOutput> {
        let status = if self.wiring.is_known() {
            let housekeeping = frame
                .decode::<HousekeepingMap>(HOUSEKEEPING)?
                .unwrap_or_default();
            let snapshot = self.status.snapshot(&self.wiring, &housekeeping)?;
            self.stats.status_snapshots += 1;
            Some(snapshot)
        } else {
            debug!("Housekeeping before topology, no status snapshot");
            None
        };
        Ok(StageOutput {
            frames: vec![frame],
            status,
            warnings: Vec::new(),
        })
    }

    fn on_scan(&mut self, frame: Frame) -> Result<StageOutput> {
        match self.remapper.process(&frame)? {
            RemapOutcome::PassThrough => Ok(StageOutput {
                frames: vec![frame],
                ..Default::default()
            }),
            RemapOutcome::Frames(frames) => {
                self.stats.scan_frames_out += frames.len() as u64;
                Ok(StageOutput {
                    frames,
                    ..Default::default()
                })
            }
            RemapOutcome::Degraded(degraded) => {
                warn!("Skipping Scan frame until a matching mask arrives: {degraded}");
                self.stats.degraded_frames += 1;
                Ok(StageOutput {
                    warnings: vec![StageWarning::DegradedInput(degraded)],
                    ..Default::default()
                })
            }
        }
    }

    /// Whether Shutdown has been processed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> &StageStats {
        &self.stats
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn wiring(&self) -> &WiringState {
        &self.wiring
    }

    pub fn mask(&self) -> &ChannelMask {
        self.remapper.mask()
    }
}
