// Lyrefeed - Live telemetry stage for focal-plane displays
// Copyright (c) 2025 Lyrefeed contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Scan downsampling and channel remapping
//!
//! Inbound Scan frames carry a block of samples for every raw readout
//! channel. Displays want a few frames per second with one dense vector of
//! detector values each, so a block is
//!
//! - decimated to roughly the target rate,
//! - re-keyed from raw channel to detector index through the channel mask,
//! - scaled from raw units to physical units,
//!
//! and emitted as one output frame per retained sample.
//!
//! A block that does not fit the current mask is degraded input: the frame
//! produces no output and the caller is told why, but it is not an error.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::frame::{Frame, FrameType, CHANNEL_MASK, DATA, STATUS, TIMESTAMP};

/// Prefix of raw channel keys in a sample block (`r0000`, `r0001`, ...)
pub const RAW_CHANNEL_PREFIX: char = 'r';

/// Key of a raw channel in a sample block
pub fn raw_channel_key(index: usize) -> String {
    format!("{RAW_CHANNEL_PREFIX}{index:04}")
}

/// Raw channel index of a sample block key.
///
/// Only the canonical `raw_channel_key` spelling is accepted, so `r1` and
/// `r0001` can never both name raw channel 1.
pub fn parse_raw_channel_key(key: &str) -> Option<usize> {
    let digits = key.strip_prefix(RAW_CHANNEL_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = digits.parse().ok()?;
    (raw_channel_key(index) == key).then_some(index)
}

/// Decimation stride for a block sampled at `sample_rate` Hz.
///
/// `floor(sample_rate / target_rate)`, never below 1. An undefined rate
/// (single-sample blocks) or a non-finite ratio keeps every sample.
pub fn decimation_factor(sample_rate: Option<f64>, target_rate: f64) -> usize {
    let ratio = match sample_rate {
        Some(rate) => rate / target_rate,
        None => return 1,
    };
    if !ratio.is_finite() {
        return 1;
    }
    (ratio.floor() as usize).max(1)
}

/// Raw channel index → detector index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMask(Vec<usize>);

impl ChannelMask {
    pub fn new(entries: Vec<usize>) -> Self {
        Self(entries)
    }

    /// Raw channel `i` feeds detector `i`
    pub fn identity(len: usize) -> Self {
        Self((0..len).collect())
    }

    /// Parse a mask register value, e.g. `"[3, 0, 1, 2]"`
    pub fn from_register_value(value: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(value)?))
    }

    /// Mask announced by a Configuration frame, if any.
    ///
    /// An explicit `ChannelMask` field wins over the `status` register dump.
    pub fn from_configuration(frame: &Frame, mask_register: &str) -> Result<Option<Self>> {
        if let Some(mask) = frame.decode::<Vec<usize>>(CHANNEL_MASK)? {
            return Ok(Some(Self(mask)));
        }
        let status = match frame.decode::<BTreeMap<String, Value>>(STATUS)? {
            Some(status) => status,
            None => return Ok(None),
        };
        let invalid = |reason: String| {
            PipelineError::invalid_frame(frame.frame_type(), STATUS, reason)
        };
        match status.get(mask_register) {
            None => Ok(None),
            Some(Value::String(text)) => Self::from_register_value(text)
                .map(Some)
                .map_err(|e| invalid(format!("{mask_register}: {e}"))),
            Some(other) => Vec::<usize>::deserialize(other)
                .map(|mask| Some(Self(mask)))
                .map_err(|e| invalid(format!("{mask_register}: {e}"))),
        }
    }

    pub fn get(&self, raw_channel: usize) -> Option<usize> {
        self.0.get(raw_channel).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

/// Samples of one inbound Scan frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBlock {
    /// Samples per second; undefined for single-sample blocks
    #[serde(default)]
    pub sample_rate: Option<f64>,
    /// Sample times
    pub times: Vec<f64>,
    /// Raw channel key → samples
    #[serde(default)]
    pub channels: BTreeMap<String, Vec<f64>>,
}

impl SampleBlock {
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }
}

/// Why a sample block was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedInput {
    /// Mask has fewer entries than the block has channels
    MaskTooShort { mask_len: usize, channels: usize },
    /// Raw channel index past the end of the mask
    ChannelOutsideMask { raw_channel: usize, mask_len: usize },
    /// Mask maps a raw channel past the last detector
    DetectorOutOfRange {
        raw_channel: usize,
        detector: usize,
        detector_count: usize,
    },
    /// Channel key is not `r<digits>`
    BadChannelKey(String),
    /// Channel has fewer samples than the block has times
    ShortSeries {
        raw_channel: usize,
        len: usize,
        expected: usize,
    },
}

impl fmt::Display for DegradedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedInput::MaskTooShort { mask_len, channels } => write!(
                f,
                "channel mask has {mask_len} entries but the frame has {channels} channels"
            ),
            DegradedInput::ChannelOutsideMask {
                raw_channel,
                mask_len,
            } => write!(
                f,
                "raw channel {raw_channel} is outside the {mask_len}-entry channel mask"
            ),
            DegradedInput::DetectorOutOfRange {
                raw_channel,
                detector,
                detector_count,
            } => write!(
                f,
                "raw channel {raw_channel} maps to detector {detector} of {detector_count}"
            ),
            DegradedInput::BadChannelKey(key) => write!(f, "bad channel key {key:?}"),
            DegradedInput::ShortSeries {
                raw_channel,
                len,
                expected,
            } => write!(
                f,
                "raw channel {raw_channel} has {len} samples, expected {expected}"
            ),
        }
    }
}

/// Result of remapping one Scan frame
#[derive(Debug, Clone, PartialEq)]
pub enum RemapOutcome {
    /// Frame had no sample block and goes through unchanged
    PassThrough,
    /// One output frame per retained sample, in sample order
    Frames(Vec<Frame>),
    /// Frame skipped
    Degraded(DegradedInput),
}

/// Downsamples and re-keys Scan frames
#[derive(Debug, Clone)]
pub struct SampleRemapper {
    mask: ChannelMask,
    target_rate: f64,
    detector_count: usize,
    raw_scale: f64,
}

impl SampleRemapper {
    /// Remapper with an identity mask over `detector_count` detectors
    pub fn new(detector_count: usize, target_rate: f64, raw_scale: f64) -> Self {
        Self {
            mask: ChannelMask::identity(detector_count),
            target_rate,
            detector_count,
            raw_scale,
        }
    }

    pub fn mask(&self) -> &ChannelMask {
        &self.mask
    }

    /// Replace the mask wholesale
    pub fn set_mask(&mut self, mask: ChannelMask) {
        self.mask = mask;
    }

    pub fn detector_count(&self) -> usize {
        self.detector_count
    }

    pub fn target_rate(&self) -> f64 {
        self.target_rate
    }

    /// Remap one Scan frame
    pub fn process(&self, frame: &Frame) -> Result<RemapOutcome> {
        match frame.decode::<SampleBlock>(DATA)? {
            None => Ok(RemapOutcome::PassThrough),
            Some(block) => Ok(self.remap(&block)),
        }
    }

    /// Remap one sample block
    pub fn remap(&self, block: &SampleBlock) -> RemapOutcome {
        match self.remap_block(block) {
            Ok(frames) => RemapOutcome::Frames(frames),
            Err(degraded) => RemapOutcome::Degraded(degraded),
        }
    }

    fn remap_block(&self, block: &SampleBlock) -> std::result::Result<Vec<Frame>, DegradedInput> {
        if self.mask.len() < block.channels.len() {
            return Err(DegradedInput::MaskTooShort {
                mask_len: self.mask.len(),
                channels: block.channels.len(),
            });
        }

        let n_samples = block.n_samples();
        let mut routed = Vec::with_capacity(block.channels.len());
        for (key, series) in &block.channels {
            let raw_channel = parse_raw_channel_key(key)
                .ok_or_else(|| DegradedInput::BadChannelKey(key.clone()))?;
            let detector = self
                .mask
                .get(raw_channel)
                .ok_or(DegradedInput::ChannelOutsideMask {
                    raw_channel,
                    mask_len: self.mask.len(),
                })?;
            if detector >= self.detector_count {
                return Err(DegradedInput::DetectorOutOfRange {
                    raw_channel,
                    detector,
                    detector_count: self.detector_count,
                });
            }
            if series.len() < n_samples {
                return Err(DegradedInput::ShortSeries {
                    raw_channel,
                    len: series.len(),
                    expected: n_samples,
                });
            }
            routed.push((raw_channel, detector, series));
        }
        // Block keys sort as strings ("r10000" < "r9999"); route in raw index order
        routed.sort_by_key(|&(raw_channel, _, _)| raw_channel);

        let stride = decimation_factor(block.sample_rate, self.target_rate);
        let frames = (0..n_samples)
            .step_by(stride)
            .map(|sample| {
                let mut data = vec![0.0; self.detector_count];
                for &(_, detector, series) in &routed {
                    data[detector] = series[sample] / self.raw_scale;
                }
                Frame::new(FrameType::Scan)
                    .with_field(TIMESTAMP, block.times[sample])
                    .with_field(DATA, data)
            })
            .collect();
        Ok(frames)
    }
}
