// Lyrefeed - Live telemetry stage for focal-plane displays
// Copyright (c) 2025 Lyrefeed contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Stage configuration.
//!
//! Every field has a default, so a configuration document only needs to
//! name what it changes:
//!
//! ```json
//! {"target_rate_hz": 5.0, "thresholds": {"temperatures": {"MOTHERBOARD_TEMPERATURE_FPGA": [0, 70]}}}
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::focal_plane::FocalPlane;
use crate::health::HealthThresholds;
use crate::status::StatusLayout;

/// Raw-to-physical scale of 16-bit firmware words.
pub const DEFAULT_RAW_SCALE: f64 = 65536.0;

/// Register holding the raw-channel → detector mask in acquisition status dumps.
pub const DEFAULT_MASK_REGISTER: &str = "AMCc.SmurfProcessor.ChannelMapper.Mask";

/// Master configuration for the pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Output sample rate of remapped Scan frames (Hz).
    pub target_rate_hz: f64,

    /// Divisor from raw sample units to physical units.
    pub raw_scale: f64,

    /// Length of output detector vectors (default: focal plane detector count).
    pub detector_count: Option<usize>,

    /// Detector array announced to displays.
    pub focal_plane: FocalPlane,

    /// Announce the focal plane before the first output frame.
    pub announce_focal_plane: bool,

    /// Status register carrying the channel mask.
    pub mask_register: String,

    /// Housekeeping range tables.
    pub thresholds: HealthThresholds,

    /// Status display geometry.
    pub status: StatusLayout,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            target_rate_hz: 3.0,
            raw_scale: DEFAULT_RAW_SCALE,
            detector_count: None,
            focal_plane: FocalPlane::default(),
            announce_focal_plane: true,
            mask_register: DEFAULT_MASK_REGISTER.to_string(),
            thresholds: HealthThresholds::default(),
            status: StatusLayout::default(),
        }
    }
}

impl StageConfig {
    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Effective output vector length
    pub fn detector_count(&self) -> usize {
        self.detector_count
            .unwrap_or_else(|| self.focal_plane.detector_count())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.target_rate_hz.is_finite() && self.target_rate_hz > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "target_rate_hz must be positive, got {}",
                self.target_rate_hz
            )));
        }
        if !(self.raw_scale.is_finite() && self.raw_scale > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "raw_scale must be positive, got {}",
                self.raw_scale
            )));
        }
        self.focal_plane.validate()?;
        if self.detector_count() == 0 {
            return Err(PipelineError::InvalidConfig(
                "detector_count must be positive".to_string(),
            ));
        }
        if self.status.devices_per_column == 0 {
            return Err(PipelineError::InvalidConfig(
                "status.devices_per_column must be positive".to_string(),
            ));
        }
        self.thresholds.validate()
    }
}
