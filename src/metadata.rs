//! Placeholder detector metadata
//!
//! Displays need a position and a name for every detector. When the upstream
//! calibration stream carries no detector properties, they are synthesized
//! from the wiring topology: devices laid out on a grid, channels packed into
//! a near-square block inside their device.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame::{Frame, FrameType, BOLOMETER_PROPERTIES, NOMINAL_BOLOMETER_PROPERTIES};
use crate::layout::{place_channel_within_device, place_devices, square_block, GridSpec, LayoutPosition};
use crate::wiring::WiringState;

/// Gap factor between neighbouring device blocks
pub const DEVICE_SPACING_FACTOR: f64 = 1.2;

/// Metadata of one detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorProperties {
    pub name: String,
    pub band: f64,
    pub pol_angle: f64,
    pub pol_efficiency: f64,
    pub board_id: String,
    pub device_id: String,
    pub x: f64,
    pub y: f64,
}

/// Detector name → metadata
pub type DetectorPropertiesMap = BTreeMap<String, DetectorProperties>;

/// Where the current detector metadata comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSource {
    /// Nothing known yet
    Absent,
    /// Synthesized for a topology generation
    Synthesized { generation: u64 },
    /// Supplied by a Calibration frame; never overridden
    Authoritative,
}

/// Whether a Calibration frame carries authoritative detector metadata
pub fn has_authoritative_metadata(frame: &Frame) -> bool {
    frame.has(BOLOMETER_PROPERTIES) || frame.has(NOMINAL_BOLOMETER_PROPERTIES)
}

/// Tracks metadata authority and synthesizes placeholders once per topology
#[derive(Debug, Clone)]
pub struct MetadataSynthesizer {
    source: MetadataSource,
}

impl Default for MetadataSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataSynthesizer {
    pub fn new() -> Self {
        Self {
            source: MetadataSource::Absent,
        }
    }

    pub fn source(&self) -> MetadataSource {
        self.source
    }

    /// Record a Calibration frame. Once authoritative metadata has been seen
    /// it stays in force for the rest of the stream.
    pub fn observe_calibration(&mut self, frame: &Frame) {
        if has_authoritative_metadata(frame) && self.source != MetadataSource::Authoritative {
            info!("Authoritative detector metadata received");
            self.source = MetadataSource::Authoritative;
        }
    }

    /// Build a placeholder Calibration frame if the current topology has none yet
    pub fn maybe_synthesize(&mut self, wiring: &WiringState) -> Result<Option<Frame>> {
        if !wiring.is_known() {
            return Ok(None);
        }
        match self.source {
            MetadataSource::Authoritative => return Ok(None),
            MetadataSource::Synthesized { generation } if generation == wiring.generation() => {
                return Ok(None)
            }
            _ => {}
        }

        let properties = synthesize(wiring);
        info!(
            "Synthesized metadata for {} detectors (topology generation {})",
            properties.len(),
            wiring.generation()
        );
        self.source = MetadataSource::Synthesized {
            generation: wiring.generation(),
        };
        let frame =
            Frame::new(FrameType::Calibration).with_payload(BOLOMETER_PROPERTIES, &properties)?;
        Ok(Some(frame))
    }
}

/// Placeholder metadata for every wired channel
pub fn synthesize(wiring: &WiringState) -> DetectorPropertiesMap {
    let n_channels = wiring
        .records()
        .map(|(_, r)| r.channel as usize + 1)
        .max()
        .unwrap_or(0);
    let channel_block = square_block(n_channels);
    let device_block = square_block(wiring.device_ids().len());

    let grid = GridSpec::new(
        device_block.rows,
        LayoutPosition::new(
            DEVICE_SPACING_FACTOR * channel_block.cols as f64,
            DEVICE_SPACING_FACTOR * channel_block.rows as f64,
        ),
    );
    let devices = place_devices(wiring.device_ids(), &grid);

    wiring
        .records()
        .map(|(name, record)| {
            let device_id = record.device_id();
            let origin = devices.get(&device_id).copied().unwrap_or_default();
            let position =
                place_channel_within_device(record.channel as usize, channel_block, origin);
            let properties = DetectorProperties {
                name: name.to_string(),
                band: 0.0,
                pol_angle: 0.0,
                pol_efficiency: 0.0,
                board_id: record.board_id(),
                device_id,
                x: position.x,
                y: position.y,
            };
            (name.to_string(), properties)
        })
        .collect()
}
