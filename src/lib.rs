//! # Lyrefeed - live telemetry stage for focal-plane displays
//!
//! A stateful, frame-driven pipeline stage that sits between a detector
//! readout chain and its live viewers.
//!
//! ## Key Features
//!
//! - **Topology tracking**: wiring maps and channel masks replaced wholesale
//! - **Placeholder metadata**: detector positions synthesized from wiring when
//!   calibration carries none
//! - **Health classification**: housekeeping checked against threshold tables,
//!   one diagnostic label per readout module
//! - **Downsampling**: high-rate scans decimated and re-keyed to detector
//!   vectors for display
//!
//! ## Quick Start
//!
//! ```rust
//! use lyrefeed::{Frame, FrameType, Pipeline, StageConfig};
//! use serde_json::json;
//!
//! let config = StageConfig {
//!     detector_count: Some(2),
//!     announce_focal_plane: false,
//!     ..StageConfig::default()
//! };
//! let mut stage = Pipeline::new(config).unwrap();
//!
//! let scan = Frame::new(FrameType::Scan).with_field(
//!     "data",
//!     json!({"sample_rate": 200.0, "times": [0.0], "channels": {"r0001": [65536.0]}}),
//! );
//! let output = stage.process(scan).unwrap();
//! assert_eq!(output.frames[0].get_f64_seq("data"), Some(vec![0.0, 1.0]));
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: Frame model and wire format
//! - [`physical_id`]: Board and device id codec
//! - [`layout`]: Grid placement of devices and channels
//! - [`health`]: Threshold tables and module health
//! - [`wiring`]: Topology state
//! - [`metadata`]: Placeholder detector metadata
//! - [`remap`]: Scan downsampling and channel remapping
//! - [`pipeline`]: The stage state machine
//! - [`runner`]: Host loop and I/O seams

// Modules
pub mod config;
pub mod error;
pub mod focal_plane;
pub mod frame;
pub mod health;
pub mod housekeeping;
pub mod layout;
pub mod metadata;
pub mod physical_id;
pub mod pipeline;
pub mod remap;
pub mod runner;
pub mod status;
pub mod wiring;

// Re-exports for convenient access
pub use config::StageConfig;
pub use error::{PipelineError, Result};
pub use focal_plane::FocalPlane;
pub use frame::{Frame, FrameType};
pub use health::{HealthEvaluator, HealthThresholds, ModuleHealth, Range, ThresholdTable};
pub use housekeeping::{BoardHousekeeping, HousekeepingMap};
pub use layout::{square_block, BlockDims, GridSpec, LayoutPosition};
pub use metadata::{DetectorProperties, MetadataSynthesizer};
pub use pipeline::{Pipeline, StageOutput, StageStats, StageWarning};
pub use remap::{ChannelMask, DegradedInput, RemapOutcome, SampleRemapper};
pub use runner::{run, FrameSink, FrameSource, IterSource, RunSummary, StatusSink, StopReason};
pub use status::{StatusLayout, StatusSnapshot};
pub use wiring::{WiringMap, WiringRecord, WiringState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_stage_builds() {
        let stage = Pipeline::new(StageConfig::default()).unwrap();
        assert_eq!(stage.mask().len(), 4096);
        assert!(!stage.is_finished());
    }
}
