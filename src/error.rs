//! Error types for the lyrefeed stage
//!
//! Every fallible operation in the crate returns [`PipelineError`]. Only
//! [`PipelineError::ConfigMismatch`] is fatal to a running stream; the host
//! loop logs every other variant and moves on to the next frame.

use thiserror::Error;

use crate::frame::FrameType;

/// Result type alias for lyrefeed operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for lyrefeed operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Physical id string does not match the id grammar
    #[error("Malformed physical id {id:?}: {reason}")]
    MalformedId { id: String, reason: String },

    /// Serial or board id not present in the current topology
    #[error("Unknown id: {0}")]
    UnknownId(String),

    /// Threshold table has no range for a quantity the telemetry reports
    #[error("Threshold table {table} has no range for {key}")]
    ConfigMismatch { table: String, key: String },

    /// A known frame field could not be read as its typed payload
    #[error("Invalid {frame_type:?} frame field {field}: {reason}")]
    InvalidFrame {
        frame_type: FrameType,
        field: String,
        reason: String,
    },

    /// Two wiring entries claim the same channel of the same module
    #[error("Channel {channel} of module {module} on board {board_id} is wired twice")]
    DuplicateChannel {
        board_id: String,
        module: u32,
        channel: u32,
    },

    /// One board serial wired at two crate/slot addresses
    #[error("Board serial {serial} is wired as both {first} and {second}")]
    AmbiguousSerial {
        serial: String,
        first: String,
        second: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sink refused the output of a frame
    #[error("Frame sink closed: {0}")]
    SinkClosed(String),

    /// I/O error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether the stream must halt on this error.
    ///
    /// A threshold table that does not cover the telemetry contract means the
    /// static configuration itself is wrong, so it is surfaced immediately
    /// instead of being reported as a health fault.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigMismatch { .. })
    }

    pub(crate) fn malformed_id(id: &str, reason: impl Into<String>) -> Self {
        Self::MalformedId {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_frame(
        frame_type: FrameType,
        field: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFrame {
            frame_type,
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::ConfigMismatch {
            table: "rails".to_string(),
            key: "MOTHERBOARD_RAIL_VCC9V9".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Threshold table rails has no range for MOTHERBOARD_RAIL_VCC9V9"
        );

        let err = PipelineError::malformed_id("abc", "expected 3 parts");
        assert!(err.to_string().contains("\"abc\""));
    }

    #[test]
    fn test_only_config_mismatch_is_fatal() {
        assert!(PipelineError::ConfigMismatch {
            table: "t".into(),
            key: "k".into()
        }
        .is_fatal());
        assert!(!PipelineError::SinkClosed("gone".into()).is_fatal());
        assert!(!PipelineError::UnknownId("0137".into()).is_fatal());
        assert!(!PipelineError::malformed_id("x", "bad").is_fatal());
        assert!(!PipelineError::invalid_frame(FrameType::Scan, "data", "bad").is_fatal());
        assert!(!PipelineError::InvalidConfig("bad".into()).is_fatal());
    }
}
