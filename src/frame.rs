// Lyrefeed - Live telemetry stage for focal-plane displays
// Copyright (c) 2025 Lyrefeed contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Frame model
//!
//! A [`Frame`] is a typed, ordered bag of named fields. The type tag drives
//! dispatch in the pipeline stage; the fields are JSON values so frames can
//! carry scalars, strings, sequences and the nested records of the typed
//! payloads (wiring maps, housekeeping trees, sample blocks).
//!
//! # Wire format
//!
//! ```text
//! {"type": "Scan", "fields": {"timestamp": 1.5, "data": [0.0, 0.25, ...]}}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};

/// Field carrying the wiring topology in Configuration frames.
pub const WIRING_MAP: &str = "WiringMap";
/// Field carrying an explicit channel mask in Configuration frames.
pub const CHANNEL_MASK: &str = "ChannelMask";
/// Register dump carried by Configuration frames from the acquisition crate.
pub const STATUS: &str = "status";
/// Authoritative detector metadata in Calibration frames.
pub const BOLOMETER_PROPERTIES: &str = "BolometerProperties";
/// Nominal (design) detector metadata, also authoritative.
pub const NOMINAL_BOLOMETER_PROPERTIES: &str = "NominalBolometerProperties";
/// Housekeeping tree keyed by board serial.
pub const HOUSEKEEPING: &str = "DfMuxHousekeeping";
/// Sample block in inbound Scan frames, dense detector vector in outbound ones.
pub const DATA: &str = "data";
/// Sample time of an outbound Scan frame.
pub const TIMESTAMP: &str = "timestamp";

/// Frame type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    /// Wiring topology and acquisition register state
    Configuration,
    /// Detector metadata
    Calibration,
    /// Readout electronics sensor snapshot
    Housekeeping,
    /// Per-channel sample scan
    Scan,
    /// End of stream
    Shutdown,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Configuration => "Configuration",
            FrameType::Calibration => "Calibration",
            FrameType::Housekeeping => "Housekeeping",
            FrameType::Scan => "Scan",
            FrameType::Shutdown => "Shutdown",
        }
    }
}

/// A typed bag of named fields.
///
/// Fields are only settable while building; once a frame is handed to the
/// stage it is read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    frame_type: FrameType,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Frame {
    /// Create an empty frame of the given type
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            fields: Map::new(),
        }
    }

    /// Create a Shutdown frame
    pub fn shutdown() -> Self {
        Self::new(FrameType::Shutdown)
    }

    /// Builder: set a field
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Builder: set a field from any serializable payload
    pub fn with_payload<T: Serialize>(self, name: &str, payload: &T) -> Result<Self> {
        let value = serde_json::to_value(payload)?;
        Ok(self.with_field(name, value))
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Check if a field is present
    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Raw field value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field names in order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Decode a field into its typed view.
    ///
    /// Returns `Ok(None)` when the field is absent and
    /// [`PipelineError::InvalidFrame`] when it is present but has the wrong
    /// shape.
    pub fn decode<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| PipelineError::invalid_frame(self.frame_type, name, e.to_string())),
        }
    }

    /// Read a numeric field
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    /// Read a numeric sequence field
    pub fn get_f64_seq(&self, name: &str) -> Option<Vec<f64>> {
        self.fields
            .get(name)?
            .as_array()?
            .iter()
            .map(Value::as_f64)
            .collect()
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to a single-line JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_builder_and_accessors() {
        let frame = Frame::new(FrameType::Scan)
            .with_field(TIMESTAMP, 12.5)
            .with_field(DATA, vec![0.0, 1.0, 2.0]);

        assert_eq!(frame.frame_type(), FrameType::Scan);
        assert!(frame.has(TIMESTAMP));
        assert!(!frame.has("missing"));
        assert_eq!(frame.get_f64(TIMESTAMP), Some(12.5));
        assert_eq!(frame.get_f64_seq(DATA), Some(vec![0.0, 1.0, 2.0]));
        assert_eq!(frame.field_count(), 2);
        assert_eq!(frame.field_names().collect::<Vec<_>>(), vec![DATA, TIMESTAMP]);
    }

    #[test]
    fn test_decode_absent_present_and_invalid() {
        let frame = Frame::new(FrameType::Configuration)
            .with_field(CHANNEL_MASK, json!([2, 0, 1]))
            .with_field("bad", json!("not a list"));

        let mask: Option<Vec<usize>> = frame.decode(CHANNEL_MASK).unwrap();
        assert_eq!(mask, Some(vec![2, 0, 1]));

        let absent: Option<Vec<usize>> = frame.decode("absent").unwrap();
        assert!(absent.is_none());

        let err = frame.decode::<Vec<usize>>("bad").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidFrame {
                frame_type: FrameType::Configuration,
                ..
            }
        ));
    }

    #[test]
    fn test_with_payload() {
        let mut payload = BTreeMap::new();
        payload.insert("a".to_string(), 1u32);
        let frame = Frame::new(FrameType::Calibration)
            .with_payload("map", &payload)
            .unwrap();
        let back: BTreeMap<String, u32> = frame.decode("map").unwrap().unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_json_wire_format() {
        let json = r#"{"type": "Housekeeping", "fields": {"x": [1, 2]}}"#;
        let frame = Frame::from_json(json).unwrap();
        assert_eq!(frame.frame_type(), FrameType::Housekeeping);
        assert_eq!(frame.get_f64_seq("x"), Some(vec![1.0, 2.0]));

        let line = frame.to_json().unwrap();
        assert!(line.contains("\"type\":\"Housekeeping\""));
        assert_eq!(Frame::from_json(&line).unwrap(), frame);

        // Fields may be omitted entirely
        let bare = Frame::from_json(r#"{"type": "Shutdown"}"#).unwrap();
        assert_eq!(bare, Frame::shutdown());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(Frame::from_json(r#"{"type": "Timepoint"}"#).is_err());
    }
}
