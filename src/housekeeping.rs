//! Housekeeping payload
//!
//! Typed view of the `DfMuxHousekeeping` field: a tree of board → mezzanine
//! → module → channel sensor and register readings. Every field defaults so
//! that partial snapshots from older firmware still decode.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// Housekeeping for every board, keyed by board serial
pub type HousekeepingMap = BTreeMap<String, BoardHousekeeping>;

/// Per-board housekeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardHousekeeping {
    /// Acquisition time, seconds since the Unix epoch
    pub timestamp: Option<f64>,
    /// Decimation filter stage of the board
    pub fir_stage: i64,
    /// Motherboard temperatures by sensor name
    #[serde(deserialize_with = "readings")]
    pub temperatures: BTreeMap<String, f64>,
    /// Motherboard rail voltages by rail name
    #[serde(deserialize_with = "readings")]
    pub voltages: BTreeMap<String, f64>,
    /// Mezzanines by 1-based index
    pub mezz: BTreeMap<u32, MezzanineHousekeeping>,
}

/// Per-mezzanine housekeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MezzanineHousekeeping {
    /// Mezzanine rail voltages by rail name
    #[serde(deserialize_with = "readings")]
    pub voltages: BTreeMap<String, f64>,
    /// Modules by 1-based index within the mezzanine
    pub modules: BTreeMap<u32, ModuleHousekeeping>,
}

/// Per-module housekeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleHousekeeping {
    pub carrier_railed: bool,
    pub nuller_railed: bool,
    pub demod_railed: bool,
    /// SQUID feedback mode register, e.g. `SQUID_LOWPASS`
    pub squid_feedback: String,
    /// Channels by index within the module
    pub channels: BTreeMap<u32, ChannelHousekeeping>,
}

/// Per-channel housekeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelHousekeeping {
    pub dan_railed: bool,
    #[serde(deserialize_with = "reading")]
    pub carrier_frequency: f64,
    #[serde(deserialize_with = "reading")]
    pub demod_frequency: f64,
    #[serde(deserialize_with = "reading")]
    pub carrier_amplitude: f64,
    pub dan_accumulator_enable: bool,
    pub dan_feedback_enable: bool,
    pub dan_streaming_enable: bool,
}

// serde_json writes NaN as null; read it back as NaN so the value fails its
// range check rather than the whole frame.
fn reading<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

fn readings<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, f64>, D::Error> {
    let raw = BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| (name, value.unwrap_or(f64::NAN)))
        .collect())
}

impl ChannelHousekeeping {
    /// All three digital active nulling loops enabled
    pub fn dan_enabled(&self) -> bool {
        self.dan_accumulator_enable && self.dan_feedback_enable && self.dan_streaming_enable
    }

    /// A carrier tone is being driven into the channel
    pub fn is_driven(&self) -> bool {
        self.carrier_frequency > 0.0 && self.carrier_amplitude > 0.0
    }
}

impl BoardHousekeeping {
    /// Module housekeeping at a 1-based mezzanine/module address
    pub fn module(
        &self,
        mezzanine: u32,
        module: u32,
    ) -> Option<(&MezzanineHousekeeping, &ModuleHousekeeping)> {
        let mezz = self.mezz.get(&mezzanine)?;
        let module = mezz.modules.get(&module)?;
        Some((mezz, module))
    }

    /// Acquisition time rendered to whole seconds, e.g. `19-Oct-2025:14:03:07`
    pub fn timestamp_label(&self) -> Option<String> {
        let ts = self.timestamp?;
        if !ts.is_finite() {
            return None;
        }
        let secs = ts.floor();
        let nanos = ((ts - secs) * 1e9) as u32;
        let time = DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))?;
        Some(time.format("%d-%b-%Y:%H:%M:%S").to_string())
    }
}
