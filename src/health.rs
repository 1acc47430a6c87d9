// Lyrefeed - Live telemetry stage for focal-plane displays
// Copyright (c) 2025 Lyrefeed contributors
//
// Licensed under AGPL-3.0.
// See LICENSE file for details.

//! Readout module health
//!
//! Classifies one readout module from its housekeeping against fixed
//! threshold tables. The result is a set of boolean flags for the status
//! display plus a single diagnostic label naming the most important channel
//! fault.
//!
//! Channel faults are checked in priority order, and each channel is counted
//! once, under the first fault it shows:
//!
//! 1. `DanRail` - the nulling loop railed
//! 2. `CDDiffFreq` - carrier and demodulator frequencies differ
//! 3. `DanOff` - the channel is driven but nulling is not fully enabled

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::housekeeping::{
    BoardHousekeeping, ChannelHousekeeping, MezzanineHousekeeping, ModuleHousekeeping,
};

/// FIR stage the boards run at in normal observing
pub const NOMINAL_FIR_STAGE: i64 = 6;

/// Feedback mode register value meaning SQUID feedback is on
pub const FEEDBACK_ON_MODE: &str = "squid_lowpass";

/// Inclusive `[min, max]` range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range(pub f64, pub f64);

impl Range {
    pub fn min(&self) -> f64 {
        self.0
    }

    pub fn max(&self) -> f64 {
        self.1
    }

    /// Value lies within the range; NaN never does
    pub fn contains(&self, value: f64) -> bool {
        (self.0..=self.1).contains(&value)
    }
}

/// Quantity name → allowed range
pub type ThresholdTable = BTreeMap<String, Range>;

/// Check every reported value against a threshold table.
///
/// Returns `Ok(false)` on the first out-of-range value. A value whose name is
/// missing from the table is a [`PipelineError::ConfigMismatch`]: the table
/// does not cover the telemetry contract. All names are checked for presence
/// before any range is evaluated, so a mismatch is reported regardless of
/// iteration order.
pub fn range_check(
    table_name: &str,
    table: &ThresholdTable,
    values: &BTreeMap<String, f64>,
) -> Result<bool> {
    if let Some(key) = values.keys().find(|k| !table.contains_key(*k)) {
        return Err(PipelineError::ConfigMismatch {
            table: table_name.to_string(),
            key: key.clone(),
        });
    }
    Ok(values
        .iter()
        .all(|(key, value)| table[key].contains(*value)))
}

fn table(entries: &[(&str, f64, f64)]) -> ThresholdTable {
    entries
        .iter()
        .map(|&(name, min, max)| (name.to_string(), Range(min, max)))
        .collect()
}

/// Threshold tables for housekeeping range checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Motherboard rail voltages
    pub rails: ThresholdTable,
    /// Mezzanine rail voltages
    pub mezzanine_rails: ThresholdTable,
    /// Motherboard temperatures (°C)
    pub temperatures: ThresholdTable,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            rails: table(&[
                ("MOTHERBOARD_RAIL_VCC5V5", 5.0, 6.0),
                ("MOTHERBOARD_RAIL_VADJ", 2.0, 3.0),
                ("MOTHERBOARD_RAIL_VCC3V3", 3.0, 3.6),
                ("MOTHERBOARD_RAIL_VCC1V0", 0.8, 1.2),
                ("MOTHERBOARD_RAIL_VCC1V2", 1.0, 1.5),
                ("MOTHERBOARD_RAIL_VCC12V0", 11.0, 13.0),
                ("MOTHERBOARD_RAIL_VCC1V8", 1.6, 2.0),
                ("MOTHERBOARD_RAIL_VCC1V5", 1.3, 1.7),
                ("MOTHERBOARD_RAIL_VCC1V0_GTX", 0.7, 1.3),
            ]),
            mezzanine_rails: table(&[
                ("MEZZANINE_RAIL_VCC12V0", 11.0, 13.0),
                ("MEZZANINE_RAIL_VADJ", 2.0, 3.0),
                ("MEZZANINE_RAIL_VCC3V3", 3.0, 4.0),
            ]),
            temperatures: table(&[
                ("MOTHERBOARD_TEMPERATURE_FPGA", 0.0, 80.0),
                ("MOTHERBOARD_TEMPERATURE_POWER", 0.0, 80.0),
                ("MOTHERBOARD_TEMPERATURE_ARM", 0.0, 80.0),
                ("MOTHERBOARD_TEMPERATURE_PHY", 0.0, 80.0),
            ]),
        }
    }
}

impl HealthThresholds {
    /// Every range must be ordered
    pub fn validate(&self) -> Result<()> {
        for (name, table) in [
            ("rails", &self.rails),
            ("mezzanine_rails", &self.mezzanine_rails),
            ("temperatures", &self.temperatures),
        ] {
            for (key, range) in table {
                if !(range.min() <= range.max()) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "{name}.{key}: min {} exceeds max {}",
                        range.min(),
                        range.max()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Channel fault category, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelFault {
    /// Digital active nulling railed
    DanRailed,
    /// Carrier and demodulator frequencies differ
    FrequencyMismatch,
    /// Driven channel with nulling not fully enabled
    DanDisabled,
}

impl ChannelFault {
    /// Label prefix shown on the status display
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelFault::DanRailed => "DanRail",
            ChannelFault::FrequencyMismatch => "CDDiffFreq",
            ChannelFault::DanDisabled => "DanOff",
        }
    }

    /// First fault a channel shows, if any
    pub fn classify(channel: &ChannelHousekeeping) -> Option<Self> {
        if channel.dan_railed {
            Some(ChannelFault::DanRailed)
        } else if channel.carrier_frequency != channel.demod_frequency {
            Some(ChannelFault::FrequencyMismatch)
        } else if !channel.dan_enabled() && channel.is_driven() {
            Some(ChannelFault::DanDisabled)
        } else {
            None
        }
    }
}

/// Channel fault counts of one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultCounts {
    pub railed: usize,
    pub frequency_mismatch: usize,
    pub dan_off: usize,
}

impl FaultCounts {
    pub fn tally<'a, I>(channels: I) -> Self
    where
        I: IntoIterator<Item = &'a ChannelHousekeeping>,
    {
        let mut counts = Self::default();
        for channel in channels {
            match ChannelFault::classify(channel) {
                Some(ChannelFault::DanRailed) => counts.railed += 1,
                Some(ChannelFault::FrequencyMismatch) => counts.frequency_mismatch += 1,
                Some(ChannelFault::DanDisabled) => counts.dan_off += 1,
                None => {}
            }
        }
        counts
    }

    pub fn count(&self, fault: ChannelFault) -> usize {
        match fault {
            ChannelFault::DanRailed => self.railed,
            ChannelFault::FrequencyMismatch => self.frequency_mismatch,
            ChannelFault::DanDisabled => self.dan_off,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.railed == 0 && self.frequency_mismatch == 0 && self.dan_off == 0
    }

    /// Label of the highest-priority non-empty bucket, e.g. `DanRail:3`
    pub fn label(&self) -> Option<String> {
        [
            ChannelFault::DanRailed,
            ChannelFault::FrequencyMismatch,
            ChannelFault::DanDisabled,
        ]
        .into_iter()
        .find(|fault| self.count(*fault) > 0)
        .map(|fault| format!("{}:{}", fault.as_str(), self.count(fault)))
    }
}

/// Derived health of one readout module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleHealth {
    pub carrier_good: bool,
    pub nuller_good: bool,
    pub demod_good: bool,
    pub temperature_good: bool,
    pub voltage_good: bool,
    pub fir_stage: i64,
    pub feedback_on: bool,
    pub bolometer_good: bool,
    /// Diagnostic label; `None` when every channel is good
    pub label: Option<String>,
}

impl ModuleHealth {
    /// Health of a module missing from the housekeeping tree
    pub fn no_data() -> Self {
        Self {
            carrier_good: false,
            nuller_good: false,
            demod_good: false,
            temperature_good: false,
            voltage_good: false,
            fir_stage: 0,
            feedback_on: false,
            bolometer_good: false,
            label: Some("NoData".to_string()),
        }
    }

    pub fn fir_stage_good(&self) -> bool {
        self.fir_stage == NOMINAL_FIR_STAGE
    }

    /// Label text, empty when there is nothing to report
    pub fn label_str(&self) -> &str {
        self.label.as_deref().unwrap_or("")
    }
}

/// Evaluates module housekeeping against threshold tables
#[derive(Debug, Clone, Default)]
pub struct HealthEvaluator {
    thresholds: HealthThresholds,
}

impl HealthEvaluator {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Classify one module.
    ///
    /// Voltage health passes if either the motherboard or the mezzanine rail
    /// table fully passes. Both tables are always evaluated so a mismatch in
    /// either surfaces.
    pub fn evaluate(
        &self,
        board: &BoardHousekeeping,
        mezzanine: &MezzanineHousekeeping,
        module: &ModuleHousekeeping,
    ) -> Result<ModuleHealth> {
        let temperature_good =
            range_check("temperatures", &self.thresholds.temperatures, &board.temperatures)?;
        let rails_good = range_check("rails", &self.thresholds.rails, &board.voltages)?;
        let mezzanine_good = range_check(
            "mezzanine_rails",
            &self.thresholds.mezzanine_rails,
            &mezzanine.voltages,
        )?;

        let faults = FaultCounts::tally(module.channels.values());

        Ok(ModuleHealth {
            carrier_good: !module.carrier_railed,
            nuller_good: !module.nuller_railed,
            demod_good: !module.demod_railed,
            temperature_good,
            voltage_good: rails_good || mezzanine_good,
            fir_stage: board.fir_stage,
            feedback_on: module.squid_feedback.eq_ignore_ascii_case(FEEDBACK_ON_MODE),
            bolometer_good: faults.is_clean(),
            label: faults.label(),
        })
    }
}
