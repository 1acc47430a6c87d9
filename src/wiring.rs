//! Wiring topology state
//!
//! Holds the current map from logical channel key to hardware address and a
//! serial ↔ board id index derived from it. A Configuration frame carrying a
//! wiring map replaces all of it; there is no incremental merge.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::layout::natural_cmp;
use crate::physical_id;

/// Hardware address of one logical channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WiringRecord {
    pub board_serial: String,
    pub crate_serial: String,
    pub board_slot: u32,
    /// 0-based module number on the board
    pub module: u32,
    /// Channel index within the module
    pub channel: u32,
}

impl WiringRecord {
    pub fn board_id(&self) -> String {
        physical_id::board_id(&self.board_serial, &self.crate_serial, self.board_slot)
    }

    pub fn device_id(&self) -> String {
        physical_id::device_id(
            &self.board_serial,
            &self.crate_serial,
            self.board_slot,
            self.module,
        )
    }
}

/// Logical channel key → hardware address
pub type WiringMap = BTreeMap<String, WiringRecord>;

/// Current topology and the indices derived from it
#[derive(Debug, Clone, Default)]
pub struct WiringState {
    map: WiringMap,
    board_by_serial: HashMap<String, String>,
    serial_by_board: HashMap<String, String>,
    device_ids: Vec<String>,
    generation: u64,
}

impl WiringState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the topology with a newly announced wiring map.
    ///
    /// A map that wires the same channel of a module twice, or places one
    /// board serial at two crate/slot addresses, is rejected and the
    /// previous topology stays in place.
    pub fn on_configuration_frame(&mut self, map: WiringMap) -> Result<()> {
        let mut seen = BTreeSet::new();
        let mut board_by_serial: HashMap<String, String> = HashMap::new();
        let mut serial_by_board = HashMap::new();
        let mut devices = BTreeSet::new();
        for record in map.values() {
            let board_id = record.board_id();
            if !seen.insert((board_id.clone(), record.module, record.channel)) {
                return Err(PipelineError::DuplicateChannel {
                    board_id,
                    module: record.module,
                    channel: record.channel,
                });
            }
            if let Some(first) = board_by_serial.get(&record.board_serial) {
                if *first != board_id {
                    return Err(PipelineError::AmbiguousSerial {
                        serial: record.board_serial.clone(),
                        first: first.clone(),
                        second: board_id,
                    });
                }
            }
            board_by_serial.insert(record.board_serial.clone(), board_id.clone());
            serial_by_board.insert(board_id, record.board_serial.clone());
            devices.insert(record.device_id());
        }
        let mut device_ids: Vec<String> = devices.into_iter().collect();
        device_ids.sort_by(|a, b| natural_cmp(a, b));

        self.map = map;
        self.board_by_serial = board_by_serial;
        self.serial_by_board = serial_by_board;
        self.device_ids = device_ids;
        self.generation += 1;

        info!(
            "Topology generation {}: {} channels on {} devices",
            self.generation,
            self.map.len(),
            self.device_ids.len()
        );
        Ok(())
    }

    pub fn board_id_for_serial(&self, serial: &str) -> Result<&str> {
        self.board_by_serial
            .get(serial)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::UnknownId(serial.to_string()))
    }

    pub fn serial_for_board_id(&self, board_id: &str) -> Result<&str> {
        self.serial_by_board
            .get(board_id)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::UnknownId(board_id.to_string()))
    }

    /// Whether any topology has been announced
    pub fn is_known(&self) -> bool {
        self.generation > 0
    }

    /// Number of wiring maps accepted so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn map(&self) -> &WiringMap {
        &self.map
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &WiringRecord)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Distinct device ids, naturally sorted
    pub fn device_ids(&self) -> &[String] {
        &self.device_ids
    }

    pub fn channel_count(&self) -> usize {
        self.map.len()
    }
}
