//! Live status snapshot
//!
//! Every Housekeeping frame rebuilds a full snapshot of device positions and
//! module health for the status display. Nothing is diffed: renderers redraw
//! from scratch.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::health::{HealthEvaluator, ModuleHealth};
use crate::housekeeping::HousekeepingMap;
use crate::layout::{place_devices, GridSpec, LayoutPosition};
use crate::physical_id::decode_device_id;
use crate::wiring::WiringState;

/// Status display geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusLayout {
    /// Device rows per display column
    pub devices_per_column: usize,
    /// Width of a display column in characters
    pub column_width: usize,
    /// Rows reserved for the legend above the first device
    pub legend_rows: usize,
}

impl Default for StatusLayout {
    fn default() -> Self {
        Self {
            devices_per_column: 32,
            column_width: 30,
            legend_rows: 7,
        }
    }
}

impl StatusLayout {
    /// Placement grid; the first device goes below the legend and its rule
    pub fn grid(&self) -> GridSpec {
        GridSpec::new(
            self.devices_per_column,
            LayoutPosition::new(self.column_width as f64, 1.0),
        )
        .with_origin(LayoutPosition::new(1.0, 1.0))
        .with_first_slot(self.legend_rows + 1)
    }
}

/// Renderable status of every device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Acquisition time label, empty when unknown
    pub timestamp: String,
    pub positions: BTreeMap<String, LayoutPosition>,
    pub health: BTreeMap<String, ModuleHealth>,
}

impl StatusSnapshot {
    /// Devices in display order (column by column, top to bottom)
    pub fn devices_in_display_order(&self) -> Vec<&str> {
        let mut devices: Vec<(&str, LayoutPosition)> = self
            .positions
            .iter()
            .map(|(id, p)| (id.as_str(), *p))
            .collect();
        devices.sort_by(|a, b| {
            a.1.x
                .total_cmp(&b.1.x)
                .then(a.1.y.total_cmp(&b.1.y))
                .then(a.0.cmp(b.0))
        });
        devices.into_iter().map(|(id, _)| id).collect()
    }
}

/// Builds status snapshots from housekeeping
#[derive(Debug, Clone)]
pub struct StatusBoard {
    grid: GridSpec,
    evaluator: HealthEvaluator,
    positions: BTreeMap<String, LayoutPosition>,
    generation: u64,
}

impl StatusBoard {
    pub fn new(layout: &StatusLayout, evaluator: HealthEvaluator) -> Self {
        Self {
            grid: layout.grid(),
            evaluator,
            positions: BTreeMap::new(),
            generation: 0,
        }
    }

    /// Snapshot for one housekeeping tree.
    ///
    /// Devices whose board or module is missing from the tree report
    /// [`ModuleHealth::no_data`]. A threshold table mismatch is returned as
    /// an error.
    pub fn snapshot(
        &mut self,
        wiring: &WiringState,
        housekeeping: &HousekeepingMap,
    ) -> Result<StatusSnapshot> {
        if self.generation != wiring.generation() {
            self.positions = place_devices(wiring.device_ids(), &self.grid);
            self.generation = wiring.generation();
        }

        let mut health = BTreeMap::new();
        for device_id in wiring.device_ids() {
            let address = decode_device_id(device_id)?;
            let serial = wiring.serial_for_board_id(&address.board_id)?;
            let module_health = match housekeeping
                .get(serial)
                .and_then(|board| Some((board, board.module(address.mezzanine, address.module)?)))
            {
                Some((board, (mezzanine, module))) => {
                    self.evaluator.evaluate(board, mezzanine, module)?
                }
                None => {
                    debug!("No housekeeping for {device_id}");
                    ModuleHealth::no_data()
                }
            };
            health.insert(device_id.clone(), module_health);
        }

        let timestamp = housekeeping
            .values()
            .next()
            .and_then(|board| board.timestamp_label())
            .unwrap_or_default();

        Ok(StatusSnapshot {
            timestamp,
            positions: self.positions.clone(),
            health,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::housekeeping::{BoardHousekeeping, MezzanineHousekeeping, ModuleHousekeeping};
    use crate::wiring::{WiringMap, WiringRecord};

    fn wiring() -> WiringState {
        let map: WiringMap = [(0u32, 0u32), (4, 0), (4, 1)]
            .iter()
            .enumerate()
            .map(|(i, &(module, channel))| {
                (
                    format!("det{i}"),
                    WiringRecord {
                        board_serial: "0137".to_string(),
                        crate_serial: "5".to_string(),
                        board_slot: 3,
                        module,
                        channel,
                    },
                )
            })
            .collect();
        let mut state = WiringState::new();
        state.on_configuration_frame(map).unwrap();
        state
    }

    fn housekeeping() -> HousekeepingMap {
        let mut mezz = MezzanineHousekeeping::default();
        mezz.modules.insert(
            1,
            ModuleHousekeeping {
                squid_feedback: "squid_lowpass".to_string(),
                ..Default::default()
            },
        );
        let mut board = BoardHousekeeping {
            timestamp: Some(1_760_882_587.75),
            fir_stage: 6,
            ..Default::default()
        };
        board.mezz.insert(1, mezz);
        [("0137".to_string(), board)].into_iter().collect()
    }

    #[test]
    fn test_layout_grid_leaves_room_for_legend() {
        let grid = StatusLayout::default().grid();
        assert_eq!(grid.slot_position(8), LayoutPosition::new(1.0, 9.0));
        assert_eq!(grid.slot_position(32), LayoutPosition::new(31.0, 1.0));
    }

    #[test]
    fn test_snapshot_reports_health_and_no_data() {
        let state = wiring();
        let mut board = StatusBoard::new(&StatusLayout::default(), HealthEvaluator::default());
        let snapshot = board.snapshot(&state, &housekeeping()).unwrap();

        assert_eq!(snapshot.timestamp, "19-Oct-2025:14:03:07");
        assert_eq!(snapshot.positions.len(), 2);
        assert_eq!(snapshot.positions["0137_5_3/1/1"], LayoutPosition::new(1.0, 9.0));
        assert_eq!(snapshot.positions["0137_5_3/2/1"], LayoutPosition::new(1.0, 10.0));

        let present = &snapshot.health["0137_5_3/1/1"];
        assert!(present.bolometer_good);
        assert!(present.feedback_on);
        assert!(present.label.is_none());

        // Mezzanine 2 is missing from the tree
        assert_eq!(snapshot.health["0137_5_3/2/1"], ModuleHealth::no_data());
        assert_eq!(
            snapshot.devices_in_display_order(),
            vec!["0137_5_3/1/1", "0137_5_3/2/1"]
        );
    }

    #[test]
    fn test_snapshot_without_housekeeping() {
        let state = wiring();
        let mut board = StatusBoard::new(&StatusLayout::default(), HealthEvaluator::default());
        let snapshot = board.snapshot(&state, &HousekeepingMap::new()).unwrap();
        assert_eq!(snapshot.timestamp, "");
        assert!(snapshot
            .health
            .values()
            .all(|h| h.label_str() == "NoData"));
    }

    #[test]
    fn test_snapshot_surfaces_config_mismatch() {
        let state = wiring();
        let mut hk = housekeeping();
        if let Some(board) = hk.get_mut("0137") {
            board.voltages.insert("MOTHERBOARD_RAIL_VCC9V9".to_string(), 9.9);
        }
        let mut board = StatusBoard::new(&StatusLayout::default(), HealthEvaluator::default());
        let err = board.snapshot(&state, &hk).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigMismatch { .. }));
        assert!(err.is_fatal());
    }
}
