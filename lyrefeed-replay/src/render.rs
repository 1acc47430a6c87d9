//! Text status display.
//!
//! One row per device, in display order:
//!
//! ```text
//! 0137_5_3/1/1  CNDTV6F
//! 0137_5_3/1/2  CNDTV6F DanRail:3
//! 0137_5_3/2/1  cndtv0f NoData
//! ```
//!
//! Each flag letter is upper case when good and lower case when not. The
//! digit is the FIR stage.

use lyrefeed::{ModuleHealth, Result, StatusSink, StatusSnapshot};
use std::io::Write;

/// Flag column for one module, e.g. `CNDTV6F`.
pub fn flag_code(health: &ModuleHealth) -> String {
    let flag = |good: bool, c: char| {
        if good {
            c
        } else {
            c.to_ascii_lowercase()
        }
    };
    format!(
        "{}{}{}{}{}{}{}",
        flag(health.carrier_good, 'C'),
        flag(health.nuller_good, 'N'),
        flag(health.demod_good, 'D'),
        flag(health.temperature_good, 'T'),
        flag(health.voltage_good, 'V'),
        health.fir_stage,
        flag(health.feedback_on, 'F'),
    )
}

/// Status sink printing snapshots as text rows.
pub struct TextStatus<W: Write> {
    writer: W,
}

impl<W: Write> TextStatus<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> StatusSink for TextStatus<W> {
    fn update(&mut self, snapshot: &StatusSnapshot) -> Result<()> {
        let width = snapshot.positions.keys().map(String::len).max().unwrap_or(0);
        writeln!(self.writer, "== {} ==", snapshot.timestamp)?;
        for device in snapshot.devices_in_display_order() {
            let Some(health) = snapshot.health.get(device) else {
                continue;
            };
            let row = format!(
                "{device:<width$}  {} {}",
                flag_code(health),
                health.label_str()
            );
            writeln!(self.writer, "{}", row.trim_end())?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
