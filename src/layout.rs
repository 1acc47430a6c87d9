//! Grid layout for devices and channels
//!
//! Devices are packed column by column into a grid; channels are packed row
//! by row into a near-square block inside their device's cell.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Display coordinates of a device or channel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutPosition {
    pub x: f64,
    pub y: f64,
}

impl LayoutPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rows and columns of a rectangular block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockDims {
    pub rows: usize,
    pub cols: usize,
}

impl BlockDims {
    pub fn capacity(&self) -> usize {
        self.rows * self.cols
    }
}

/// Near-square block that holds `n` things.
///
/// `rows = floor(sqrt(n))` and `cols` is the smallest width with
/// `rows * cols >= n`, so `rows <= cols <= rows + 2`.
pub fn square_block(n: usize) -> BlockDims {
    if n == 0 {
        return BlockDims::default();
    }
    let rows = isqrt(n);
    let cols = (n + rows - 1) / rows;
    BlockDims { rows, cols }
}

fn isqrt(n: usize) -> usize {
    let mut r = (n as f64).sqrt() as usize;
    // Float sqrt can be off by one for large n
    while r * r > n {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= n {
        r += 1;
    }
    r
}

/// Compare strings with embedded numbers by value ("sq2" < "sq10").
///
/// Runs of ASCII digits compare numerically, everything else by code point.
/// Strings that only differ in leading zeros fall back to plain ordering so
/// the result is a total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.char_indices().peekable();
    let mut bi = b.char_indices().peekable();

    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((sa, ca)), Some((sb, cb))) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let ea = digit_run_end(a, sa);
                    let eb = digit_run_end(b, sb);
                    let ord = cmp_digit_runs(&a[sa..ea], &b[sb..eb]);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    while ai.peek().map_or(false, |&(i, _)| i < ea) {
                        ai.next();
                    }
                    while bi.peek().map_or(false, |&(i, _)| i < eb) {
                        bi.next();
                    }
                } else {
                    let ord = ca.cmp(&cb);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    ai.next();
                    bi.next();
                }
            }
        }
    }
}

fn digit_run_end(s: &str, start: usize) -> usize {
    s[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |off| start + off)
}

fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Column-major placement grid.
///
/// Slot `i` lands in column `i / column_capacity`, row `i % column_capacity`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    /// Slots per column
    pub column_capacity: usize,
    /// Distance between neighbouring columns (x) and rows (y)
    pub spacing: LayoutPosition,
    /// Position of slot 0
    pub origin: LayoutPosition,
    /// Slot taken by the first id
    pub first_slot: usize,
}

impl GridSpec {
    pub fn new(column_capacity: usize, spacing: LayoutPosition) -> Self {
        Self {
            column_capacity,
            spacing,
            origin: LayoutPosition::default(),
            first_slot: 0,
        }
    }

    pub fn with_origin(mut self, origin: LayoutPosition) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_first_slot(mut self, first_slot: usize) -> Self {
        self.first_slot = first_slot;
        self
    }

    /// Position of a grid slot
    pub fn slot_position(&self, slot: usize) -> LayoutPosition {
        let capacity = self.column_capacity.max(1);
        let column = slot / capacity;
        let row = slot % capacity;
        LayoutPosition {
            x: self.origin.x + column as f64 * self.spacing.x,
            y: self.origin.y + row as f64 * self.spacing.y,
        }
    }
}

/// Place devices on a grid in natural sort order.
///
/// The result depends only on the set of ids: input order and duplicates do
/// not matter.
pub fn place_devices<I, S>(ids: I, grid: &GridSpec) -> BTreeMap<String, LayoutPosition>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sorted: Vec<String> = ids.into_iter().map(|s| s.as_ref().to_string()).collect();
    sorted.sort_by(|a, b| natural_cmp(a, b));
    sorted.dedup();

    sorted
        .into_iter()
        .enumerate()
        .map(|(rank, id)| (id, grid.slot_position(rank + grid.first_slot)))
        .collect()
}

/// Position of a channel inside its device block, row by row
pub fn place_channel_within_device(
    channel_index: usize,
    dims: BlockDims,
    device: LayoutPosition,
) -> LayoutPosition {
    let cols = dims.cols.max(1);
    LayoutPosition {
        x: device.x + (channel_index % cols) as f64,
        y: device.y + (channel_index / cols) as f64,
    }
}
