//! Physical id codec
//!
//! Readout hardware is addressed by board serial, crate serial and slot, and
//! a readout module on a board by its module number. These addresses are
//! rendered as canonical strings:
//!
//! ```text
//! board id:  <serial>_<crate>_<slot>                e.g. 0137_5_3
//! device id: <board id>/<mezzanine>/<module>        e.g. 0137_5_3/2/1
//! ```
//!
//! Mezzanine and module-in-mezzanine indices are 1-based. Serials are opaque
//! strings; `%`, `_` and `/` inside them are percent-escaped so that every
//! address has exactly one id and every id decodes back to its address.

use crate::error::{PipelineError, Result};

/// Readout modules hosted by one mezzanine card
pub const MODULES_PER_MEZZANINE: u32 = 4;

const FIELD_SEPARATOR: char = '_';
const MODULE_SEPARATOR: char = '/';

/// Decoded device id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    /// Board id of the hosting board
    pub board_id: String,
    /// 1-based mezzanine index
    pub mezzanine: u32,
    /// 1-based module index within the mezzanine
    pub module: u32,
}

impl DeviceAddress {
    /// 0-based module number on the board
    pub fn board_module(&self) -> u32 {
        (self.mezzanine - 1) * MODULES_PER_MEZZANINE + (self.module - 1)
    }
}

/// 1-based mezzanine index of a 0-based board module number
pub fn mezzanine_of(module: u32) -> u32 {
    module / MODULES_PER_MEZZANINE + 1
}

/// 1-based module-in-mezzanine index of a 0-based board module number
pub fn module_in_mezzanine(module: u32) -> u32 {
    module % MODULES_PER_MEZZANINE + 1
}

/// Board id for a serial/crate/slot triple
pub fn board_id(serial: &str, crate_serial: &str, slot: u32) -> String {
    format!(
        "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{slot}",
        escape(serial),
        escape(crate_serial)
    )
}

/// Device id for a module (0-based) on a board
pub fn device_id(serial: &str, crate_serial: &str, slot: u32, module: u32) -> String {
    format!(
        "{}{MODULE_SEPARATOR}{}{MODULE_SEPARATOR}{}",
        board_id(serial, crate_serial, slot),
        mezzanine_of(module),
        module_in_mezzanine(module)
    )
}

/// Recover `(serial, crate, slot)` from a board id
pub fn decode_board_id(id: &str) -> Result<(String, String, u32)> {
    if id.contains(MODULE_SEPARATOR) {
        return Err(PipelineError::malformed_id(id, "board id contains '/'"));
    }
    let parts: Vec<&str> = id.split(FIELD_SEPARATOR).collect();
    if parts.len() != 3 {
        return Err(PipelineError::malformed_id(
            id,
            format!("expected 3 '_'-separated fields, found {}", parts.len()),
        ));
    }
    let serial = unescape(id, parts[0])?;
    let crate_serial = unescape(id, parts[1])?;
    let slot = parse_index(id, parts[2], "slot")?;
    Ok((serial, crate_serial, slot))
}

/// Recover board id, mezzanine and module-in-mezzanine from a device id
pub fn decode_device_id(id: &str) -> Result<DeviceAddress> {
    let parts: Vec<&str> = id.split(MODULE_SEPARATOR).collect();
    if parts.len() != 3 {
        return Err(PipelineError::malformed_id(
            id,
            format!("expected 3 '/'-separated fields, found {}", parts.len()),
        ));
    }
    decode_board_id(parts[0]).map_err(|e| match e {
        PipelineError::MalformedId { reason, .. } => PipelineError::malformed_id(id, reason),
        other => other,
    })?;

    let mezzanine = parse_index(id, parts[1], "mezzanine")?;
    let module = parse_index(id, parts[2], "module")?;
    if mezzanine == 0 || module == 0 {
        return Err(PipelineError::malformed_id(id, "indices are 1-based"));
    }
    if module > MODULES_PER_MEZZANINE {
        return Err(PipelineError::malformed_id(
            id,
            format!("module {module} exceeds {MODULES_PER_MEZZANINE} per mezzanine"),
        ));
    }

    Ok(DeviceAddress {
        board_id: parts[0].to_string(),
        mezzanine,
        module,
    })
}

fn parse_index(id: &str, field: &str, what: &str) -> Result<u32> {
    // u32::from_str accepts a leading '+', which would make "+3" and "3" alias
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PipelineError::malformed_id(
            id,
            format!("{what} {field:?} is not a decimal integer"),
        ));
    }
    // Leading zeros would alias as well
    if field.len() > 1 && field.starts_with('0') {
        return Err(PipelineError::malformed_id(
            id,
            format!("{what} {field:?} has leading zeros"),
        ));
    }
    field
        .parse()
        .map_err(|_| PipelineError::malformed_id(id, format!("{what} {field:?} out of range")))
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '%' => out.push_str("%25"),
            FIELD_SEPARATOR => out.push_str("%5F"),
            MODULE_SEPARATOR => out.push_str("%2F"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(id: &str, field: &str) -> Result<String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        match code.as_str() {
            "25" => out.push('%'),
            "5F" => out.push(FIELD_SEPARATOR),
            "2F" => out.push(MODULE_SEPARATOR),
            _ => {
                return Err(PipelineError::malformed_id(
                    id,
                    format!("invalid escape %{code}"),
                ))
            }
        }
    }
    Ok(out)
}
