//! Focal-plane display announcement
//!
//! Live viewers need to know where every detector sits before the first
//! sample arrives. [`FocalPlane`] describes a regular array of pixels, each
//! holding `chroic × polarizations` co-located detectors, and renders the
//! Configuration frame that announces it.

use std::f64::consts::FRAC_PI_4;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::frame::{Frame, FrameType};

/// Colormaps assigned by detector color index, cycling
pub const COLORMAPS: [&str; 2] = ["red_cmap", "bolo_blue_cmap"];

/// Pixel rows per band; a gap separates consecutive bands
pub const ROWS_PER_BAND: usize = 4;

/// Vertical gap between bands
pub const BAND_GAP: f64 = 0.25;

/// Geometry of the detector array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocalPlane {
    /// Number of pixels
    pub pixels: usize,
    /// Colors (frequency bands) per pixel
    pub chroic: usize,
    /// Polarizations per color
    pub polarizations: usize,
    /// Pixels per display row
    pub pixels_per_row: usize,
    /// Detector name prefix
    pub name_prefix: String,
}

impl Default for FocalPlane {
    fn default() -> Self {
        Self {
            pixels: 1024,
            chroic: 2,
            polarizations: 2,
            pixels_per_row: 32,
            name_prefix: "det".to_string(),
        }
    }
}

/// Display attributes of one detector
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorGlyph {
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    pub cname: String,
    pub equation: String,
    pub cmap: &'static str,
    pub template: String,
}

impl FocalPlane {
    /// Detectors sharing one pixel
    pub fn colocated(&self) -> usize {
        self.chroic * self.polarizations
    }

    /// Total detector count
    pub fn detector_count(&self) -> usize {
        self.pixels * self.colocated()
    }

    pub fn validate(&self) -> Result<()> {
        if self.pixels == 0 || self.chroic == 0 || self.polarizations == 0 {
            return Err(PipelineError::InvalidConfig(
                "focal plane needs at least one pixel, color and polarization".to_string(),
            ));
        }
        if self.pixels_per_row == 0 {
            return Err(PipelineError::InvalidConfig(
                "pixels_per_row must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Channel name of a detector, e.g. `det_0042`
    pub fn channel_name(&self, detector: usize) -> String {
        format!("{}_{detector:04}", self.name_prefix)
    }

    /// Display attributes of detector `i`
    pub fn glyph(&self, i: usize) -> DetectorGlyph {
        let coloc = self.colocated().max(1);
        let pols = self.polarizations.max(1);
        let ppr = self.pixels_per_row.max(1);

        let pixel = i / coloc;
        let d = i % coloc;
        let color = d / pols;
        let pol = d % pols;

        let column = pixel % ppr;
        let row = pixel / ppr;
        let y = row as f64 + (row / ROWS_PER_BAND) as f64 * BAND_GAP;
        // Checkerboard of 0/45°, then 90° per polarization
        let checker = (column % 2) ^ (row % 2);
        let rotation = (checker + 2 * pol) as f64 * FRAC_PI_4;

        let cname = self.channel_name(i);
        DetectorGlyph {
            x: column as f64,
            y,
            rotation,
            equation: format!("/ + 1 s {cname} 2"),
            cname,
            cmap: COLORMAPS[color % COLORMAPS.len()],
            template: format!("template_c{color}_p0"),
        }
    }

    /// Configuration frame announcing the whole array
    pub fn announcement(&self) -> Frame {
        let n = self.detector_count();
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        let mut rotation = Vec::with_capacity(n);
        let mut cname = Vec::with_capacity(n);
        let mut equations = Vec::with_capacity(n);
        let mut cmaps = Vec::with_capacity(n);
        let mut templates = Vec::with_capacity(n);

        for glyph in (0..n).map(|i| self.glyph(i)) {
            x.push(glyph.x);
            y.push(glyph.y);
            rotation.push(glyph.rotation);
            cname.push(glyph.cname);
            equations.push(glyph.equation);
            cmaps.push(glyph.cmap);
            templates.push(glyph.template);
        }

        Frame::new(FrameType::Configuration)
            .with_field("x", x)
            .with_field("y", y)
            .with_field("rotation", rotation)
            .with_field("cname", cname)
            .with_field("equations", equations)
            .with_field("cmaps", cmaps)
            .with_field("templates", templates)
    }
}
