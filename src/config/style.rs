use serde::{Deserialize, Serialize};

/// An RGB colour with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);

    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Create a colour from 8-bit channels
    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0)
    }
}

/// How ways are drawn
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyle {
    /// Stroke width in pixels
    pub line_width: f64,
    /// Stroke colour for every way
    pub stroke: Rgb,
    /// Fill used by exports before any way is drawn
    pub background: Rgb,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            line_width: 0.5,
            stroke: Rgb::BLACK,
            background: Rgb::WHITE,
        }
    }
}

impl RenderStyle {
    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }

    pub fn with_stroke(mut self, color: Rgb) -> Self {
        self.stroke = color;
        self
    }

    pub fn with_background(mut self, color: Rgb) -> Self {
        self.background = color;
        self
    }
}
