use serde::{Deserialize, Serialize};

use crate::{Bounds, Node, OsmCanvasError, Result};

/// Linear geo-to-pixel transform for one bounds/viewport pair.
///
/// Pixel rows grow downward while latitude grows northward, so the y axis is flipped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projector {
    scale_x: f64,
    scale_y: f64,
    bounds: Bounds,
    viewport_width: u32,
    viewport_height: u32,
}

impl Projector {
    pub fn from_bounds(bounds: &Bounds, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(OsmCanvasError::Config(format!(
                "Viewport must not be empty, got {}x{}",
                width, height
            )));
        }

        let lon_span = bounds.lon_span().abs();
        let lat_span = bounds.lat_span().abs();
        let usable = |span: f64| span.is_finite() && span > 0.0;
        if !usable(lon_span) || !usable(lat_span) {
            return Err(OsmCanvasError::DegenerateBounds { lon_span, lat_span });
        }

        Ok(Self {
            scale_x: width as f64 / lon_span,
            scale_y: height as f64 / lat_span,
            bounds: *bounds,
            viewport_width: width,
            viewport_height: height,
        })
    }

    /// Pixel position of `node`, rounded to whole pixels. Halves round toward positive
    /// infinity, so -2.5 becomes -2.
    pub fn project(&self, node: &Node) -> (f64, f64) {
        self.project_lon_lat(node.lon, node.lat)
    }

    pub fn project_lon_lat(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = (lon - self.bounds.min_lon) * self.scale_x;
        let y = self.viewport_height as f64 - (lat - self.bounds.min_lat) * self.scale_y;
        (round_half_up(x), round_half_up(y))
    }

    pub fn scale(&self) -> (f64, f64) {
        (self.scale_x, self.scale_y)
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }
}

fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}
