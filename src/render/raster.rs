use std::path::Path;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use super::Canvas;
use crate::{OsmCanvasError, Result};

/// Offscreen RGBA surface backed by a tiny-skia pixmap.
///
/// Starts fully transparent. Paths accumulate between `move_to`/`line_to` calls and
/// are consumed by the next `stroke` or `fill`.
pub struct RasterCanvas {
    pixmap: Pixmap,
    path: PathBuilder,
    color: Color,
    line_width: f32,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            OsmCanvasError::Export(format!("Cannot allocate a {}x{} surface", width, height))
        })?;

        Ok(Self {
            pixmap,
            path: PathBuilder::new(),
            color: Color::BLACK,
            line_width: 1.0,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Straight (non-premultiplied) RGBA of one pixel
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.pixmap.pixel(x, y).map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
    }

    /// Encode the surface as PNG
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap
            .encode_png()
            .map_err(|e| OsmCanvasError::Export(format!("PNG encoding failed: {}", e)))
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.pixmap.save_png(path).map_err(|e| {
            OsmCanvasError::Export(format!("Failed to write {}: {}", path.display(), e))
        })?;
        tracing::info!(
            "Saved {}x{} image to {}",
            self.width(),
            self.height(),
            path.display()
        );
        Ok(())
    }

    fn paint(&self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color(self.color);
        paint.anti_alias = true;
        paint
    }

    fn take_path(&mut self) -> Option<tiny_skia::Path> {
        std::mem::replace(&mut self.path, PathBuilder::new()).finish()
    }
}

impl Canvas for RasterCanvas {
    fn set_line_width(&mut self, width: f64) {
        self.line_width = width as f32;
    }

    fn set_color(&mut self, r: f64, g: f64, b: f64) {
        let channel = |v: f64| v.clamp(0.0, 1.0) as f32;
        self.color =
            Color::from_rgba(channel(r), channel(g), channel(b), 1.0).unwrap_or(Color::BLACK);
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.path.move_to(x as f32, y as f32);
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.path.line_to(x as f32, y as f32);
    }

    fn stroke(&mut self) {
        let Some(path) = self.take_path() else {
            return;
        };
        let stroke = Stroke {
            width: self.line_width,
            ..Stroke::default()
        };
        let paint = self.paint();
        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        let Some(rect) = Rect::from_xywh(x as f32, y as f32, width as f32, height as f32) else {
            tracing::debug!("Ignoring empty rectangle {}x{} at ({}, {})", width, height, x, y);
            return;
        };
        let paint = self.paint();
        self.pixmap
            .fill_rect(rect, &paint, Transform::identity(), None);
    }

    fn fill(&mut self) {
        let Some(path) = self.take_path() else {
            return;
        };
        let paint = self.paint();
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}
