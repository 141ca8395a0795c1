mod projector;
mod raster;
mod recording;

pub use projector::*;
pub use raster::*;
pub use recording::*;

use serde::{Deserialize, Serialize};

use crate::{GeoModel, RenderStyle, Result, Rgb};

/// A drawing surface the pipeline can emit commands to.
///
/// Colour components are in `0.0..=1.0`; coordinates are pixels with the origin in the
/// top-left corner.
pub trait Canvas {
    fn set_line_width(&mut self, width: f64);
    fn set_color(&mut self, r: f64, g: f64, b: f64);
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);
    /// Stroke and consume the current path
    fn stroke(&mut self);
    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64);
    /// Fill and consume the current path
    fn fill(&mut self);
}

/// Counters collected during one render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStats {
    pub ways_drawn: usize,
    /// Ways with fewer than two node references
    pub ways_skipped: usize,
    /// Line segments emitted across all ways
    pub segments: usize,
}

/// Turns a `GeoModel` into drawing commands
#[derive(Debug, Clone, Default)]
pub struct RenderPipeline {
    style: RenderStyle,
}

impl RenderPipeline {
    pub fn new(style: RenderStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    /// Draw every way of `model` as a stroked polyline, in model order.
    ///
    /// All references of a way are resolved before any of it is drawn, so a dangling
    /// reference aborts the render without a partial path for that way. Ways drawn
    /// before it stay on the canvas.
    pub fn render<C: Canvas + ?Sized>(
        &self,
        model: &GeoModel,
        projector: &Projector,
        canvas: &mut C,
    ) -> Result<RenderStats> {
        let mut stats = RenderStats::default();

        canvas.set_line_width(self.style.line_width);
        set_color(canvas, self.style.stroke);

        for way in model.ways() {
            if way.is_degenerate() {
                tracing::trace!("Skipping way {} with {} refs", way.id, way.node_refs.len());
                stats.ways_skipped += 1;
                continue;
            }

            let nodes = model.resolve_way(way)?;
            tracing::trace!(
                "Drawing way {} ({}), {} nodes",
                way.id,
                way.name().unwrap_or("unnamed"),
                nodes.len()
            );

            let mut points = nodes.into_iter().map(|node| projector.project(node));
            if let Some((x, y)) = points.next() {
                canvas.move_to(x, y);
            }
            for (x, y) in points {
                canvas.line_to(x, y);
                stats.segments += 1;
            }
            canvas.stroke();
            stats.ways_drawn += 1;
        }

        tracing::debug!(
            "Rendered {} ways ({} skipped, {} segments)",
            stats.ways_drawn,
            stats.ways_skipped,
            stats.segments
        );
        Ok(stats)
    }

    /// Fill the whole viewport with the background colour, then `render`
    pub fn export<C: Canvas + ?Sized>(
        &self,
        model: &GeoModel,
        projector: &Projector,
        canvas: &mut C,
    ) -> Result<RenderStats> {
        let (width, height) = projector.viewport();
        set_color(canvas, self.style.background);
        canvas.fill_rect(0.0, 0.0, width as f64, height as f64);

        self.render(model, projector, canvas)
    }

    /// Export onto a fresh raster surface sized to the projector's viewport
    pub fn rasterize(
        &self,
        model: &GeoModel,
        projector: &Projector,
    ) -> Result<(RasterCanvas, RenderStats)> {
        let (width, height) = projector.viewport();
        let mut canvas = RasterCanvas::new(width, height)?;
        let stats = self.export(model, projector, &mut canvas)?;
        Ok((canvas, stats))
    }
}

fn set_color<C: Canvas + ?Sized>(canvas: &mut C, color: Rgb) {
    canvas.set_color(color.r, color.g, color.b);
}
