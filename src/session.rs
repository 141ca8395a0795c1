use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    Bounds, Canvas, Capabilities, GeoModel, MapClient, MapConfig, OsmCanvasError, Projector,
    RenderPipeline, RenderStats, Result, Viewport,
};

/// Where and when a map was fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchMetadata {
    pub fetched_at: DateTime<Utc>,
    /// URL of the `map` call
    pub source: String,
    pub node_count: usize,
    pub way_count: usize,
    /// Time from issuing the request to a projected model
    pub processing_time_ms: u64,
}

/// A fetched map together with the projector for the current viewport
#[derive(Debug, Clone)]
pub struct LoadedMap {
    pub model: Arc<GeoModel>,
    pub projector: Projector,
    pub metadata: FetchMetadata,
}

/// Headless driver: owns a client, the current map and the render settings.
///
/// The current map is replaced as a whole, and only once a fetch has been decoded and
/// projected, so renderers never observe a half-loaded map.
pub struct MapSession {
    client: MapClient,
    pipeline: RenderPipeline,
    viewport: Viewport,
    current: Option<Arc<LoadedMap>>,
}

impl MapSession {
    pub fn new(client: MapClient, config: &MapConfig) -> Self {
        Self {
            client,
            pipeline: RenderPipeline::new(config.style),
            viewport: config.viewport,
            current: None,
        }
    }

    /// Create a session using the transport selected by the enabled features
    pub fn from_config(config: &MapConfig) -> Result<Self> {
        Ok(Self::new(MapClient::from_config(config)?, config))
    }

    pub fn client(&self) -> &MapClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut MapClient {
        &mut self.client
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// The map currently on display
    pub fn current(&self) -> Option<Arc<LoadedMap>> {
        self.current.clone()
    }

    pub async fn login(&mut self) -> Result<&Capabilities> {
        self.client.login().await
    }

    /// Fetch `bbox` and make it the current map. On failure the previous map stays.
    pub async fn load(&mut self, bbox: &Bounds) -> Result<Arc<LoadedMap>> {
        let start_time = Instant::now();

        let model = self.client.get_map(bbox).await?;
        let projector =
            Projector::from_bounds(model.bounds(), self.viewport.width, self.viewport.height)?;

        let metadata = FetchMetadata {
            fetched_at: Utc::now(),
            source: self.client.map_url(bbox),
            node_count: model.node_count(),
            way_count: model.way_count(),
            processing_time_ms: start_time.elapsed().as_millis() as u64,
        };

        tracing::info!(
            "Loaded map: {} nodes, {} ways, ~{:.3} km² in {} ms",
            metadata.node_count,
            metadata.way_count,
            model.bounds().area_km2(),
            metadata.processing_time_ms
        );

        let loaded = Arc::new(LoadedMap {
            model: Arc::new(model),
            projector,
            metadata,
        });
        self.current = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Change the viewport and re-project the current map for it
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(OsmCanvasError::Config(format!(
                "Viewport must not be empty, got {}x{}",
                width, height
            )));
        }

        let reprojected = match &self.current {
            Some(current) => Some(Arc::new(LoadedMap {
                model: Arc::clone(&current.model),
                projector: Projector::from_bounds(current.model.bounds(), width, height)?,
                metadata: current.metadata.clone(),
            })),
            None => None,
        };

        tracing::debug!("Viewport resized to {}x{}", width, height);
        self.current = reprojected;
        self.viewport = Viewport::new(width, height);
        Ok(())
    }

    /// Draw the current map onto `canvas`. `Ok(None)` when nothing is loaded.
    pub fn redraw<C: Canvas + ?Sized>(&self, canvas: &mut C) -> Result<Option<RenderStats>> {
        match &self.current {
            Some(map) => self
                .pipeline
                .render(&map.model, &map.projector, canvas)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Render the current map offscreen and write it as PNG. `Ok(None)` when nothing is
    /// loaded.
    pub fn export_png(&self, path: impl AsRef<Path>) -> Result<Option<RenderStats>> {
        let Some(map) = &self.current else {
            return Ok(None);
        };

        let (canvas, stats) = self.pipeline.rasterize(&map.model, &map.projector)?;
        canvas.save_png(path)?;
        Ok(Some(stats))
    }
}
