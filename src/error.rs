use thiserror::Error;

use crate::HttpError;

/// Errors that can occur while fetching, decoding and rendering map data
#[derive(Error, Debug)]
pub enum OsmCanvasError {
    /// A request lifecycle was driven out of order
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The HTTP exchange did not complete successfully
    #[error("Transport error: {0}")]
    Transport(#[from] HttpError),

    /// The server speaks an API version we do not support
    #[error("Unsupported API version: expected {expected}, server reports {found}")]
    UnsupportedVersion { expected: String, found: String },

    /// The response body does not match the expected OSM schema
    #[error("Parse error: {0}")]
    Parse(String),

    /// A map was requested before the session was ready
    #[error("Not ready: login has not completed successfully")]
    NotReady,

    /// Bounds with a zero longitude or latitude span cannot be projected
    #[error("Degenerate bounds: longitude span {lon_span}, latitude span {lat_span}")]
    DegenerateBounds { lon_span: f64, lat_span: f64 },

    /// A way references a node that is not part of the map
    #[error("Way {way_id} references missing node {node_id}")]
    DanglingReference { way_id: String, node_id: String },

    /// Configuration or argument validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Raster surface or image encoding errors
    #[error("Export error: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, OsmCanvasError>;
