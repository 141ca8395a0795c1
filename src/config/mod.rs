mod builder;
mod style;

pub use builder::*;
pub use style::*;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{HttpConfig, OsmCanvasError, Result};

/// Body format requested from the map API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseFormat {
    /// OSM XML, the API's native format
    Xml,
    /// The API's JSON flavour (`.json` endpoints)
    Json,
}

impl ResponseFormat {
    /// Suffix appended to endpoint names
    pub fn endpoint_suffix(&self) -> &'static str {
        match self {
            Self::Xml => "",
            Self::Json => ".json",
        }
    }
}

/// Where the map API lives and what we expect from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root, without trailing slash
    pub base_url: String,
    /// Required value of `api.version.minimum`
    pub expected_version: String,
    pub format: ResponseFormat,
    /// Maximum timeout for requests (in seconds)
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openstreetmap.org/api/0.6".to_string(),
            expected_version: "0.6".to_string(),
            format: ResponseFormat::Xml,
            timeout_seconds: 60,
            user_agent: format!("osm-canvas/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiConfig {
    /// Full URL of an API endpoint, e.g. `capabilities` or `map`
    pub fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/{}{}",
            self.base_url.trim_end_matches('/'),
            name,
            self.format.endpoint_suffix()
        )
    }

    /// Transport settings derived from this configuration
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::new()
            .with_timeout(Duration::from_secs(self.timeout_seconds))
            .with_user_agent(self.user_agent.clone())
    }
}

/// Pixel size of the drawing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800, 800)
    }
}

/// Configuration for fetching and rendering map data
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub api: ApiConfig,
    pub viewport: Viewport,
    pub style: RenderStyle,
}

impl MapConfig {
    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into();
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport::new(width, height);
        self
    }

    pub fn with_style(mut self, style: RenderStyle) -> Self {
        self.style = style;
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.api.timeout_seconds = seconds;
        self
    }

    /// Load a configuration from JSON; missing sections fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| OsmCanvasError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Create a builder for more complex configuration
    pub fn builder() -> MapConfigBuilder {
        MapConfigBuilder::new()
    }
}
