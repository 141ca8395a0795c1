use super::{ApiConfig, MapConfig, RenderStyle, ResponseFormat, Rgb, Viewport};

/// Builder for creating map configurations with a fluent API
#[derive(Debug, Clone)]
pub struct MapConfigBuilder {
    base_url: Option<String>,
    expected_version: Option<String>,
    format: Option<ResponseFormat>,
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
    viewport: Option<Viewport>,
    style: RenderStyle,
}

impl MapConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            base_url: None,
            expected_version: None,
            format: None,
            timeout_seconds: None,
            user_agent: None,
            viewport: None,
            style: RenderStyle::default(),
        }
    }

    /// Set the API root
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the API version the server must report as its minimum
    pub fn expected_version(mut self, version: impl Into<String>) -> Self {
        self.expected_version = Some(version.into());
        self
    }

    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Request the API's JSON endpoints
    pub fn json(self) -> Self {
        self.format(ResponseFormat::Json)
    }

    /// Set the timeout
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the drawing surface size in pixels
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Some(Viewport::new(width, height));
        self
    }

    pub fn line_width(mut self, width: f64) -> Self {
        self.style.line_width = width;
        self
    }

    pub fn stroke(mut self, color: Rgb) -> Self {
        self.style.stroke = color;
        self
    }

    pub fn background(mut self, color: Rgb) -> Self {
        self.style.background = color;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> MapConfig {
        let defaults = ApiConfig::default();

        MapConfig {
            api: ApiConfig {
                base_url: self.base_url.unwrap_or(defaults.base_url),
                expected_version: self.expected_version.unwrap_or(defaults.expected_version),
                format: self.format.unwrap_or(defaults.format),
                timeout_seconds: self.timeout_seconds.unwrap_or(defaults.timeout_seconds),
                user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            },
            viewport: self.viewport.unwrap_or_default(),
            style: self.style,
        }
    }
}

impl Default for MapConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
