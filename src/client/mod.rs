mod integration_tests;

use std::sync::Arc;
use std::time::Instant;

use crate::{
    ApiConfig, Bounds, Capabilities, GeoModel, HttpClient, HttpResponse, MapConfig, Method, Mode,
    OsmCanvasError, OsmDecoder, RequestLifecycle, Result, create_client_with_config,
};

/// Listener fired once when the session becomes ready
pub type ReadyCallback = Box<dyn FnOnce(&Capabilities) + Send + Sync>;

/// Where a client stands with respect to the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `login` has not been called yet
    LoggedOut,
    /// Capabilities were fetched and the API version matched
    Ready,
    /// The last `login` failed; it may be retried
    Failed,
}

/// Client for the OSM map API: a capabilities check followed by bounded map fetches.
///
/// Every exchange goes through its own `RequestLifecycle`, so independent `get_map`
/// calls on a shared client do not interfere with each other.
pub struct MapClient {
    transport: Arc<dyn HttpClient>,
    config: ApiConfig,
    decoder: OsmDecoder,
    state: SessionState,
    capabilities: Option<Capabilities>,
    ready_listeners: Vec<ReadyCallback>,
}

impl MapClient {
    pub fn new(transport: Arc<dyn HttpClient>, config: ApiConfig) -> Self {
        Self {
            transport,
            config,
            decoder: OsmDecoder,
            state: SessionState::LoggedOut,
            capabilities: None,
            ready_listeners: Vec::new(),
        }
    }

    /// Create a client using the transport selected by the enabled features
    pub fn from_config(config: &MapConfig) -> Result<Self> {
        let transport = create_client_with_config(config.api.http_config())?;
        Ok(Self::new(transport, config.api.clone()))
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn session_state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Capabilities reported by the last successful `login`
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    /// Register a listener for readiness. Fires immediately when already ready.
    pub fn on_ready(&mut self, callback: impl FnOnce(&Capabilities) + Send + Sync + 'static) {
        match (&self.state, &self.capabilities) {
            (SessionState::Ready, Some(capabilities)) => callback(capabilities),
            _ => self.ready_listeners.push(Box::new(callback)),
        }
    }

    /// Fetch the server capabilities and check the API version.
    ///
    /// Any failure leaves the session in `SessionState::Failed`.
    pub async fn login(&mut self) -> Result<&Capabilities> {
        let url = self.config.endpoint("capabilities");
        tracing::info!("Logging in to {}", url);

        match self.fetch_capabilities(&url).await {
            Ok(capabilities) => {
                tracing::info!(
                    "API ready: version {} (area limit {:?}, timeout {:?}s)",
                    capabilities.version_minimum,
                    capabilities.area_maximum,
                    capabilities.timeout_seconds
                );
                self.state = SessionState::Ready;
                let capabilities: &Capabilities = self.capabilities.insert(capabilities);

                for listener in self.ready_listeners.drain(..) {
                    listener(capabilities);
                }
                Ok(capabilities)
            }
            Err(error) => {
                self.state = SessionState::Failed;
                self.capabilities = None;
                Err(error)
            }
        }
    }

    async fn fetch_capabilities(&self, url: &str) -> Result<Capabilities> {
        let response = self.exchange(url).await?;
        let capabilities = self
            .decoder
            .decode_capabilities(&response.body, self.config.format)?;

        if !same_version(&capabilities.version_minimum, &self.config.expected_version) {
            tracing::error!(
                "Server API version {} does not match expected {}",
                capabilities.version_minimum,
                self.config.expected_version
            );
            return Err(OsmCanvasError::UnsupportedVersion {
                expected: self.config.expected_version.clone(),
                found: capabilities.version_minimum,
            });
        }

        Ok(capabilities)
    }

    /// Fetch every node and way inside `bbox`
    pub async fn get_map(&self, bbox: &Bounds) -> Result<GeoModel> {
        let capabilities = match (&self.state, &self.capabilities) {
            (SessionState::Ready, Some(capabilities)) => capabilities,
            _ => return Err(OsmCanvasError::NotReady),
        };

        self.check_request_bounds(bbox, capabilities)?;

        let start_time = Instant::now();
        let url = self.map_url(bbox);
        tracing::debug!("Fetching map: {}", url);

        let response = self.exchange(&url).await?;
        let model = self.decoder.decode_map(&response.body, self.config.format)?;

        tracing::info!(
            "Fetched map: {} nodes, {} ways, {:.2} KB in {} ms",
            model.node_count(),
            model.way_count(),
            response.body.len() as f64 / 1024.0,
            start_time.elapsed().as_millis()
        );

        Ok(model)
    }

    /// URL of the `map` call for `bbox`
    pub fn map_url(&self, bbox: &Bounds) -> String {
        format!("{}?bbox={}", self.config.endpoint("map"), bbox.to_query())
    }

    fn check_request_bounds(&self, bbox: &Bounds, capabilities: &Capabilities) -> Result<()> {
        if !bbox.is_valid() {
            return Err(OsmCanvasError::Config(format!(
                "Invalid bounding box: {:?}",
                bbox
            )));
        }

        let area_km2 = bbox.area_km2();
        if area_km2 > 25.0 {
            tracing::warn!(
                "Large area requested: {:.2} km² - this may take a while or fail",
                area_km2
            );
        }

        if let Some(maximum) = capabilities.area_maximum {
            let area = bbox.area_deg2();
            if area > maximum {
                return Err(OsmCanvasError::Config(format!(
                    "Area too large: {:.6} square degrees, server accepts at most {}",
                    area, maximum
                )));
            }
        }

        Ok(())
    }

    async fn exchange(&self, url: &str) -> Result<HttpResponse> {
        let mut lifecycle = RequestLifecycle::new(Arc::clone(&self.transport))
            .on_state_change(|change| tracing::debug!("Request state: {}", change.state));

        lifecycle.open(Method::Get, url, Mode::Async)?;
        lifecycle.send().await?.clone().into_response()
    }
}

/// Versions compare numerically when both sides parse, so "0.60" matches "0.6"
fn same_version(found: &str, expected: &str) -> bool {
    match (found.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        (Ok(found), Ok(expected)) => found == expected,
        _ => found.trim() == expected.trim(),
    }
}
