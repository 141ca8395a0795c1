use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{HttpClient, HttpError, HttpResponse, HttpResult, Method};

/// Scripted transport for tests and offline development
///
/// Responses are matched by URL fragment, first registered route wins. Every issued
/// request is recorded so callers can assert on what went over the wire.
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Vec<(String, HttpResult<HttpResponse>)>,
    simulated_delay: Option<Duration>,
    requests: Arc<Mutex<Vec<(Method, String)>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer URLs containing `fragment` with `status` and `body`
    pub fn with_response(
        mut self,
        fragment: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        self.routes
            .push((fragment.into(), Ok(HttpResponse::new(status, body))));
        self
    }

    /// Fail URLs containing `fragment` at the transport level
    pub fn with_failure(mut self, fragment: impl Into<String>, error: HttpError) -> Self {
        self.routes.push((fragment.into(), Err(error)));
        self
    }

    /// Add a simulated network delay before every response
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.simulated_delay = Some(delay);
        self
    }

    /// A transport answering the capabilities and map endpoints with the given bodies
    pub fn osm_api(capabilities: impl Into<String>, map: impl Into<String>) -> Self {
        Self::new()
            .with_response("/capabilities", 200, capabilities)
            .with_response("/map", 200, map)
    }

    /// Requests issued so far, in order
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of issued requests whose URL contains `fragment`
    pub fn request_count(&self, fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(_, url)| url.contains(fragment))
            .count()
    }
}

#[async_trait]
impl HttpClient for MockTransport {
    async fn request(&self, method: Method, url: &str) -> HttpResult<HttpResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((method, url.to_string()));

        if let Some(delay) = self.simulated_delay {
            tracing::debug!("Simulating network delay: {:?}", delay);
            tokio::time::sleep(delay).await;
        }

        let route = self
            .routes
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()));

        match route {
            Some((_, result)) => result.clone(),
            None => {
                tracing::debug!("No mock route for {}, answering 404", url);
                Ok(HttpResponse::new(404, "not found"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_match_by_fragment() {
        let transport = MockTransport::new()
            .with_response("/capabilities", 200, "caps")
            .with_failure("/map", HttpError::Timeout { seconds: 3 });

        let caps = transport.get("http://x/api/0.6/capabilities").await.unwrap();
        assert_eq!(caps.body, "caps");

        let map = transport.get("http://x/api/0.6/map?bbox=1,2,3,4").await;
        assert_eq!(map, Err(HttpError::Timeout { seconds: 3 }));

        let unknown = transport.get("http://x/api/0.6/notes").await.unwrap();
        assert_eq!(unknown.status, 404);
    }

    #[tokio::test]
    async fn test_requests_are_recorded() {
        let transport = MockTransport::osm_api("caps", "map");
        let clone = transport.clone();

        clone.get("http://x/capabilities").await.unwrap();
        clone.request(Method::Head, "http://x/map").await.unwrap();

        assert_eq!(
            transport.requests(),
            vec![
                (Method::Get, "http://x/capabilities".to_string()),
                (Method::Head, "http://x/map".to_string()),
            ]
        );
        assert_eq!(transport.request_count("/map"), 1);
    }
}
