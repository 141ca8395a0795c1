use super::{HttpClient, HttpConfig, HttpError, HttpResponse, HttpResult, Method};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

/// HTTP client using ehttp for WASM and native compatibility
///
/// ehttp reports completion through a callback; the callback hands the result to the
/// awaiting task over a oneshot channel.
pub struct EhttpClient {
    config: HttpConfig,
}

impl EhttpClient {
    /// Create a new ehttp client with default configuration
    pub fn new() -> Self {
        Self::with_config(HttpConfig::default())
    }

    /// Create a new ehttp client with custom configuration
    pub fn with_config(config: HttpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// ehttp only reports string errors
    fn convert_error(error: String, timeout_seconds: u64) -> HttpError {
        if error.contains("timeout") || error.contains("Timeout") {
            HttpError::Timeout {
                seconds: timeout_seconds,
            }
        } else if error.contains("connection") || error.contains("Connection") {
            HttpError::Network { message: error }
        } else {
            HttpError::RequestFailed { message: error }
        }
    }

    fn convert_response(response: ehttp::Response) -> HttpResult<HttpResponse> {
        let status = response.status;

        let mut headers = HashMap::new();
        for (key, value) in response.headers {
            headers.insert(key, value);
        }

        let body = String::from_utf8(response.bytes).map_err(|e| HttpError::RequestFailed {
            message: format!("Failed to decode response body as UTF-8: {}", e),
        })?;

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }

    fn build_headers(&self) -> ehttp::Headers {
        let mut headers = ehttp::Headers::default();
        for (key, value) in &self.config.default_headers {
            headers.insert(key.clone(), value.clone());
        }
        headers.insert("User-Agent".to_string(), self.config.user_agent.clone());
        headers
    }
}

#[async_trait]
impl HttpClient for EhttpClient {
    async fn request(&self, method: Method, url: &str) -> HttpResult<HttpResponse> {
        let mut request = ehttp::Request::get(url);
        request.method = method.as_str().to_string();
        request.headers = self.build_headers();

        tracing::debug!("{} {}", method, url);

        let timeout = self.config.timeout;
        let (tx, rx) = oneshot::channel();

        ehttp::fetch(request, move |response| {
            let result = match response {
                Ok(response) => Self::convert_response(response),
                Err(error) => Err(Self::convert_error(error, timeout.as_secs())),
            };
            // The receiver is gone when the awaiting request was aborted
            let _ = tx.send(result);
        });

        await_response(rx, timeout).await
    }
}

type Pending = oneshot::Receiver<HttpResult<HttpResponse>>;

fn dropped() -> HttpError {
    HttpError::Network {
        message: "ehttp dropped the request without a response".to_string(),
    }
}

#[cfg(not(target_arch = "wasm32"))]
async fn await_response(rx: Pending, timeout: Duration) -> HttpResult<HttpResponse> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(dropped()),
        Err(_) => Err(HttpError::Timeout {
            seconds: timeout.as_secs(),
        }),
    }
}

/// tokio timers need a tokio runtime, which the browser does not have. The browser's
/// fetch applies its own timeout.
#[cfg(target_arch = "wasm32")]
async fn await_response(rx: Pending, _timeout: Duration) -> HttpResult<HttpResponse> {
    rx.await.unwrap_or_else(|_| Err(dropped()))
}

impl Default for EhttpClient {
    fn default() -> Self {
        Self::new()
    }
}
