use super::{HttpClient, HttpConfig, HttpError, HttpResponse, HttpResult, Method};
use async_trait::async_trait;
use std::collections::HashMap;

/// Standard reqwest-based HTTP client for native targets
pub struct ReqwestClient {
    client: reqwest::Client,
    timeout_seconds: u64,
}

impl ReqwestClient {
    /// Create a new reqwest client with default configuration
    pub fn new() -> HttpResult<Self> {
        Self::with_config(HttpConfig::default())
    }

    /// Create a new reqwest client with custom configuration
    pub fn with_config(config: HttpConfig) -> HttpResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);

        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &config.default_headers {
            let header_name =
                reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    HttpError::RequestFailed {
                        message: format!("Invalid header name '{}': {}", key, e),
                    }
                })?;
            let header_value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
                HttpError::RequestFailed {
                    message: format!("Invalid header value '{}': {}", value, e),
                }
            })?;
            headers.insert(header_name, header_value);
        }

        if !headers.is_empty() {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|e| HttpError::RequestFailed {
            message: format!("Failed to create HTTP client: {}", e),
        })?;

        Ok(Self {
            client,
            timeout_seconds: config.timeout.as_secs(),
        })
    }

    fn convert_error(&self, err: reqwest::Error) -> HttpError {
        if err.is_timeout() {
            HttpError::Timeout {
                seconds: self.timeout_seconds,
            }
        } else if err.is_connect() {
            HttpError::Network {
                message: format!("Connection failed: {}", err),
            }
        } else if let Some(status) = err.status() {
            HttpError::HttpStatus {
                status: status.as_u16(),
            }
        } else {
            HttpError::RequestFailed {
                message: err.to_string(),
            }
        }
    }

    async fn convert_response(&self, response: reqwest::Response) -> HttpResult<HttpResponse> {
        let status = response.status().as_u16();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                headers.insert(name.to_string(), value_str.to_string());
            }
        }

        let body = response.text().await.map_err(|e| self.convert_error(e))?;

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }

    /// Get access to the underlying reqwest client
    pub fn reqwest_client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn request(&self, method: Method, url: &str) -> HttpResult<HttpResponse> {
        tracing::debug!("{} {}", method, url);

        let builder = match method {
            Method::Get => self.client.get(url),
            Method::Head => self.client.head(url),
        };

        let response = builder.send().await.map_err(|e| self.convert_error(e))?;
        self.convert_response(response).await
    }
}
