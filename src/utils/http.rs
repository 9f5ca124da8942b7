//! HTTP client utilities.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::sources::SourceError;

/// Default User-Agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with sensible defaults
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, SourceError> {
        Self::with_options(
            DEFAULT_USER_AGENT,
            Duration::from_secs(30),
            Duration::from_secs(10),
        )
    }

    /// Create a client with a custom user agent and timeouts
    pub fn with_options(
        user_agent: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Start a GET request
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    /// GET a URL with query parameters and return the body as text.
    ///
    /// Non-success statuses are mapped onto [`SourceError`] so that the
    /// retry layer can tell transient failures from permanent ones.
    pub async fn get_text(&self, url: &str, params: &[(&str, String)]) -> Result<String, SourceError> {
        tracing::debug!("GET {} {:?}", url, params);

        let response = self.get(url).query(params).send().await?;
        let response = check_status(response)?;

        response
            .text()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read response: {}", e)))
    }
}

/// Turn an unsuccessful response into the matching [`SourceError`]
pub fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            Err(SourceError::RateLimit(retry_after))
        }
        StatusCode::NOT_FOUND => Err(SourceError::NotFound(response.url().to_string())),
        s if s.is_server_error() => Err(SourceError::Server(s.as_u16())),
        s => Err(SourceError::Api(format!(
            "{} returned status {}",
            response.url(),
            s
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_crate_version() {
        assert_eq!(
            DEFAULT_USER_AGENT,
            format!("getpapers/{}", crate::VERSION)
        );
    }

    #[tokio::test]
    async fn test_get_text_maps_statuses() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/ok")
            .match_query(mockito::Matcher::UrlEncoded("q".into(), "a b".into()))
            .match_header("user-agent", DEFAULT_USER_AGENT)
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;
        server
            .mock("GET", "/busy")
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("GET", "/slow-down")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let client = HttpClient::new().unwrap();
        let body = client
            .get_text(&format!("{}/ok", server.url()), &[("q", "a b".to_string())])
            .await
            .unwrap();
        assert_eq!(body, "hello");
        ok.assert_async().await;

        let busy = client.get_text(&format!("{}/busy", server.url()), &[]).await;
        assert!(matches!(busy, Err(SourceError::Server(503))));

        let limited = client
            .get_text(&format!("{}/slow-down", server.url()), &[])
            .await;
        assert!(matches!(limited, Err(SourceError::RateLimit(Some(7)))));
    }
}
