//! Bearer-authenticated HTTP client handed out by credential sources.

use crate::error::{Error, Result, format_api_error};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// HTTP request timeout.
const TIMEOUT: Duration = Duration::from_secs(60);
/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the shared reqwest client used for API and token requests.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Supplies a currently valid access token, fetching or refreshing as needed.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// HTTP client bound to one subject's credentials.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    subject: Option<String>,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for AuthorizedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedClient")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl AuthorizedClient {
    pub fn new(
        http: reqwest::Client,
        subject: Option<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            subject,
            tokens,
        }
    }

    /// The impersonated account, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    async fn build_headers(&self, extra: HeaderMap) -> Result<HeaderMap> {
        let token = self.tokens.access_token().await?;
        let mut headers = extra;
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            Error::Authorization("Access token contains invalid header characters".into())
        })?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// GET `url` with query parameters and deserialize the JSON body.
    pub async fn get_json<R: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<R> {
        self.get_json_with_headers(url, query, HeaderMap::new())
            .await
    }

    /// Like [`get_json`](Self::get_json), with additional request headers.
    pub async fn get_json_with_headers<R: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: HeaderMap,
    ) -> Result<R> {
        let headers = self.build_headers(headers).await?;
        tracing::debug!(url, subject = ?self.subject, "GET");

        let response = self
            .http
            .get(url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Upstream(format_api_error(&format!(
                "HTTP {status}: {text}"
            ))));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Upstream(format!("Failed to parse response: {e}")))
    }
}
