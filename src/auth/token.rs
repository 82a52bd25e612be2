//! Access tokens and the OAuth token endpoint.

use crate::error::{Error, Result, format_api_error};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Tokens are treated as expired this long before the server says so.
const EXPIRY_SLACK_SECS: i64 = 60;

/// An OAuth2 access token, optionally refreshable.
#[derive(Clone)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    /// A token with no known expiry never expires locally.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at - Duration::seconds(EXPIRY_SLACK_SECS) <= Utc::now())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, issued_at: DateTime<Utc>) -> Token {
        Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_in
                .map(|secs| issued_at + Duration::seconds(secs)),
        }
    }
}

/// POST a form to a token endpoint and parse the granted token.
pub(crate) async fn request_token(
    http: &reqwest::Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<Token> {
    let issued_at = Utc::now();
    let response = http
        .post(token_url)
        .form(form)
        .send()
        .await
        .map_err(|e| Error::Authorization(format!("Token request failed: {e}")))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| Error::Authorization(format!("Token request failed: {e}")))?;

    if !status.is_success() {
        return Err(Error::Authorization(format!(
            "Token exchange error: {}",
            format_api_error(&format!("HTTP {status}: {text}"))
        )));
    }

    let parsed: TokenResponse = serde_json::from_str(&text)
        .map_err(|e| Error::Authorization(format!("Failed to parse token response: {e}")))?;
    Ok(parsed.into_token(issued_at))
}
