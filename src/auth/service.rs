//! Service-account credentials with domain-wide delegation.
//!
//! A JSON key downloaded from the Cloud console is turned into a [`JwtConfig`].
//! Each client signs its own RS256 assertion on first use and exchanges it for
//! an access token (RFC 7523 JWT bearer grant).

use super::client::{AuthorizedClient, TokenProvider, http_client};
use super::token::{Token, request_token};
use super::ClientSource;
use crate::config::ScopeSet;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Deserialize)]
struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    client_email: String,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Claims of the signed assertion sent to the token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sub: Option<String>,
}

/// Signing configuration for one service account.
#[derive(Clone)]
pub struct JwtConfig {
    pub email: String,
    pub key_id: Option<String>,
    pub token_url: String,
    pub scopes: ScopeSet,
    /// Account to impersonate; `None` acts as the service account itself.
    pub subject: Option<String>,
    key: EncodingKey,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("email", &self.email)
            .field("key_id", &self.key_id)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("subject", &self.subject)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl JwtConfig {
    /// Parse a service-account JSON key.
    pub fn from_json(data: &[u8], scopes: ScopeSet) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_slice(data)
            .map_err(|e| Error::Configuration(format!("Invalid service account key: {e}")))?;

        if let Some(kind) = key.kind.as_deref()
            && kind != "service_account"
        {
            return Err(Error::Configuration(format!(
                "Key file 'type' field is {kind:?} (expected \"service_account\")"
            )));
        }
        if key.client_email.is_empty() {
            return Err(Error::Configuration(
                "Service account key has no client_email".into(),
            ));
        }
        if key.private_key.is_empty() {
            return Err(Error::Configuration(
                "Service account key has no private_key".into(),
            ));
        }

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::Configuration(format!("Invalid service account private key: {e}")))?;

        Ok(Self {
            email: key.client_email,
            key_id: key.private_key_id.filter(|id| !id.is_empty()),
            token_url: key
                .token_uri
                .filter(|uri| !uri.is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            scopes,
            subject: None,
            key: encoding_key,
        })
    }

    #[must_use]
    pub fn claims(&self, now: DateTime<Utc>) -> Claims {
        let iat = now.timestamp();
        Claims {
            iss: self.email.clone(),
            scope: self.scopes.joined(),
            aud: self.token_url.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
            sub: self.subject.clone(),
        }
    }

    /// Sign the RS256 assertion for `now`.
    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid.clone_from(&self.key_id);
        jsonwebtoken::encode(&header, &self.claims(now), &self.key)
            .map_err(|e| Error::Authorization(format!("Unable to sign JWT assertion: {e}")))
    }
}

/// Credential source backed by a service-account key.
pub struct ServiceSource {
    config: JwtConfig,
    http: reqwest::Client,
}

impl std::fmt::Debug for ServiceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServiceSource {
    /// Read and validate a JSON key file.
    pub fn from_keyfile(path: impl AsRef<Path>, scopes: ScopeSet) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::Configuration("No keyfile specified".into()));
        }

        let data = std::fs::read(path).map_err(|e| {
            Error::Configuration(format!("Unable to read {}: {e}", path.display()))
        })?;

        Ok(Self::new(JwtConfig::from_json(&data, scopes)?))
    }

    #[must_use]
    pub fn new(config: JwtConfig) -> Self {
        Self {
            config,
            http: http_client(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &JwtConfig {
        &self.config
    }
}

impl ClientSource for ServiceSource {
    /// Each client signs with its own copy of the configuration.
    fn client(&self, subject: &str) -> Result<AuthorizedClient> {
        let mut config = self.config.clone();
        if !subject.is_empty() {
            config.subject = Some(subject.to_string());
        }

        Ok(AuthorizedClient::new(
            self.http.clone(),
            config.subject.clone(),
            Arc::new(JwtTokenProvider::new(config, self.http.clone())),
        ))
    }
}

/// Lazily exchanges a signed assertion for an access token.
struct JwtTokenProvider {
    config: JwtConfig,
    http: reqwest::Client,
    token: Mutex<Option<Token>>,
}

impl JwtTokenProvider {
    fn new(config: JwtConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            token: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for JwtTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && !token.is_expired()
        {
            return Ok(token.access_token.clone());
        }

        tracing::debug!(
            service_account = %self.config.email,
            subject = ?self.config.subject,
            "requesting service account token"
        );
        let assertion = self.config.assertion(Utc::now())?;
        let token = request_token(
            &self.http,
            &self.config.token_url,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)],
        )
        .await?;

        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}
