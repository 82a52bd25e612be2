//! Interactive OAuth2 consent for a single end user.

use super::client::{AuthorizedClient, TokenProvider, http_client};
use super::pkce::{PkceCodes, generate_state};
use super::server::CallbackServer;
use super::token::{Token, request_token};
use super::ClientSource;
use crate::config::{Config, Endpoints, ScopeSet};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// An installed-app OAuth client registered in the Cloud console.
#[derive(Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    scopes: ScopeSet,
    auth_url: String,
    token_url: String,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scopes: ScopeSet,
        endpoints: &Endpoints,
    ) -> Result<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.is_empty() {
            return Err(Error::Configuration("No client ID provided".into()));
        }
        if client_secret.is_empty() {
            return Err(Error::Configuration("No secret provided".into()));
        }

        Ok(Self {
            client_id,
            client_secret,
            scopes,
            auth_url: endpoints.auth_url.clone(),
            token_url: endpoints.token_url.clone(),
        })
    }

    /// URL the user visits to grant consent.
    #[must_use]
    pub fn auth_code_url(&self, redirect_uri: &str, state: &str, pkce: &PkceCodes) -> String {
        format!(
            "{}?response_type=code\
             &client_id={}\
             &redirect_uri={}\
             &scope={}\
             &state={}\
             &code_challenge={}\
             &code_challenge_method=S256\
             &access_type=offline",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&self.scopes.joined()),
            urlencoding::encode(state),
            pkce.challenge
        )
    }

    async fn exchange(
        &self,
        http: &reqwest::Client,
        code: &str,
        redirect_uri: &str,
        pkce: &PkceCodes,
    ) -> Result<Token> {
        request_token(
            http,
            &self.token_url,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("code_verifier", &pkce.verifier),
            ],
        )
        .await
    }

    async fn refresh(&self, http: &reqwest::Client, refresh_token: &str) -> Result<Token> {
        request_token(
            http,
            &self.token_url,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ],
        )
        .await
    }
}

/// Where and how long the handshake listens for the browser redirect.
#[derive(Debug, Clone)]
pub struct HandshakeSettings {
    pub port: u16,
    pub timeout: Option<Duration>,
    /// Called with the consent URL once the listener is up.
    pub launch_browser: fn(&str),
}

impl From<&Config> for HandshakeSettings {
    fn from(config: &Config) -> Self {
        Self {
            port: config.callback_port,
            timeout: config.callback_timeout(),
            launch_browser: open_browser,
        }
    }
}

/// Best effort; the URL is printed as well.
pub fn open_browser(url: &str) {
    if let Err(e) = open::that(url) {
        tracing::warn!("Failed to open browser: {e}");
    }
}

/// Run the browser consent flow and exchange the resulting code for a token.
pub async fn token_from_web(
    client: &OAuthClient,
    http: &reqwest::Client,
    settings: &HandshakeSettings,
) -> Result<Token> {
    let state = generate_state();
    let pkce = PkceCodes::generate();

    let (code, redirect_uri) = {
        let server = CallbackServer::bind(settings.port, state.clone())?;
        let redirect_uri = server.redirect_uri();
        let auth_url = client.auth_code_url(&redirect_uri, &state, &pkce);

        (settings.launch_browser)(&auth_url);
        println!("Authorize this app at: {auth_url}");

        let code = server.wait_for_code(settings.timeout)?;
        (code, redirect_uri)
        // listener closes here, before the token request
    };

    let token = client
        .exchange(http, &code, &redirect_uri, &pkce)
        .await?;
    println!("Authorization successful.");
    Ok(token)
}

/// Credential source holding one user's consented token.
pub struct InteractiveSource {
    tokens: Arc<UserTokenProvider>,
    http: reqwest::Client,
}

impl InteractiveSource {
    /// Perform the consent handshake once and keep the resulting token.
    pub async fn authorize(client: OAuthClient, settings: &HandshakeSettings) -> Result<Self> {
        let http = http_client();
        let token = token_from_web(&client, &http, settings).await?;
        Ok(Self::from_parts(client, token, http))
    }

    /// Wrap a token obtained elsewhere.
    #[must_use]
    pub fn with_token(client: OAuthClient, token: Token) -> Self {
        Self::from_parts(client, token, http_client())
    }

    fn from_parts(client: OAuthClient, token: Token, http: reqwest::Client) -> Self {
        Self {
            tokens: Arc::new(UserTokenProvider {
                client,
                http: http.clone(),
                token: Mutex::new(token),
            }),
            http,
        }
    }
}

impl ClientSource for InteractiveSource {
    /// The token belongs to whoever consented; `subject` cannot be honored.
    fn client(&self, subject: &str) -> Result<AuthorizedClient> {
        if !subject.is_empty() {
            tracing::debug!(subject, "interactive credentials ignore the requested subject");
        }
        Ok(AuthorizedClient::new(
            self.http.clone(),
            None,
            Arc::clone(&self.tokens) as Arc<dyn TokenProvider>,
        ))
    }
}

struct UserTokenProvider {
    client: OAuthClient,
    http: reqwest::Client,
    token: Mutex<Token>,
}

#[async_trait]
impl TokenProvider for UserTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if !token.is_expired() {
            return Ok(token.access_token.clone());
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(Error::Authorization(
                "Access token expired and no refresh token is available; run again to re-authorize"
                    .into(),
            ));
        };

        tracing::debug!("refreshing expired access token");
        let mut refreshed = self.client.refresh(&self.http, &refresh_token).await?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token);
        }
        *token = refreshed;
        Ok(token.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONTACTS_READONLY_SCOPE, DIRECTORY_USER_READONLY_SCOPE};
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    fn client(scopes: ScopeSet) -> OAuthClient {
        OAuthClient::new("id.apps.googleusercontent.com", "s3cret", scopes, &Endpoints::default())
            .unwrap()
    }

    #[test]
    fn test_requires_client_id_and_secret() {
        let endpoints = Endpoints::default();
        let err = OAuthClient::new("", "secret", ScopeSet::new(false), &endpoints).unwrap_err();
        assert!(matches!(err, Error::Configuration(m) if m.contains("client ID")));

        let err = OAuthClient::new("id", "", ScopeSet::new(false), &endpoints).unwrap_err();
        assert!(matches!(err, Error::Configuration(m) if m.contains("secret")));
    }

    #[test]
    fn test_auth_url_contains_required_params() {
        let pkce = PkceCodes::generate();
        let url = client(ScopeSet::new(false)).auth_code_url(
            "http://127.0.0.1:8000",
            "test_state",
            &pkce,
        );

        assert!(url.starts_with(&Endpoints::default().auth_url));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=id.apps.googleusercontent.com"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8000"));
        assert!(url.contains("state=test_state"));
        assert!(url.contains(&format!("code_challenge={}", pkce.challenge)));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains(&*urlencoding::encode(CONTACTS_READONLY_SCOPE)));
        assert!(!url.contains(&*urlencoding::encode(DIRECTORY_USER_READONLY_SCOPE)));
    }

    #[test]
    fn test_auth_url_requests_directory_scope() {
        let url = client(ScopeSet::new(true)).auth_code_url(
            "http://127.0.0.1:8000",
            "s",
            &PkceCodes::generate(),
        );
        assert!(url.contains(&*urlencoding::encode(DIRECTORY_USER_READONLY_SCOPE)));
    }

    #[tokio::test]
    async fn test_client_ignores_subject() {
        let token = Token {
            access_token: "ya29.user".into(),
            refresh_token: None,
            expires_at: None,
        };
        let source = InteractiveSource::with_token(client(ScopeSet::new(false)), token);

        let client = source.client("someone@example.com").unwrap();
        assert_eq!(client.subject(), None);
    }

    /// Answer one token request with `body`, returning the form it received.
    fn token_endpoint(
        status: u16,
        body: &'static str,
    ) -> (Endpoints, std::thread::JoinHandle<String>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let handle = std::thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut form = String::new();
            request.as_reader().read_to_string(&mut form).unwrap();
            request
                .respond(tiny_http::Response::from_string(body).with_status_code(status))
                .unwrap();
            form
        });
        let endpoints = Endpoints {
            token_url: format!("http://127.0.0.1:{port}/token"),
            ..Endpoints::default()
        };
        (endpoints, handle)
    }

    #[tokio::test]
    async fn test_exchange_sends_code_and_verifier() {
        let (endpoints, handle) =
            token_endpoint(200, r#"{"access_token":"ya29.new","refresh_token":"1//r","expires_in":3599}"#);
        let client = OAuthClient::new("cid", "csecret", ScopeSet::new(false), &endpoints).unwrap();
        let pkce = PkceCodes::generate();

        let token = client
            .exchange(&http_client(), "4/code", "http://127.0.0.1:8000", &pkce)
            .await
            .unwrap();
        assert_eq!(token.access_token, "ya29.new");
        assert_eq!(token.refresh_token.as_deref(), Some("1//r"));

        let form = handle.join().unwrap();
        assert!(form.contains("grant_type=authorization_code"));
        assert!(form.contains("code=4%2Fcode"));
        assert!(form.contains("client_secret=csecret"));
        assert!(form.contains(&format!("code_verifier={}", pkce.verifier)));
    }

    #[tokio::test]
    async fn test_exchange_failure_is_authorization_error() {
        let (endpoints, handle) =
            token_endpoint(400, r#"{"error":"invalid_grant","error_description":"Bad Request"}"#);
        let client = OAuthClient::new("cid", "csecret", ScopeSet::new(false), &endpoints).unwrap();

        let err = client
            .exchange(&http_client(), "4/code", "http://127.0.0.1:8000", &PkceCodes::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(m) if m.contains("invalid_grant: Bad Request")));
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let (endpoints, handle) =
            token_endpoint(200, r#"{"access_token":"ya29.fresh","expires_in":3599}"#);
        let client = OAuthClient::new("cid", "csecret", ScopeSet::new(false), &endpoints).unwrap();
        let token = Token {
            access_token: "ya29.stale".into(),
            refresh_token: Some("1//keep".into()),
            expires_at: Some(chrono::Utc::now() - chrono::Duration::minutes(5)),
        };
        let source = InteractiveSource::with_token(client, token);

        assert_eq!(source.tokens.access_token().await.unwrap(), "ya29.fresh");
        let form = handle.join().unwrap();
        assert!(form.contains("grant_type=refresh_token"));
        assert!(form.contains("refresh_token=1%2F%2Fkeep"));

        let kept = source.tokens.token.lock().await;
        assert_eq!(kept.refresh_token.as_deref(), Some("1//keep"));
    }

    /// Plays the user: parses the consent URL, then hits the redirect with noise,
    /// a forged state and finally the real code.
    fn scripted_browser(auth_url: &str) {
        let url = url::Url::parse(auth_url).unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let redirect = url::Url::parse(&params["redirect_uri"]).unwrap();
        let port = redirect.port().unwrap();
        let state = params["state"].clone();

        std::thread::spawn(move || {
            for target in [
                "/favicon.ico".to_string(),
                "/?state=forged&code=evil".to_string(),
                format!("/?state={state}&code=4%2Fweb"),
            ] {
                let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
                write!(stream, "GET {target} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n").unwrap();
                let mut response = String::new();
                stream.read_to_string(&mut response).unwrap();
            }
        });
    }

    #[tokio::test]
    async fn test_web_handshake_exchanges_code_after_listener_closes() {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let token_port = server.server_addr().to_ip().unwrap().port();
        let handle = std::thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).unwrap();
            let form: HashMap<String, String> =
                url::form_urlencoded::parse(body.as_bytes()).into_owned().collect();

            let callback_port = url::Url::parse(&form["redirect_uri"])
                .unwrap()
                .port()
                .unwrap();
            let listener_closed = TcpListener::bind(("127.0.0.1", callback_port)).is_ok();

            request
                .respond(tiny_http::Response::from_string(
                    r#"{"access_token":"ya29.web","expires_in":3599}"#,
                ))
                .unwrap();
            (form, listener_closed)
        });

        let endpoints = Endpoints {
            token_url: format!("http://127.0.0.1:{token_port}/token"),
            ..Endpoints::default()
        };
        let client = OAuthClient::new("cid", "csecret", ScopeSet::new(false), &endpoints).unwrap();
        let settings = HandshakeSettings {
            port: 0,
            timeout: Some(Duration::from_secs(10)),
            launch_browser: scripted_browser,
        };

        let token = token_from_web(&client, &http_client(), &settings)
            .await
            .unwrap();
        assert_eq!(token.access_token, "ya29.web");

        let (form, listener_closed) = handle.join().unwrap();
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["code"], "4/web");
        assert!(form["redirect_uri"].starts_with("http://127.0.0.1:"));
        assert!(listener_closed);
    }

    #[tokio::test]
    async fn test_web_handshake_times_out() {
        let client = client(ScopeSet::new(false));
        let settings = HandshakeSettings {
            port: 0,
            timeout: Some(Duration::from_millis(100)),
            launch_browser: |_| {},
        };

        let err = token_from_web(&client, &http_client(), &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(m) if m.contains("Timed out")));
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_fails() {
        let token = Token {
            access_token: "ya29.old".into(),
            refresh_token: None,
            expires_at: Some(chrono::Utc::now() - chrono::Duration::minutes(5)),
        };
        let source = InteractiveSource::with_token(client(ScopeSet::new(false)), token);

        let err = source.tokens.access_token().await.unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }
}
