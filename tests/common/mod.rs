//! Mock Google endpoints backed by `tiny_http`.

#![allow(dead_code)]

use gcontacts::auth::{InteractiveSource, OAuthClient, Token};
use gcontacts::config::{Endpoints, ScopeSet};
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Serves canned JSON responses until `expected` requests were answered.
pub struct MockServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start<F>(expected: usize, respond: F) -> Self
    where
        F: Fn(&Recorded) -> (u16, String) + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        let handle = thread::spawn(move || {
            for _ in 0..expected {
                let Ok(mut request) = server.recv() else {
                    return;
                };
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let entry = Recorded {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    authorization: request
                        .headers()
                        .iter()
                        .find(|h| h.field.equiv("Authorization"))
                        .map(|h| h.value.as_str().to_string()),
                    body,
                };

                let (status, payload) = respond(&entry);
                recorded.lock().unwrap().push(entry);

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .unwrap();
                let response = tiny_http::Response::from_string(payload)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            requests,
            handle: Some(handle),
        }
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Wait for the server thread to finish its expected requests.
    pub fn finish(mut self) -> Vec<Recorded> {
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
        self.recorded()
    }
}

/// Endpoints with every API pointed at `base_url`.
pub fn endpoints(base_url: &str) -> Endpoints {
    Endpoints {
        auth_url: format!("{base_url}/o/oauth2/auth"),
        token_url: format!("{base_url}/token"),
        contacts_url: format!("{base_url}/m8/feeds/contacts"),
        people_url: format!("{base_url}/v1"),
        directory_url: format!("{base_url}/admin/directory/v1"),
    }
}

/// Credential source holding a fixed, non-expiring user token.
pub fn user_source(endpoints: &Endpoints, access_token: &str) -> InteractiveSource {
    let client = OAuthClient::new("client-id", "client-secret", ScopeSet::new(true), endpoints)
        .unwrap();
    InteractiveSource::with_token(
        client,
        Token {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
        },
    )
}
