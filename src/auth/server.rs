//! Loopback listener that receives the OAuth redirect.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use url::Url;

/// Poll interval of the non-blocking accept loop.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// What the listener does with one callback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallbackOutcome {
    /// Browser noise such as `/favicon.ico`.
    NotFound,
    /// Answered with 500; the waiter keeps waiting.
    Rejected(String),
    /// Answered with 200; the code is handed to the waiter.
    Code(String),
}

/// Local HTTP listener for a single authorization-code redirect.
///
/// The worker thread and the bound port are released when this value is dropped,
/// whichever way the handshake ends.
pub struct CallbackServer {
    port: u16,
    receiver: mpsc::Receiver<String>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind `127.0.0.1:port` and start answering callbacks. Port 0 picks a free port.
    pub fn bind(port: u16, expected_state: String) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .map_err(|e| Error::Authorization(format!("Network listener error: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Authorization(format!("Network listener error: {e}")))?
            .port();
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::Authorization(format!("Network listener error: {e}")))?;

        let (tx, receiver) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = {
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || serve(&listener, &expected_state, &tx, &shutdown))
        };

        tracing::debug!(port, "callback listener started");
        Ok(Self {
            port,
            receiver,
            shutdown,
            worker: Some(worker),
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Block until a valid callback delivers an authorization code.
    ///
    /// `None` waits without limit.
    pub fn wait_for_code(&self, timeout: Option<Duration>) -> Result<String> {
        let received = match timeout {
            Some(timeout) => self.receiver.recv_timeout(timeout),
            None => self
                .receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        received.map_err(|e| match e {
            RecvTimeoutError::Timeout => {
                Error::Authorization("Timed out waiting for the authorization redirect".into())
            }
            RecvTimeoutError::Disconnected => {
                Error::Authorization("Callback listener stopped before a code arrived".into())
            }
        })
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        tracing::debug!(port = self.port, "callback listener closed");
    }
}

fn serve(
    listener: &TcpListener,
    expected_state: &str,
    tx: &mpsc::Sender<String>,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((mut stream, _)) => {
                let Some(target) = read_request_target(&mut stream) else {
                    continue;
                };

                match classify(&target, expected_state) {
                    CallbackOutcome::NotFound => {
                        let _ = send_response(&mut stream, "404 Not Found", "");
                    }
                    CallbackOutcome::Rejected(reason) => {
                        tracing::warn!("Rejected OAuth callback: {reason}");
                        let _ = send_response(&mut stream, "500 Internal Server Error", "");
                    }
                    CallbackOutcome::Code(code) => {
                        let _ = send_response(&mut stream, "200 OK", SUCCESS_PAGE);
                        let _ = tx.send(code);
                        return;
                    }
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                tracing::warn!("Callback listener failed to accept: {e}");
                return;
            }
        }
    }
}

fn read_request_target(stream: &mut TcpStream) -> Option<String> {
    stream.set_nonblocking(false).ok()?;
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok()?;

    let mut buffer = [0u8; 4096];
    let n = stream.read(&mut buffer).ok()?;
    let request = String::from_utf8_lossy(&buffer[..n]);

    // "GET /?state=..&code=.. HTTP/1.1"
    request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
}

pub(crate) fn classify(target: &str, expected_state: &str) -> CallbackOutcome {
    let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
        return CallbackOutcome::Rejected(format!("unparseable request target {target:?}"));
    };

    if url.path() == "/favicon.ico" {
        return CallbackOutcome::NotFound;
    }

    let params: HashMap<_, _> = url.query_pairs().collect();

    if params.get("state").map(|s| &**s) != Some(expected_state) {
        return CallbackOutcome::Rejected("state doesn't match".into());
    }

    match params.get("code") {
        Some(code) if !code.is_empty() => CallbackOutcome::Code(code.to_string()),
        _ => {
            let reason = match params.get("error") {
                Some(error) => format!("no code (provider error: {error})"),
                None => "no code".to_string(),
            };
            CallbackOutcome::Rejected(reason)
        }
    }
}

const SUCCESS_PAGE: &str = r"<!DOCTYPE html>
<html>
<head>
    <title>Authorized</title>
    <style>
        body { font-family: system-ui, sans-serif; text-align: center; padding: 50px; }
        h1 { color: #22c55e; }
    </style>
</head>
<body>
    <h1>Success</h1>
    <p>Authorized. You can close this tab and return to gcontacts.</p>
</body>
</html>";

fn send_response(stream: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );

    stream.write_all(response.as_bytes())?;
    stream.flush()
}
