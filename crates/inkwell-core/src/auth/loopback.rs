//! Transient loopback HTTP listener that captures the OAuth redirect.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::{AuthError, AuthResult};

/// How long the listener waits for the browser before giving up
pub const LOOPBACK_TIMEOUT: Duration = Duration::from_secs(300);

const CALLBACK_PATH: &str = "/callback";
const MAX_REQUEST_BYTES: usize = 16 * 1024;

/// Query parameters of the redirect request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse the request target of `GET /callback?...`.
    ///
    /// Returns `None` for any other path (favicon probes and the like).
    pub fn from_request_target(target: &str) -> Option<Self> {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        if path != CALLBACK_PATH {
            return None;
        }

        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        Some(params)
    }

    /// Validate state and pull out the authorization code.
    pub fn into_code(self, expected_state: &str) -> AuthResult<String> {
        if let Some(error) = self.error {
            if error == "access_denied" {
                return Err(AuthError::Cancelled);
            }
            let detail = self
                .error_description
                .map(|description| format!("{error} ({description})"))
                .unwrap_or(error);
            return Err(AuthError::TokenExchange(detail));
        }
        if self.state.as_deref() != Some(expected_state) {
            return Err(AuthError::StateMismatch);
        }
        self.code
            .filter(|code| !code.trim().is_empty())
            .ok_or_else(|| AuthError::TokenExchange("Missing authorization code".to_string()))
    }
}

/// Listener bound on 127.0.0.1 for the duration of one sign-in
pub struct LoopbackListener {
    listener: TcpListener,
    address: SocketAddr,
}

impl LoopbackListener {
    /// Bind the redirect port. Port `0` picks a free port.
    pub async fn bind(port: u16) -> AuthResult<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let address = listener.local_addr()?;
        Ok(Self { listener, address })
    }

    pub const fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{CALLBACK_PATH}", self.port())
    }

    /// Wait for the redirect, answer the browser and close the listener.
    pub async fn wait_for_code(self, expected_state: &str, timeout: Duration) -> AuthResult<String> {
        let params = tokio::time::timeout(timeout, self.accept_callback())
            .await
            .map_err(|_| AuthError::Timeout)??;
        params.into_code(expected_state)
    }

    async fn accept_callback(&self) -> AuthResult<CallbackParams> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            let target = match read_request_target(&mut stream).await {
                Ok(target) => target,
                Err(error) => {
                    tracing::debug!("Ignoring malformed loopback request from {}: {}", peer, error);
                    continue;
                }
            };

            let Some(params) = CallbackParams::from_request_target(&target) else {
                respond(&mut stream, "404 Not Found", "Not found").await;
                continue;
            };

            let message = if params.error.is_some() {
                "Sign-in was not completed. You can close this window."
            } else {
                "Sign-in complete. You can close this window and return to Inkwell."
            };
            respond(&mut stream, "200 OK", message).await;
            return Ok(params);
        }
    }
}

async fn read_request_target(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0_u8; 1024];
    while !buffer.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request too large",
            ));
        }
    }

    let request = String::from_utf8_lossy(&buffer);
    let request_line = request.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(target.to_string()),
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unexpected request line: {request_line}"),
        )),
    }
}

async fn respond(stream: &mut TcpStream, status: &str, message: &str) {
    let body = format!(
        "<!doctype html><html><head><title>Inkwell</title></head><body><p>{message}</p></body></html>"
    );
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: text/html; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(error) = stream.write_all(response.as_bytes()).await {
        tracing::debug!("Failed to answer loopback request: {}", error);
    }
    let _ = stream.shutdown().await;
}
