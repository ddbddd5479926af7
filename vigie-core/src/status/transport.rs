use std::error::Error as StdError;
use std::fmt;
use std::io;

use async_trait::async_trait;
use hyper::ext::ReasonPhrase;
use reqwest::header::LOCATION;
use tracing::debug;
use url::Url;

use super::outcome::Outcome;
use super::redirect::is_redirect;
use crate::config::ProbeConfig;
use crate::error::Result;

/// HTTP method of a probe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeMethod {
    Head,
    Get,
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMethod::Head => f.write_str("HEAD"),
            ProbeMethod::Get => f.write_str("GET"),
        }
    }
}

/// The parts of an HTTP response a probe looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    /// Reason phrase as sent by the server, possibly not UTF-8
    pub reason: Vec<u8>,
    /// Raw `Location` header
    pub location: Option<String>,
}

impl ProbeResponse {
    pub fn new(status: u16, reason: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            reason: reason.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Outcome of a probe ending on this response.
    pub fn into_outcome(self) -> Outcome {
        match self.status {
            200 => Outcome::Success {
                reason: self.reason,
            },
            code if is_redirect(code) => Outcome::Redirect {
                code,
                reason: self.reason,
                location: self.location,
            },
            code => Outcome::Response {
                code,
                reason: self.reason,
            },
        }
    }
}

/// Why a request produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Disconnected,
    Connect {
        message: String,
        detail: Option<String>,
    },
    Other {
        kind: String,
        message: String,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => f.write_str("timeout"),
            TransportError::Disconnected => f.write_str("server disconnected"),
            TransportError::Connect { message, .. } => f.write_str(message),
            TransportError::Other { kind, message } => write!(f, "{}: {}", kind, message),
        }
    }
}

impl From<TransportError> for Outcome {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Outcome::Timeout,
            TransportError::Disconnected => Outcome::Disconnected,
            TransportError::Connect { message, detail } => {
                Outcome::ConnectFailure { message, detail }
            }
            TransportError::Other { kind, message } => Outcome::Other { kind, message },
        }
    }
}

/// Issues single requests without following redirects.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        method: ProbeMethod,
        url: &Url,
    ) -> std::result::Result<ProbeResponse, TransportError>;
}

/// Transport backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        method: ProbeMethod,
        url: &Url,
    ) -> std::result::Result<ProbeResponse, TransportError> {
        let method = match method {
            ProbeMethod::Head => reqwest::Method::HEAD,
            ProbeMethod::Get => reqwest::Method::GET,
        };

        let response = self
            .client
            .request(method, url.clone())
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        // hyper keeps the phrase only when it differs from the canonical one
        let reason = response
            .extensions()
            .get::<ReasonPhrase>()
            .map(|phrase| phrase.as_bytes())
            .filter(|phrase| !phrase.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("").as_bytes())
            .to_vec();
        let location = response
            .headers()
            .get(LOCATION)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

        debug!(%url, status = status.as_u16(), "Received response");

        Ok(ProbeResponse {
            status: status.as_u16(),
            reason,
            location,
        })
    }
}

/// Maps a `reqwest` failure onto the transport error vocabulary.
fn transport_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }

    let chain: Vec<&(dyn StdError + 'static)> =
        std::iter::successors(Some(err as &(dyn StdError + 'static)), |e| (*e).source())
            .collect();

    let io_kind = chain
        .iter()
        .find_map(|e| e.downcast_ref::<io::Error>())
        .map(|e| e.kind());

    if matches!(
        io_kind,
        Some(io::ErrorKind::ConnectionReset)
            | Some(io::ErrorKind::ConnectionAborted)
            | Some(io::ErrorKind::BrokenPipe)
            | Some(io::ErrorKind::UnexpectedEof)
    ) || chain
        .iter()
        .any(|e| e.to_string().contains("connection closed before message completed"))
    {
        return TransportError::Disconnected;
    }

    let message = chain
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ");

    if err.is_connect() || err.is_request() || err.is_body() || err.is_decode() {
        let detail = if io_kind == Some(io::ErrorKind::ConnectionRefused) {
            Some("Connect call failed".to_string())
        } else {
            chain.last().map(|e| openssl_reason(&e.to_string()))
        };
        return TransportError::Connect { message, detail };
    }

    TransportError::Other {
        kind: if err.is_builder() {
            "BuilderError".to_string()
        } else {
            "RequestError".to_string()
        },
        message,
    }
}

/// OpenSSL renders `error:<code>:<lib>:<func>:<reason>:<file>:<line>:`; keep the reason.
fn openssl_reason(message: &str) -> String {
    if message.starts_with("error:") {
        if let Some(reason) = message.split(':').nth(4).filter(|r| !r.is_empty()) {
            return reason.to_string();
        }
    }
    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::outcome::classify;

    #[test]
    fn test_response_into_outcome() {
        let ok = ProbeResponse::new(200, "OK").into_outcome();
        assert!(matches!(ok, Outcome::Success { .. }));

        let moved = ProbeResponse::new(308, "Permanent Redirect")
            .with_location("https://ailleurs.example/")
            .into_outcome();
        assert_eq!(
            classify(&moved),
            "308 Permanent Redirect https://ailleurs.example/"
        );

        let not_modified = ProbeResponse::new(304, "Not Modified").into_outcome();
        assert_eq!(classify(&not_modified), "304 Not Modified");
    }

    #[test]
    fn test_transport_error_into_outcome() {
        assert_eq!(Outcome::from(TransportError::Timeout), Outcome::Timeout);
        let outcome = Outcome::from(TransportError::Connect {
            message: "error sending request".to_string(),
            detail: Some("Connect call failed".to_string()),
        });
        assert_eq!(classify(&outcome), "Connection failed");
    }

    #[test]
    fn test_openssl_reason() {
        assert_eq!(
            openssl_reason("error:0A000086:SSL routines:tls_post_process_server_certificate:certificate verify failed:../ssl/statem/statem_clnt.c:1889:"),
            "certificate verify failed"
        );
        assert_eq!(openssl_reason("Connection refused"), "Connection refused");
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new(&ProbeConfig::default()).is_ok());
    }

    mod loopback {
        use std::time::Duration;

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};

        use super::*;

        async fn read_request(socket: &mut TcpStream) {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
        }

        /// Serves one connection with a raw response, or hangs up when `None`.
        async fn serve_once(response: Option<&'static str>) -> Url {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                if let Some(response) = response {
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.flush().await.unwrap();
                }
            });
            Url::parse(&format!("http://{}/", addr)).unwrap()
        }

        async fn status_of(config: &ProbeConfig, url: &Url) -> String {
            let transport = ReqwestTransport::new(config).unwrap();
            let outcome = match transport.send(ProbeMethod::Get, url).await {
                Ok(response) => response.into_outcome(),
                Err(err) => err.into(),
            };
            classify(&outcome)
        }

        #[tokio::test]
        async fn test_custom_reason_phrase_is_kept() {
            let url = serve_once(Some(
                "HTTP/1.1 200 Tout va bien\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            ))
            .await;
            assert_eq!(status_of(&ProbeConfig::default(), &url).await, "200 Tout va bien");
        }

        #[tokio::test]
        async fn test_unregistered_code_keeps_its_phrase() {
            let url = serve_once(Some(
                "HTTP/1.1 299 Custom\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            ))
            .await;
            assert_eq!(status_of(&ProbeConfig::default(), &url).await, "299 Custom");
        }

        #[tokio::test]
        async fn test_canonical_reason_phrase() {
            let url = serve_once(Some(
                "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            ))
            .await;
            assert_eq!(status_of(&ProbeConfig::default(), &url).await, "404 Not Found");
        }

        #[tokio::test]
        async fn test_hang_up_reads_as_disconnected() {
            let url = serve_once(None).await;
            assert_eq!(
                status_of(&ProbeConfig::default(), &url).await,
                "Server disconnected"
            );
        }

        #[tokio::test]
        async fn test_closed_port_reads_as_connection_failed() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);
            let url = Url::parse(&format!("http://{}/", addr)).unwrap();

            assert_eq!(
                status_of(&ProbeConfig::default(), &url).await,
                "Connection failed"
            );
        }

        #[tokio::test]
        async fn test_silent_server_reads_as_timeout() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (socket, _) = listener.accept().await.unwrap();
                tokio::time::sleep(Duration::from_secs(5)).await;
                drop(socket);
            });
            let url = Url::parse(&format!("http://{}/", addr)).unwrap();
            let config = ProbeConfig::default().with_timeout(Duration::from_millis(200));

            assert_eq!(status_of(&config, &url).await, "Timeout");
        }
    }
}
