//! Filter List HTTP Client
//!
//! Minimal GET client for downloading filter lists. One connection per
//! request over hyper's HTTP/1.1 connection API, TLS through rustls with
//! the webpki root store. The whole exchange (connect, redirect, body) runs
//! under a single timeout and the body is capped in size.

use http_body_util::{BodyExt, Empty, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{ACCEPT, HOST, LOCATION, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};
use url::{Position, Url};

/// Filter list download errors. Every variant names the URL it concerns.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS error for {url}: {reason}")]
    Tls { url: String, reason: String },

    #[error("HTTP error for {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("{url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("failed reading body of {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("bad redirect from {url}: {reason}")]
    Redirect { url: String, reason: String },

    #[error("parsing {url} did not complete: {reason}")]
    Parse { url: String, reason: String },
}

impl FetchError {
    /// URL the error concerns
    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { url, .. }
            | Self::Connect { url, .. }
            | Self::Tls { url, .. }
            | Self::Http { url, .. }
            | Self::Status { url, .. }
            | Self::Timeout { url, .. }
            | Self::Body { url, .. }
            | Self::Redirect { url, .. }
            | Self::Parse { url, .. } => url,
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Whole-request timeout
    pub timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: format!("veil-shield/{}", env!("CARGO_PKG_VERSION")),
            max_body_size: 32 * 1024 * 1024,
        }
    }
}

impl From<&crate::config::FetchConfig> for HttpClientConfig {
    fn from(fetch: &crate::config::FetchConfig) -> Self {
        Self {
            timeout: fetch.timeout(),
            user_agent: fetch.user_agent.clone(),
            max_body_size: fetch.max_body_bytes,
        }
    }
}

/// GET-only text client
#[derive(Clone)]
pub struct HttpClient {
    config: HttpClientConfig,
    tls: TlsConnector,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        debug!(timeout = ?config.timeout, max_body = config.max_body_size, "HTTP client initialized");

        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    /// Download `url` and return its body as text.
    ///
    /// Only `200 OK` counts as success. One redirect is followed; invalid
    /// UTF-8 is replaced rather than rejected.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let after = self.config.timeout;
        match tokio::time::timeout(after, self.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                after,
            }),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let target = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut response = self.send(&target).await?;

        if response.status().is_redirection() {
            let next = redirect_target(&target, &response)?;
            debug!(from = url, to = %next, "Following redirect");

            response = self.send(&next).await?;
            if response.status().is_redirection() {
                return Err(FetchError::Redirect {
                    url: next.to_string(),
                    reason: "too many redirects".to_string(),
                });
            }
        }

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let body = Limited::new(response.into_body(), self.config.max_body_size)
            .collect()
            .await
            .map_err(|e| FetchError::Body {
                url: url.to_string(),
                reason: e.to_string(),
            })?
            .to_bytes();

        trace!(url, bytes = body.len(), "List downloaded");
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// One request/response exchange on a fresh connection
    async fn send(&self, target: &Url) -> Result<Response<Incoming>, FetchError> {
        let url = target.as_str();
        let invalid = |reason: &str| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let is_https = match target.scheme() {
            "https" => true,
            "http" => false,
            _ => return Err(invalid("unsupported scheme")),
        };
        let host = target.host_str().ok_or_else(|| invalid("no host in URL"))?;
        let port = target
            .port_or_known_default()
            .ok_or_else(|| invalid("no port for scheme"))?;

        let host_header = match target.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let path = &target[Position::BeforePath..Position::AfterQuery];

        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(HOST, host_header)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "text/plain, */*")
            .body(Empty::<Bytes>::new())
            .map_err(|e| FetchError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let stream = TcpStream::connect(format!("{host}:{port}"))
            .await
            .map_err(|source| FetchError::Connect {
                url: url.to_string(),
                source,
            })?;

        if is_https {
            let server_name =
                rustls::pki_types::ServerName::try_from(host.trim_matches(['[', ']']).to_string())
                    .map_err(|_| FetchError::Tls {
                        url: url.to_string(),
                        reason: "invalid server name".to_string(),
                    })?;

            let tls_stream =
                self.tls
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| FetchError::Tls {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;

            exchange(tls_stream, request, url).await
        } else {
            exchange(stream, request, url).await
        }
    }
}

async fn exchange<T>(
    io: T,
    request: Request<Empty<Bytes>>,
    url: &str,
) -> Result<Response<Incoming>, FetchError>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let http_error = |e: hyper::Error| FetchError::Http {
        url: url.to_string(),
        reason: e.to_string(),
    };

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(http_error)?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "List connection closed with error");
        }
    });

    sender.send_request(request).await.map_err(http_error)
}

fn redirect_target(from: &Url, response: &Response<Incoming>) -> Result<Url, FetchError> {
    let redirect_error = |reason: String| FetchError::Redirect {
        url: from.to_string(),
        reason,
    };

    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| redirect_error("missing Location header".to_string()))?;

    from.join(location).map_err(|e| redirect_error(e.to_string()))
}
