//! HTTP transport: the single place requests are built, sent and classified.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, RANGE, REFERER};
use reqwest::{Client, Proxy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::constants::DEFAULT_TIMEOUT_SECS;
use super::error::DownloadError;
use crate::user_agent::{BROWSER_USER_AGENT, SITE_REFERER};

/// SOCKS5 proxy endpoint. Hostnames are resolved by the proxy, not locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksProxy {
    host: String,
    port: u16,
}

impl SocksProxy {
    /// Creates a proxy endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Proxy URL with remote DNS resolution (`socks5h`).
    #[must_use]
    pub fn proxy_url(&self) -> String {
        format!("socks5h://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for SocksProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Error parsing a `host:port` proxy specification.
#[derive(Debug, thiserror::Error)]
#[error("invalid SOCKS proxy {input:?}: expected HOST:PORT")]
pub struct ProxySpecError {
    input: String,
}

impl FromStr for SocksProxy {
    type Err = ProxySpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProxySpecError {
            input: s.to_string(),
        };
        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        Ok(Self::new(host, port))
    }
}

/// Transport-level options handed to [`HttpClient::new`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Applied to connection setup and to every body read.
    pub timeout: Duration,
    /// Route all traffic through this proxy when set.
    pub socks_proxy: Option<SocksProxy>,
    /// User-Agent header value.
    pub user_agent: String,
    /// Referer header value.
    pub referer: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            socks_proxy: None,
            user_agent: BROWSER_USER_AGENT.to_string(),
            referer: SITE_REFERER.to_string(),
        }
    }
}

/// Inclusive byte range for a `Range` request header. An open `end` means
/// "to the end of the resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset, inclusive.
    pub end: Option<u64>,
}

impl ByteRange {
    /// Range from `start` to the end of the resource.
    #[must_use]
    pub fn from(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Range covering `start` up to (but excluding) `total`.
    #[must_use]
    pub fn remaining(start: u64, total: u64) -> Self {
        Self {
            start,
            end: total.checked_sub(1),
        }
    }

    /// Header value in `bytes=<start>-<end>` form.
    #[must_use]
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{end}", self.start),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Errors raised while building the underlying HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    /// The proxy URL was rejected by reqwest.
    #[error("invalid proxy {proxy}: {source}")]
    Proxy {
        /// Proxy URL that failed.
        proxy: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// A configured header value contains invalid characters.
    #[error("invalid header value for {header}: {value:?}")]
    InvalidHeader {
        /// Header name.
        header: &'static str,
        /// Rejected value.
        value: String,
    },

    /// reqwest failed to build the client.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// HTTP client shared by every worker.
///
/// Cheap to clone; clones share one connection pool.
///
/// # Example
///
/// ```no_run
/// use albumdl_core::download::{HttpClient, TransportConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new(&TransportConfig::default())?;
/// let page = client
///     .fetch_text("http://myzuka.club/Album/1", &CancellationToken::new())
///     .await?;
/// println!("{} bytes of HTML", page.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client applying the fixed identity headers, timeout and proxy.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the proxy URL or header values are
    /// rejected, or if the TLS backend cannot be initialised.
    pub fn new(config: &TransportConfig) -> Result<Self, ClientBuildError> {
        let mut headers = HeaderMap::new();
        let referer =
            HeaderValue::from_str(&config.referer).map_err(|_| ClientBuildError::InvalidHeader {
                header: "Referer",
                value: config.referer.clone(),
            })?;
        headers.insert(REFERER, referer);

        let mut builder = Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .default_headers(headers);

        if let Some(proxy) = &config.socks_proxy {
            let proxy_url = proxy.proxy_url();
            let proxy = Proxy::all(&proxy_url).map_err(|source| ClientBuildError::Proxy {
                proxy: proxy_url.clone(),
                source,
            })?;
            // Drop system/env proxies so nothing bypasses the configured one.
            builder = builder.no_proxy().proxy(proxy);
            debug!(proxy = %proxy_url, "routing all requests through SOCKS proxy");
        }

        let client = builder.build().map_err(ClientBuildError::Build)?;
        Ok(Self { client })
    }

    /// Sends a GET request, optionally restricted to a byte range.
    ///
    /// Returns the response once headers arrive; the body is left unread.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] / [`DownloadError::UnsupportedScheme`] before any I/O
    /// - [`DownloadError::Timeout`] / [`DownloadError::Network`] on transport failure
    /// - [`DownloadError::HttpStatus`] for any non-2xx response
    /// - [`DownloadError::Cancelled`] if `cancel` fires while waiting
    #[instrument(level = "debug", skip(self, cancel))]
    pub async fn fetch(
        &self,
        url: &str,
        range: Option<ByteRange>,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, DownloadError> {
        let parsed = validate_url(url)?;

        let mut request = self.client.get(parsed);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::cancelled(url)),
            result = request.send() => result.map_err(|e| map_send_error(url, e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        debug!(status = status.as_u16(), "response received");
        Ok(response)
    }

    /// Fetches a page and returns its decoded text.
    ///
    /// # Errors
    ///
    /// Same classification as [`HttpClient::fetch`]; body read failures are
    /// [`DownloadError::Network`].
    pub async fn fetch_text(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DownloadError> {
        let response = self.fetch(url, None, cancel).await?;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DownloadError::cancelled(url)),
            text = response.text() => text.map_err(|e| map_send_error(url, e)),
        }
    }
}

/// Parses `url` and rejects anything that is not http(s).
pub(crate) fn validate_url(url: &str) -> Result<Url, DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(DownloadError::unsupported_scheme(url, other)),
    }
}

pub(crate) fn map_send_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else if error.is_builder() {
        DownloadError::invalid_url(url)
    } else {
        DownloadError::network(url, error)
    }
}
