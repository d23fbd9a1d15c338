//! HTTP transport shared by the exporters.
//!
//! The transport resolves where batches go, sends one encoded payload per
//! call and classifies what went wrong. It never retries.
use crate::config::Config;
use http::uri::InvalidUri;
use http::{header, Method, Request, Response, StatusCode, Uri};
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use trace_agent_http::{Bytes, HttpClient, HttpError, ResponseExt, StatusError};

/// Why a send did not succeed.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Nothing listens on the resolved endpoint.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The collector did not answer in time.
    #[error("request timed out")]
    Timeout,

    /// The collector answered with a non-2xx status.
    #[error("collector answered with status {0}")]
    Status(StatusCode),

    /// The collector answered 2xx with a body that could not be understood.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The request could not be built.
    #[error(transparent)]
    Request(#[from] http::Error),

    /// The resolved endpoint is not a valid URI.
    #[error(transparent)]
    InvalidUri(#[from] InvalidUri),

    /// Any other client failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether the failure means the connection to the collector is gone, so
    /// anything learned about the collector should be forgotten.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, TransportError::ConnectionRefused(_))
    }

    /// Classifies an error returned by an [`HttpClient`].
    pub fn from_http_error(err: HttpError) -> Self {
        if let Some(status) = err.downcast_ref::<StatusError>() {
            return TransportError::Status(status.0);
        }

        #[cfg(feature = "reqwest")]
        if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>() {
            if reqwest_err.is_timeout() {
                return TransportError::Timeout;
            }
            if reqwest_err.is_connect() {
                return TransportError::ConnectionRefused(reqwest_err.to_string());
            }
        }

        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&*err);
        while let Some(current) = source {
            if let Some(io_err) = current.downcast_ref::<io::Error>() {
                match io_err.kind() {
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                        return TransportError::ConnectionRefused(io_err.to_string())
                    }
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                        return TransportError::Timeout
                    }
                    _ => {}
                }
            }
            source = current.source();
        }

        TransportError::Other(err.to_string())
    }
}

/// Where the collector lives, after applying the discrete agent settings
/// over the endpoint URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub use_https: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl AgentEndpoint {
    /// Resolves the endpoint from `config`, using the given defaults for
    /// whatever neither a discrete setting nor the endpoint URL provides.
    pub fn from_config(config: &Config, default_port: u16, default_path: &str) -> Self {
        AgentEndpoint {
            use_https: config.agent_use_https(),
            host: config.agent_host().unwrap_or("localhost").to_string(),
            port: config.agent_port().unwrap_or(default_port),
            path: config
                .agent_path()
                .filter(|path| !path.is_empty())
                .unwrap_or(default_path)
                .to_string(),
        }
    }

    fn scheme(&self) -> &'static str {
        if self.use_https {
            "https"
        } else {
            "http"
        }
    }

    /// `scheme://host:port`, without any path.
    pub fn base_uri(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }

    /// URI of `path` on this endpoint.
    pub fn uri_for(&self, path: &str) -> Result<Uri, InvalidUri> {
        format!("{}{}", self.base_uri(), path).parse()
    }

    /// URI of the configured path.
    pub fn uri(&self) -> Result<Uri, InvalidUri> {
        self.uri_for(&self.path)
    }
}

impl fmt::Display for AgentEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base_uri(), self.path)
    }
}

/// Sends encoded payloads through an [`HttpClient`].
#[derive(Clone, Debug)]
pub struct Transport {
    client: Arc<dyn HttpClient>,
}

impl Transport {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Transport { client }
    }

    /// POSTs `payload` to `uri`. Any non-2xx status is an error.
    pub async fn send(
        &self,
        uri: Uri,
        content_type: &str,
        headers: &[(&'static str, String)],
        payload: Vec<u8>,
    ) -> Result<Response<Bytes>, TransportError> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = builder.body(Bytes::from(payload))?;

        self.client
            .send_bytes(request)
            .await
            .and_then(ResponseExt::error_for_status)
            .map_err(TransportError::from_http_error)
    }
}
