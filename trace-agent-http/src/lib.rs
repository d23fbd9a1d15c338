//! HTTP plumbing for the trace agent.
//!
//! The agent never talks to a concrete HTTP library directly. Transports are
//! written against the [`HttpClient`] trait so that embedders can bring the
//! client that fits their runtime. `reqwest` implementations are provided
//! behind the `reqwest` and `reqwest-blocking` features.
use async_trait::async_trait;
use std::fmt::Debug;

#[doc(no_inline)]
pub use bytes::Bytes;
#[doc(no_inline)]
pub use http::{Request, Response, StatusCode};

/// Boxed error returned by [`HttpClient`] implementations.
pub type HttpError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A minimal interface necessary for sending requests over HTTP.
///
/// Exporters only ever POST an already encoded payload and look at the status
/// code and body of the answer, so this is all the surface they need.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    /// Send the specified HTTP request with a `Bytes` payload.
    ///
    /// Returns the HTTP response including the status code and body. Non-2xx
    /// statuses are returned as responses, use [`ResponseExt::error_for_status`]
    /// to turn them into errors.
    ///
    /// Returns an error if it can't connect to the server or the request could not be completed,
    /// e.g. because of a timeout, infinite redirects, or a loss of connection.
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError>;
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for Box<T> {
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
        (**self).send_bytes(request).await
    }
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for std::sync::Arc<T> {
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
        (**self).send_bytes(request).await
    }
}

#[cfg(feature = "reqwest")]
mod reqwest {
    use super::{async_trait, Bytes, HttpClient, HttpError, Request, Response};

    #[async_trait]
    impl HttpClient for reqwest::Client {
        async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            #[cfg(feature = "internal-logs")]
            tracing::debug!(name: "ReqwestClient.Send", uri = %request.uri());
            let request = request.try_into()?;
            let mut response = self.execute(request).await?;
            let headers = std::mem::take(response.headers_mut());
            let mut http_response = Response::builder()
                .status(response.status())
                .body(response.bytes().await?)?;
            *http_response.headers_mut() = headers;

            Ok(http_response)
        }
    }

    #[cfg(all(feature = "reqwest-blocking", not(target_arch = "wasm32")))]
    #[async_trait]
    impl HttpClient for reqwest::blocking::Client {
        async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            #[cfg(feature = "internal-logs")]
            tracing::debug!(name: "ReqwestBlockingClient.Send", uri = %request.uri());
            let request = request.try_into()?;
            let mut response = self.execute(request)?;
            let headers = std::mem::take(response.headers_mut());
            let mut http_response = Response::builder()
                .status(response.status())
                .body(response.bytes()?)?;
            *http_response.headers_mut() = headers;

            Ok(http_response)
        }
    }
}

/// Methods to make working with responses from the [`HttpClient`] trait easier.
pub trait ResponseExt: Sized {
    /// Turn a response into an error if the HTTP status does not indicate success (200 - 299).
    fn error_for_status(self) -> Result<Self, HttpError>;
}

impl<T> ResponseExt for Response<T> {
    fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(Box::new(StatusError(self.status())))
        }
    }
}

/// Error carrying the status of a response that was not a success.
///
/// Kept as a distinct type so callers can recover the status code by
/// downcasting an [`HttpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusError(pub StatusCode);

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request failed with status {}", self.0)
    }
}

impl std::error::Error for StatusError {}
