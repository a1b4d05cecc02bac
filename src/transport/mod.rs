//! Request executors
//!
//! A `RequestExecutor` performs a structural HTTP request and returns the
//! buffered response. `ReqwestExecutor` sends requests over the network;
//! `CachingExecutor` decorates any executor with the response cache.

mod caching;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;

use crate::message::{HttpRequest, HttpResponse};

pub use caching::{CacheError, CacheStatus, CachingExecutor};

/// Performs HTTP requests
pub trait RequestExecutor: Send + Sync {
    /// Sends `request` and buffers the whole response
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}

impl<T: RequestExecutor + ?Sized> RequestExecutor for Arc<T> {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        (**self).execute(request)
    }
}

/// Failure reported by a request executor
///
/// Wraps whatever error the executor produced (DNS, connection, TLS, ...)
/// and displays as that error.
#[derive(Debug)]
pub struct TransportError {
    inner: Box<dyn StdError + Send + Sync + 'static>,
}

impl TransportError {
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            inner: error.into(),
        }
    }

    /// The executor's original error
    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.inner
    }

    /// Unwraps the underlying error
    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync + 'static> {
        self.inner
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self::new(error)
    }
}

/// Sends requests over the network with `reqwest`
#[derive(Debug, Clone, Default)]
pub struct ReqwestExecutor {
    client: Client,
}

impl ReqwestExecutor {
    /// Creates an executor around a preconfigured client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl RequestExecutor for ReqwestExecutor {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let request = reqwest::Request::try_from(request)?;
            let response = self.client.execute(request).await?;

            let status = response.status();
            let version = response.version();
            let headers = response.headers().clone();
            let body = response.bytes().await?;

            let mut buffered = HttpResponse::new(body);
            *buffered.status_mut() = status;
            *buffered.version_mut() = version;
            *buffered.headers_mut() = headers;
            Ok(buffered)
        })
    }
}
