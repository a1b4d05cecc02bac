//! Caching request executor
//!
//! `CachingExecutor` wraps another executor. Each request is fingerprinted
//! and looked up in the shared `CacheStore`: a fresh record is decoded and
//! returned without touching the network, anything else is forwarded. Fresh
//! 2xx responses are recorded; every forwarded response, stored or not, is
//! returned through the same decode path as a cache hit.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

use super::{ReqwestExecutor, RequestExecutor, TransportError};
use crate::cache::{CacheStore, Record, RequestKey};
use crate::message::wire::{dump_request, dump_response};
use crate::message::{HttpRequest, HttpResponse, MalformedRecordError};

/// Errors returned by [`CachingExecutor::round_trip`]
#[derive(Debug, Error)]
pub enum CacheError {
    /// The wrapped executor failed; the error is passed on unchanged
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A recorded exchange could not be parsed back into a response
    #[error("malformed cache record: {0}")]
    MalformedRecord(#[from] MalformedRecordError),
}

/// Where a response came from, attached as a response extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a fresh record
    Hit,
    /// Forwarded to the wrapped executor
    Miss,
}

/// Executor decorator that serves fresh recorded responses
#[derive(Debug, Clone)]
pub struct CachingExecutor<E = ReqwestExecutor> {
    store: Arc<CacheStore>,
    executor: E,
}

impl<E: RequestExecutor> CachingExecutor<E> {
    /// Creates a caching executor forwarding misses to `executor`
    pub fn new(store: Arc<CacheStore>, executor: E) -> Self {
        Self { store, executor }
    }

    /// Uses `executor` if given, otherwise `E::default()`
    pub fn with_executor_or_default(store: Arc<CacheStore>, executor: Option<E>) -> Self
    where
        E: Default,
    {
        Self::new(store, executor.unwrap_or_default())
    }

    /// The shared store behind this executor
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// The wrapped executor that cache misses go to
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Serves `request` from the cache or forwards it
    ///
    /// # Returns
    /// * `Ok(HttpResponse)` tagged with a [`CacheStatus`] extension
    /// * `Err(CacheError::Transport)` if the wrapped executor failed
    /// * `Err(CacheError::MalformedRecord)` if a fresh record does not decode;
    ///   the request is not retried over the network
    pub async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, CacheError> {
        let key = RequestKey::from_request(&request);

        match self.store.get(&key) {
            Some(record) if self.store.is_fresh(&record) => {
                debug!(method = key.method(), url = key.url(), "Cache hit");
                let response = record.decode().map_err(|e| {
                    warn!(
                        method = key.method(),
                        url = key.url(),
                        error = %e,
                        "Cached record is malformed"
                    );
                    e
                })?;
                return Ok(tagged(response, CacheStatus::Hit));
            }
            Some(_) => debug!(method = key.method(), url = key.url(), "Cached record is stale"),
            None => debug!(method = key.method(), url = key.url(), "Cache miss"),
        }

        // Dumped up front; the request itself moves into the executor
        let request_bytes = dump_request(&request);
        let method = request.method().clone();

        let response = self.executor.execute(request).await?;
        let record = Record::from_parts(
            Utc::now(),
            request_bytes,
            dump_response(&response, &method),
        );

        let status = response.status();
        if status.is_success() {
            debug!(
                method = key.method(),
                url = key.url(),
                status = status.as_u16(),
                "Storing response"
            );
            self.store.put(key, record.clone());
        } else {
            debug!(
                method = key.method(),
                url = key.url(),
                status = status.as_u16(),
                "Not caching non-2xx response"
            );
        }

        let response = record.decode()?;
        Ok(tagged(response, CacheStatus::Miss))
    }
}

impl<E: RequestExecutor> RequestExecutor for CachingExecutor<E> {
    /// Transport errors pass through unchanged; malformed records are
    /// reported as transport errors wrapping the `CacheError`.
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            self.round_trip(request).await.map_err(|error| match error {
                CacheError::Transport(inner) => inner,
                other => TransportError::new(other),
            })
        })
    }
}

fn tagged(mut response: HttpResponse, status: CacheStatus) -> HttpResponse {
    response.extensions_mut().insert(status);
    response
}
