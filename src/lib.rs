//! httpcache - a transparent caching layer for outbound HTTP requests
//!
//! Requests go through a [`CachingExecutor`], which serves fresh recorded
//! responses from a shared [`CacheStore`] and forwards everything else to a
//! wrapped [`RequestExecutor`]. Stores can be saved to and loaded from a
//! cache file so recorded exchanges survive between runs.

pub mod cache;
pub mod cli;
pub mod message;
pub mod transport;

pub use cache::{CacheStore, Record, RequestKey};
pub use message::{HttpRequest, HttpResponse, MalformedRecordError};
pub use transport::{
    CacheError, CacheStatus, CachingExecutor, ReqwestExecutor, RequestExecutor, TransportError,
};
