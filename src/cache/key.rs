//! Request fingerprints
//!
//! A `RequestKey` identifies a cache entry by method, full URL and a SHA-256
//! digest of the request headers. The body never takes part in the key.

use http::{HeaderMap, HeaderName};
use sha2::{Digest, Sha256};

use crate::message::HttpRequest;

/// Identity of a cached exchange
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: String,
    url: String,
    headers_hash: String,
}

impl RequestKey {
    /// Builds a key from its stored parts (used when loading a cache file)
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        headers_hash: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers_hash: headers_hash.into(),
        }
    }

    /// Derives the key of an outgoing request
    ///
    /// Method and URL (including the query string) are taken verbatim.
    pub fn from_request(request: &HttpRequest) -> Self {
        Self {
            method: request.method().as_str().to_string(),
            url: request.uri().to_string(),
            headers_hash: headers_digest(request.headers()),
        }
    }

    /// Request method, e.g. `GET`
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Full request URL as sent
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Hex-encoded SHA-256 of the serialized headers
    pub fn headers_hash(&self) -> &str {
        &self.headers_hash
    }
}

/// Hashes headers serialized as `name: value\r\n` lines
///
/// Names are sorted so insertion order does not matter; the values of a
/// repeated header keep their relative order.
pub fn headers_digest(headers: &HeaderMap) -> String {
    let mut names: Vec<&HeaderName> = headers.keys().collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));

    let mut hasher = Sha256::new();
    for name in names {
        for value in headers.get_all(name) {
            hasher.update(name.as_str().as_bytes());
            hasher.update(b": ");
            hasher.update(value.as_bytes());
            hasher.update(b"\r\n");
        }
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..])
}
