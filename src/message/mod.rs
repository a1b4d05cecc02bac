//! Structural HTTP messages and their raw wire form
//!
//! Requests and responses are handled as fully-buffered `http` messages. The
//! `wire` submodule turns them into self-contained HTTP/1.x byte sequences and
//! back, which is the representation stored in cache records.

pub mod wire;

use bytes::Bytes;

pub use wire::MalformedRecordError;

/// A fully-buffered outgoing request
pub type HttpRequest = http::Request<Bytes>;

/// A fully-buffered response
pub type HttpResponse = http::Response<Bytes>;
