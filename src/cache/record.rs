//! Cache records: one recorded request/response exchange
//!
//! A `Record` keeps the raw HTTP/1.x dumps of a request and of the response it
//! received, plus the time it was captured. Decoding replays the dumps through
//! the wire parser, so a response served from a record is indistinguishable
//! from the freshly received one.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};

use crate::message::wire::{dump_request, dump_response, parse_request, parse_response};
use crate::message::{HttpRequest, HttpResponse, MalformedRecordError};

/// A recorded exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// When the exchange was recorded
    timestamp: DateTime<Utc>,
    /// Raw dump of the request
    request: Bytes,
    /// Raw dump of the response, parseable in the context of `request`
    response: Bytes,
}

impl Record {
    /// Records an exchange, stamped with the current time
    ///
    /// Both messages are only borrowed, the request body included.
    pub fn encode(request: &HttpRequest, response: &HttpResponse) -> Self {
        Self::from_parts(
            Utc::now(),
            dump_request(request),
            dump_response(response, request.method()),
        )
    }

    /// Assembles a record from already-dumped messages
    pub fn from_parts(
        timestamp: DateTime<Utc>,
        request: impl Into<Bytes>,
        response: impl Into<Bytes>,
    ) -> Self {
        Self {
            timestamp,
            request: request.into(),
            response: response.into(),
        }
    }

    /// When the exchange was recorded
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialized request, as dumped at record time
    pub fn request_bytes(&self) -> &Bytes {
        &self.request
    }

    /// Serialized response, as dumped at record time
    pub fn response_bytes(&self) -> &Bytes {
        &self.response
    }

    /// Parses the stored request
    pub fn request(&self) -> Result<HttpRequest, MalformedRecordError> {
        parse_request(&self.request)
    }

    /// Rebuilds the recorded response
    ///
    /// # Returns
    /// * `Ok(HttpResponse)` with the recorded status, version, headers and body
    /// * `Err(MalformedRecordError)` if either stored message does not parse
    pub fn decode(&self) -> Result<HttpResponse, MalformedRecordError> {
        let request = self.request()?;
        parse_response(&self.response, &request)
    }

    /// Returns whether the record is still fresh at `now` under `ttl`
    ///
    /// A zero TTL never expires. Records stamped in the future count as fresh.
    pub fn is_fresh_at(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> bool {
        if ttl.is_zero() {
            return true;
        }
        match Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.timestamp) < ttl,
            // Longer than chrono can represent
            Err(_) => true,
        }
    }
}
