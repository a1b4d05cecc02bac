//! Cache file persistence
//!
//! Serializes a whole `CacheStore` (TTL plus every entry) into a single binary
//! envelope and merges such envelopes back into a store. The envelope format
//! lives behind the `StoreCodec` trait so the store's in-memory layout is not
//! tied to one on-disk scheme; `BincodeCodec` is the default.
//!
//! Persistence is not meant to run while requests are in flight. Load a cache
//! file before serving traffic and save it afterwards.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use bincode::{Decode, Encode};
use chrono::DateTime;
use thiserror::Error;
use tracing::info;

use super::{CacheStore, Record, RequestKey};

/// Errors that can occur while saving or loading a cache
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing the underlying stream failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode cache: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode cache: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The envelope decoded but bytes were left over
    #[error("cache data has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("cache entry for {url} has an out-of-range timestamp")]
    InvalidTimestamp { url: String },
}

/// Outcome of loading a cache file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file does not exist; the store was left untouched
    Missing,
    /// The file was merged into the store
    Loaded(usize),
}

/// Turns a whole store into bytes and back
pub trait StoreCodec {
    /// Serializes the TTL and every entry of `store`
    fn encode(&self, store: &CacheStore) -> Result<Vec<u8>, PersistenceError>;

    /// Merges the entries in `bytes` into `store` and replaces its TTL
    ///
    /// Nothing is applied unless the whole input decodes. Returns the number
    /// of entries merged.
    fn decode_into(&self, bytes: &[u8], store: &CacheStore) -> Result<usize, PersistenceError>;
}

/// On-disk envelope for a whole store
#[derive(Debug, Encode, Decode)]
struct StoreEnvelope {
    ttl_nanos: u64,
    entries: Vec<EntryEnvelope>,
}

#[derive(Debug, Encode, Decode)]
struct EntryEnvelope {
    method: String,
    url: String,
    headers_hash: String,
    timestamp_secs: i64,
    timestamp_nanos: u32,
    request: Vec<u8>,
    response: Vec<u8>,
}

impl EntryEnvelope {
    fn from_entry(key: &RequestKey, record: &Record) -> Self {
        let timestamp = record.timestamp();
        Self {
            method: key.method().to_string(),
            url: key.url().to_string(),
            headers_hash: key.headers_hash().to_string(),
            timestamp_secs: timestamp.timestamp(),
            timestamp_nanos: timestamp.timestamp_subsec_nanos(),
            request: record.request_bytes().to_vec(),
            response: record.response_bytes().to_vec(),
        }
    }

    fn into_entry(self) -> Result<(RequestKey, Record), PersistenceError> {
        let Some(timestamp) = DateTime::from_timestamp(self.timestamp_secs, self.timestamp_nanos)
        else {
            return Err(PersistenceError::InvalidTimestamp { url: self.url });
        };
        let key = RequestKey::new(self.method, self.url, self.headers_hash);
        let record = Record::from_parts(timestamp, self.request, self.response);
        Ok((key, record))
    }
}

/// Upper bound on memory claimed while decoding a cache file
///
/// Length prefixes in a damaged file would otherwise be preallocated as-is.
const MAX_DECODE_BYTES: usize = 1 << 30;

/// Versionless `bincode` envelope: TTL in nanoseconds followed by the entries
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl StoreCodec for BincodeCodec {
    fn encode(&self, store: &CacheStore) -> Result<Vec<u8>, PersistenceError> {
        let mut entries = Vec::with_capacity(store.len());
        store.for_each(|key, record| entries.push(EntryEnvelope::from_entry(key, record)));

        let ttl_nanos = u64::try_from(store.ttl().as_nanos()).unwrap_or(u64::MAX);
        let envelope = StoreEnvelope { ttl_nanos, entries };
        Ok(bincode::encode_to_vec(&envelope, bincode::config::standard())?)
    }

    fn decode_into(&self, bytes: &[u8], store: &CacheStore) -> Result<usize, PersistenceError> {
        let config = bincode::config::standard().with_limit::<MAX_DECODE_BYTES>();
        let (envelope, read): (StoreEnvelope, usize) = bincode::decode_from_slice(bytes, config)?;
        if read != bytes.len() {
            return Err(PersistenceError::TrailingBytes(bytes.len() - read));
        }

        let entries = envelope
            .entries
            .into_iter()
            .map(EntryEnvelope::into_entry)
            .collect::<Result<Vec<_>, _>>()?;

        let count = entries.len();
        store.set_ttl(Duration::from_nanos(envelope.ttl_nanos));
        for (key, record) in entries {
            store.put(key, record);
        }
        Ok(count)
    }
}

/// Saves and loads stores through a `StoreCodec`
#[derive(Debug, Clone, Default)]
pub struct Persistence<C = BincodeCodec> {
    codec: C,
}

impl<C: StoreCodec> Persistence<C> {
    /// Uses `codec` for every save and load
    pub fn with_codec(codec: C) -> Self {
        Self { codec }
    }

    /// Serializes the TTL and every entry of `store`
    pub fn serialize(&self, store: &CacheStore) -> Result<Vec<u8>, PersistenceError> {
        self.codec.encode(store)
    }

    /// Builds a new store from serialized bytes
    pub fn deserialize(&self, bytes: &[u8]) -> Result<CacheStore, PersistenceError> {
        let store = CacheStore::default();
        self.codec.decode_into(bytes, &store)?;
        Ok(store)
    }

    /// Merges serialized bytes into an existing store, replacing its TTL
    pub fn load_into(&self, bytes: &[u8], store: &CacheStore) -> Result<usize, PersistenceError> {
        self.codec.decode_into(bytes, store)
    }

    /// Writes the serialized store to `writer`
    pub fn save<W: Write>(
        &self,
        store: &CacheStore,
        mut writer: W,
    ) -> Result<(), PersistenceError> {
        let bytes = self.codec.encode(store)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads `reader` to the end and merges it into `store`
    pub fn load<R: Read>(
        &self,
        store: &CacheStore,
        mut reader: R,
    ) -> Result<usize, PersistenceError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.codec.decode_into(&bytes, store)
    }

    /// Creates or truncates `path` and writes the serialized store
    pub fn save_to_file(&self, store: &CacheStore, path: &Path) -> Result<(), PersistenceError> {
        let bytes = self.codec.encode(store)?;
        fs::write(path, &bytes)?;
        info!(path = %path.display(), entries = store.len(), "Saved cache file");
        Ok(())
    }

    /// Merges the cache file at `path` into `store`
    ///
    /// # Returns
    /// * `Ok(LoadOutcome::Missing)` if the file does not exist (store untouched)
    /// * `Ok(LoadOutcome::Loaded(n))` after merging `n` entries
    /// * `Err(PersistenceError)` on any other I/O or decode failure
    pub fn load_from_file(
        &self,
        store: &CacheStore,
        path: &Path,
    ) -> Result<LoadOutcome, PersistenceError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No cache file, starting empty");
                return Ok(LoadOutcome::Missing);
            }
            Err(e) => return Err(e.into()),
        };
        let count = self.codec.decode_into(&bytes, store)?;
        info!(path = %path.display(), entries = count, "Loaded cache file");
        Ok(LoadOutcome::Loaded(count))
    }
}

/// Serializes `store` with the default codec
pub fn serialize_store(store: &CacheStore) -> Result<Vec<u8>, PersistenceError> {
    Persistence::<BincodeCodec>::default().serialize(store)
}

/// Builds a store from bytes produced by [`serialize_store`]
pub fn deserialize_store(bytes: &[u8]) -> Result<CacheStore, PersistenceError> {
    Persistence::<BincodeCodec>::default().deserialize(bytes)
}

/// Saves `store` to `path` with the default codec
pub fn save_to_file(store: &CacheStore, path: &Path) -> Result<(), PersistenceError> {
    Persistence::<BincodeCodec>::default().save_to_file(store, path)
}

/// Merges the cache file at `path` into `store` with the default codec
///
/// A missing file is not an error.
pub fn load_from_file(store: &CacheStore, path: &Path) -> Result<LoadOutcome, PersistenceError> {
    Persistence::<BincodeCodec>::default().load_from_file(store, path)
}
