//! Response cache: fingerprints, records, the concurrent store and its
//! persistence
//!
//! Records are keyed by a `RequestKey` derived from method, URL and headers.
//! A single TTL applies to the whole store; entries are never evicted and
//! only leave the store when it is cleared or discarded. The whole store can
//! be saved to and merged back from a cache file.

mod key;
pub mod persist;
mod record;
mod store;

pub use key::{headers_digest, RequestKey};
pub use persist::{
    deserialize_store, load_from_file, save_to_file, serialize_store, BincodeCodec, LoadOutcome,
    Persistence, PersistenceError, StoreCodec,
};
pub use record::Record;
pub use store::CacheStore;
