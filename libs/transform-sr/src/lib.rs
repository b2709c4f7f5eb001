//! Schema registry client for transform guests.
//!
//! Payloads on the wire carry a 5-byte envelope (magic byte + big-endian
//! schema ID). The client splits/joins envelopes and resolves schema IDs
//! through a per-instance cache backed by a host fetch capability.

pub mod cache;
pub mod client;
pub mod error;
pub mod fetch;
pub mod schema;
pub mod wire;

pub use cache::SchemaCache;
pub use client::SchemaRegistryClient;
pub use error::SrError;
pub use fetch::{FetchError, InMemoryFetcher, SchemaFetcher};
pub use schema::{Schema, SchemaId, SchemaReference, SchemaType};
pub use wire::{Envelope, decode_envelope, encode_envelope};

#[cfg(target_arch = "wasm32")]
pub use fetch::HostSchemaFetcher;
