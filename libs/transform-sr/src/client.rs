use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::SchemaCache;
use crate::error::SrError;
use crate::fetch::SchemaFetcher;
use crate::schema::{Schema, SchemaId, SchemaType};
use crate::wire;

/// Encode/decode registry-framed payloads.
///
/// Every operation is a thin composition of the wire codec and the schema
/// cache. The only side effect is at most one host fetch per unseen ID.
#[derive(Debug)]
pub struct SchemaRegistryClient {
    cache: SchemaCache,
}

impl SchemaRegistryClient {
    pub fn new(fetcher: Box<dyn SchemaFetcher>) -> Self {
        Self {
            cache: SchemaCache::new(fetcher),
        }
    }

    /// Split an envelope and resolve its schema.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<(Arc<Schema>, &'a [u8]), SrError> {
        let envelope = wire::decode_envelope(bytes)?;
        let schema = self.cache.get(envelope.schema_id)?;
        Ok((schema, envelope.payload))
    }

    /// Frame `payload` with `schema_id` after checking the ID resolves.
    ///
    /// Resolution errors come back unchanged, so an unknown ID fails with
    /// `SCHEMA_NOT_FOUND` and nothing is produced.
    pub fn encode(&self, schema_id: SchemaId, payload: &[u8]) -> Result<Vec<u8>, SrError> {
        self.cache.get(schema_id)?;
        Ok(wire::encode_envelope(schema_id, payload))
    }

    pub fn lookup_schema(&self, schema_id: SchemaId) -> Result<Arc<Schema>, SrError> {
        self.cache.get(schema_id)
    }

    /// Decode a JSON-schema payload straight into `T`.
    pub fn decode_json<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<(SchemaId, T), SrError> {
        let (schema, payload) = self.decode(bytes)?;
        expect_type(&schema, SchemaType::Json)?;
        Ok((schema.id, serde_json::from_slice(payload)?))
    }

    /// Serialize `value` as JSON and frame it with a JSON schema ID.
    pub fn encode_json<T: Serialize>(&self, schema_id: SchemaId, value: &T) -> Result<Vec<u8>, SrError> {
        let schema = self.cache.get(schema_id)?;
        expect_type(&schema, SchemaType::Json)?;
        let payload = serde_json::to_vec(value)?;
        Ok(wire::encode_envelope(schema_id, &payload))
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }
}

fn expect_type(schema: &Schema, expected: SchemaType) -> Result<(), SrError> {
    if schema.schema_type != expected {
        return Err(SrError::SchemaTypeMismatch {
            id: schema.id,
            expected,
            actual: schema.schema_type,
        });
    }
    Ok(())
}
