use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SrError;

/// Registry-assigned schema identifier. Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(pub u32);

impl SchemaId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for SchemaId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Schema definition language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    /// Registries omit `schemaType` for Avro schemas.
    #[default]
    Avro,
    Protobuf,
    Json,
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaType::Avro => f.write_str("AVRO"),
            SchemaType::Protobuf => f.write_str("PROTOBUF"),
            SchemaType::Json => f.write_str("JSON"),
        }
    }
}

/// Named reference from one schema to another registered subject version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReference {
    pub name: String,
    pub subject: String,
    pub version: i32,
}

/// A registered schema. Never mutated after it has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub id: SchemaId,
    pub schema_type: SchemaType,
    /// Raw definition text (Avro JSON, `.proto` source, or JSON Schema).
    pub definition: String,
    pub references: Vec<SchemaReference>,
}

/// Body of a registry `GET /schemas/ids/{id}` response, as relayed by the host.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrySchemaBody {
    schema: String,
    #[serde(default)]
    schema_type: SchemaType,
    #[serde(default)]
    references: Vec<SchemaReference>,
}

impl Schema {
    pub fn new(id: impl Into<SchemaId>, schema_type: SchemaType, definition: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schema_type,
            definition: definition.into(),
            references: Vec::new(),
        }
    }

    pub fn with_reference(mut self, reference: SchemaReference) -> Self {
        self.references.push(reference);
        self
    }

    /// Parse a registry response body for schema `id`.
    pub fn from_registry_json(id: SchemaId, body: &[u8]) -> Result<Self, SrError> {
        let body: RegistrySchemaBody = serde_json::from_slice(body).map_err(|e| {
            SrError::RegistryUnavailable(format!("invalid registry response for schema {id}: {e}"))
        })?;
        Ok(Self {
            id,
            schema_type: body.schema_type,
            definition: body.schema,
            references: body.references,
        })
    }
}
