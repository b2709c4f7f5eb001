use tracing::trace;
use transform_sdk::sr::{SchemaType, SrError};
use transform_sdk::{BoxError, Record, RecordTransform, TransformContext, TransformError, TransformRuntime};

/// Upper-cases JSON payloads framed with a registry envelope.
///
/// The value is decoded, its schema must be `JSON`, the payload is ASCII
/// upper-cased and re-framed with the same schema ID. Key, headers and
/// timestamp are kept. Records without a value pass through.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonUpperTransform;

impl RecordTransform for JsonUpperTransform {
    fn transform(
        &mut self,
        record: &Record,
        ctx: &TransformContext<'_>,
    ) -> Result<Vec<Record>, BoxError> {
        let Some(value) = record.value() else {
            return Ok(vec![record.clone()]);
        };

        let registry = ctx.registry();
        let (schema, payload) = registry.decode(value)?;
        if schema.schema_type != SchemaType::Json {
            return Err(SrError::SchemaTypeMismatch {
                id: schema.id,
                expected: SchemaType::Json,
                actual: schema.schema_type,
            }
            .into());
        }

        let framed = registry.encode(schema.id, &payload.to_ascii_uppercase())?;
        trace!(offset = ctx.offset(), schema_id = %schema.id, "payload upper-cased");
        Ok(vec![record.to_builder().value(framed).build()])
    }
}

pub fn setup(runtime: &mut TransformRuntime) -> Result<(), TransformError> {
    runtime.register(Box::new(JsonUpperTransform))
}

// ---------------------------------------------------------------------------
// WASM exports
// ---------------------------------------------------------------------------

transform_sdk::export_transform!(setup);
