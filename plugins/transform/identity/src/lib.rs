use transform_sdk::{BoxError, Record, RecordTransform, TransformContext, TransformError, TransformRuntime};

/// Identity transform: every input record is emitted unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl RecordTransform for IdentityTransform {
    fn transform(
        &mut self,
        record: &Record,
        _ctx: &TransformContext<'_>,
    ) -> Result<Vec<Record>, BoxError> {
        Ok(vec![record.clone()])
    }
}

pub fn setup(runtime: &mut TransformRuntime) -> Result<(), TransformError> {
    runtime.register(Box::new(IdentityTransform))
}

// ---------------------------------------------------------------------------
// WASM exports
// ---------------------------------------------------------------------------

transform_sdk::export_transform!(setup);
