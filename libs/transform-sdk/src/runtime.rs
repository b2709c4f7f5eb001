use serde::Serialize;
use tracing::{debug, error, warn};
use transform_sr::SchemaRegistryClient;

use crate::bridge;
use crate::config::TransformConfig;
use crate::error::{BoxError, ErrorKind, TransformError};
use crate::probe::{self, TransformProbe};
use crate::record::{BatchMeta, Record, RecordBatch};

/// User transform logic, invoked once per input record.
///
/// Returning `Err` fails only the current record; the runtime moves on
/// to the next one.
pub trait RecordTransform {
    fn transform(
        &mut self,
        record: &Record,
        ctx: &TransformContext<'_>,
    ) -> Result<Vec<Record>, BoxError>;
}

struct FnTransform<F>(F);

impl<F> RecordTransform for FnTransform<F>
where
    F: FnMut(&Record, &TransformContext<'_>) -> Result<Vec<Record>, BoxError>,
{
    fn transform(
        &mut self,
        record: &Record,
        ctx: &TransformContext<'_>,
    ) -> Result<Vec<Record>, BoxError> {
        (self.0)(record, ctx)
    }
}

/// What a callback can see besides the record itself.
pub struct TransformContext<'a> {
    registry: &'a SchemaRegistryClient,
    meta: &'a BatchMeta,
    position: usize,
}

impl<'a> TransformContext<'a> {
    pub fn registry(&self) -> &'a SchemaRegistryClient {
        self.registry
    }

    pub fn meta(&self) -> &'a BatchMeta {
        self.meta
    }

    /// Index of the record within its batch.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn offset(&self) -> i64 {
        self.meta.offset_of(self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Idle,
    Receiving,
    Processing,
    Emitting,
}

/// Result of running the callback for one input record.
#[derive(Debug)]
pub enum TransformOutcome {
    Emitted(Vec<Record>),
    Failed(TransformError),
}

impl TransformOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TransformOutcome::Failed(_))
    }
}

/// One failed record, as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub position: usize,
    pub offset: i64,
    pub kind: ErrorKind,
    /// Registry error code when a registry failure surfaced through the callback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<&'static str>,
    pub message: String,
}

/// Per-batch failure summary handed to the host next to the output batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub partition: i32,
    pub base_offset: i64,
    pub records: usize,
    pub failed: usize,
    pub failures: Vec<RecordFailure>,
}

impl FailureReport {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Encoded output for one host invocation.
#[derive(Debug)]
pub struct BatchOutput {
    pub batch: Vec<u8>,
    pub records_out: usize,
    pub report: Option<FailureReport>,
}

/// Owns the registered transform and drives one batch at a time.
pub struct TransformRuntime {
    config: TransformConfig,
    registry: SchemaRegistryClient,
    callback: Option<Box<dyn RecordTransform>>,
    state: RuntimeState,
    probe: TransformProbe,
}

impl TransformRuntime {
    pub fn new(config: TransformConfig, registry: SchemaRegistryClient) -> Self {
        Self {
            config,
            registry,
            callback: None,
            state: RuntimeState::Idle,
            probe: TransformProbe::default(),
        }
    }

    /// Register the transform. Only the first registration takes effect.
    pub fn register(&mut self, transform: Box<dyn RecordTransform>) -> Result<(), TransformError> {
        if self.callback.is_some() {
            warn!("rejecting second transform registration");
            return Err(TransformError::CallbackAlreadyRegistered);
        }
        self.callback = Some(transform);
        Ok(())
    }

    pub fn register_fn<F>(&mut self, f: F) -> Result<(), TransformError>
    where
        F: FnMut(&Record, &TransformContext<'_>) -> Result<Vec<Record>, BoxError> + 'static,
    {
        self.register(Box::new(FnTransform(f)))
    }

    pub fn is_registered(&self) -> bool {
        self.callback.is_some()
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistryClient {
        &self.registry
    }

    pub fn probe(&self) -> &TransformProbe {
        &self.probe
    }

    /// Full host cycle: decode, run every record, encode the survivors.
    ///
    /// Fails as a whole only for batch-level problems. Record-level
    /// failures are carried in [`BatchOutput::report`].
    pub fn on_batch(&mut self, raw: &[u8]) -> Result<BatchOutput, TransformError> {
        if self.callback.is_none() {
            return Err(TransformError::CallbackNotRegistered);
        }
        let result = self.run_batch(raw);
        self.state = RuntimeState::Idle;
        result
    }

    fn run_batch(&mut self, raw: &[u8]) -> Result<BatchOutput, TransformError> {
        self.state = RuntimeState::Receiving;
        let batch = match bridge::read_batch(raw) {
            Ok(batch) => batch,
            Err(e) => {
                self.probe.batch_rejected();
                error!(bytes = raw.len(), error = %e, "rejecting batch");
                return Err(e);
            }
        };
        self.probe.batch_received(batch.len());
        debug!(
            partition = batch.meta.partition,
            base_offset = batch.meta.base_offset,
            records = batch.len(),
            "batch received"
        );

        let outcomes = self.run_callbacks(&batch)?;

        self.state = RuntimeState::Emitting;
        emit(&batch, outcomes)
    }

    /// Run the callback over every record of `batch`, in order.
    ///
    /// One outcome per input record. A failing record never stops the loop.
    /// The runtime is back in [`RuntimeState::Idle`] when this returns.
    pub fn process(&mut self, batch: &RecordBatch) -> Result<Vec<TransformOutcome>, TransformError> {
        let outcomes = self.run_callbacks(batch);
        self.state = RuntimeState::Idle;
        outcomes
    }

    fn run_callbacks(&mut self, batch: &RecordBatch) -> Result<Vec<TransformOutcome>, TransformError> {
        let callback = self
            .callback
            .as_mut()
            .ok_or(TransformError::CallbackNotRegistered)?;
        self.state = RuntimeState::Processing;
        let limit = self.config.max_outputs_per_record;

        let mut outcomes = Vec::with_capacity(batch.len());
        for (position, record) in batch.records.iter().enumerate() {
            let ctx = TransformContext {
                registry: &self.registry,
                meta: &batch.meta,
                position,
            };
            let started = probe::start_sample();
            let outcome = match callback.transform(record, &ctx) {
                Ok(out) if out.len() > limit => {
                    TransformOutcome::Failed(TransformError::OutputLimitExceeded {
                        position,
                        emitted: out.len(),
                        limit,
                    })
                }
                Ok(out) => TransformOutcome::Emitted(out),
                Err(source) => TransformOutcome::Failed(TransformError::Callback { position, source }),
            };
            let elapsed = started.map(|t| t.elapsed());

            match &outcome {
                TransformOutcome::Emitted(out) => self.probe.record_done(out.len(), elapsed),
                TransformOutcome::Failed(e) => {
                    warn!(
                        offset = ctx.offset(),
                        kind = %e.kind(),
                        error = %e,
                        "record failed"
                    );
                    self.probe.record_failed(elapsed);
                }
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

/// Flatten successful outcomes in input order and summarise the failures.
fn emit(batch: &RecordBatch, outcomes: Vec<TransformOutcome>) -> Result<BatchOutput, TransformError> {
    let mut output = Vec::new();
    let mut failures = Vec::new();

    for (position, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            TransformOutcome::Emitted(records) => output.extend(records),
            TransformOutcome::Failed(e) => failures.push(RecordFailure {
                position,
                offset: batch.offset_of(position),
                kind: e.kind(),
                cause: e.registry_cause(),
                message: e.to_string(),
            }),
        }
    }

    let encoded = bridge::write_batch(&batch.meta, &output)?;
    let report = (!failures.is_empty()).then(|| FailureReport {
        partition: batch.meta.partition,
        base_offset: batch.meta.base_offset,
        records: batch.len(),
        failed: failures.len(),
        failures,
    });

    debug!(
        records_out = output.len(),
        failed = report.as_ref().map_or(0, |r| r.failed),
        "batch emitted"
    );
    Ok(BatchOutput {
        batch: encoded,
        records_out: output.len(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use transform_sr::InMemoryFetcher;

    use super::*;

    fn runtime() -> TransformRuntime {
        TransformRuntime::new(
            TransformConfig::default(),
            SchemaRegistryClient::new(Box::new(InMemoryFetcher::new())),
        )
    }

    fn batch(n: usize) -> RecordBatch {
        let records = (0..n)
            .map(|i| Record::builder().value(format!("r{i}")).build())
            .collect();
        RecordBatch::new(
            BatchMeta {
                base_offset: 10,
                partition: 0,
                base_timestamp: 0,
            },
            records,
        )
    }

    #[test]
    fn unregistered_runtime_refuses_batches() {
        let mut rt = runtime();
        let err = rt.on_batch(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CallbackNotRegistered);
        assert_eq!(rt.probe().malformed_batches, 0);
        assert!(matches!(
            rt.process(&batch(1)),
            Err(TransformError::CallbackNotRegistered)
        ));
    }

    #[test]
    fn callback_sees_position_and_offset() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut rt = runtime();
        rt.register_fn(move |_, ctx| {
            sink.borrow_mut().push((ctx.position(), ctx.offset()));
            Ok(vec![])
        })
        .unwrap();

        let outcomes = rt.process(&batch(3)).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(*seen.borrow(), [(0, 10), (1, 11), (2, 12)]);
    }

    #[test]
    fn process_leaves_runtime_idle() {
        let mut rt = runtime();
        rt.register_fn(|r, _| Ok(vec![r.clone()])).unwrap();

        let outcomes = rt.process(&batch(2)).unwrap();
        assert!(outcomes.iter().all(|o| !o.is_failed()));
        assert_eq!(rt.state(), RuntimeState::Idle);
    }

    #[test]
    fn failures_at_the_top_of_the_offset_range() {
        let mut rt = runtime();
        rt.register_fn(|_, ctx| Err(format!("bad record at {}", ctx.offset()).into()))
            .unwrap();

        let mut batch = batch(2);
        batch.meta.base_offset = i64::MAX;
        let outcomes = rt.process(&batch).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(TransformOutcome::is_failed));
        assert_eq!(batch.offset_of(1), i64::MAX);
    }

    #[test]
    fn state_returns_to_idle_after_rejected_batch() {
        let mut rt = runtime();
        rt.register_fn(|r, _| Ok(vec![r.clone()])).unwrap();
        assert!(rt.on_batch(&[0u8; 3]).is_err());
        assert_eq!(rt.state(), RuntimeState::Idle);
        assert_eq!(rt.probe().malformed_batches, 1);
        assert_eq!(rt.probe().batches, 0);
    }

    #[test]
    fn report_serializes_with_stable_codes() {
        let report = FailureReport {
            partition: 2,
            base_offset: 100,
            records: 3,
            failed: 1,
            failures: vec![RecordFailure {
                position: 1,
                offset: 101,
                kind: ErrorKind::CallbackError,
                cause: Some("SCHEMA_NOT_FOUND"),
                message: "record 1: schema 9 not found".into(),
            }],
        };
        let json: serde_json::Value = serde_json::from_slice(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["failures"][0]["kind"], "CALLBACK_ERROR");
        assert_eq!(json["failures"][0]["cause"], "SCHEMA_NOT_FOUND");
        assert_eq!(json["failed"], 1);
    }
}
