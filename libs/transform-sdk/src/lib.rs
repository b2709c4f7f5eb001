//! Guest-side SDK for record transforms running inside the broker's WASM
//! sandbox.
//!
//! The host delivers one encoded batch per call. The runtime decodes it,
//! runs the registered transform once per record with per-record failure
//! isolation, and hands the combined output batch back.

pub mod abi;
pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod record;
pub mod runtime;

pub use transform_sr as sr;

pub use abi::{HostSink, TRANSFORM_ABI_VERSION};
pub use config::TransformConfig;
pub use error::{BoxError, ErrorKind, TransformError};
pub use record::{BatchMeta, Record, RecordBatch, RecordBuilder, RecordHeader};
pub use probe::TransformProbe;
pub use runtime::{
    BatchOutput, FailureReport, RecordFailure, RecordTransform, RuntimeState, TransformContext,
    TransformOutcome, TransformRuntime,
};
