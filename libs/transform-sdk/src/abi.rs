//! Guest/host boundary.
//!
//! Guest exports, generated by [`export_transform!`](crate::export_transform):
//!
//! | export | signature | |
//! |---|---|---|
//! | `transform_abi_version` | `() -> u32` | [`TRANSFORM_ABI_VERSION`] |
//! | `transform_alloc` | `(len) -> ptr` | buffer the host writes a batch into |
//! | `transform_dealloc` | `(ptr, len)` | release a `transform_alloc` buffer |
//! | `transform_init` | `() -> i32` | build the runtime, register the transform |
//! | `transform_on_batch` | `(ptr, len) -> i32` | process one encoded batch |
//!
//! Host imports (module `transform_host`): `emit_batch(ptr, len) -> i32`
//! and `report_failures(ptr, len) -> i32`, the latter carrying a JSON
//! [`FailureReport`](crate::FailureReport).
//!
//! Every `i32` status is `0` on success or a negative
//! [`ErrorKind::status_code`](crate::ErrorKind::status_code).

use tracing::{error, warn};

use crate::runtime::TransformRuntime;

/// Current ABI version. The host checks this against `transform_abi_version()`.
pub const TRANSFORM_ABI_VERSION: u32 = 1;

pub const STATUS_OK: i32 = 0;

/// Output side of the host interface.
pub trait HostSink {
    fn emit_batch(&mut self, batch: &[u8]) -> i32;
    fn report_failures(&mut self, report: &[u8]) -> i32;
}

/// Run one batch through `runtime` and hand the results to `sink`.
///
/// A host status other than [`STATUS_OK`] from `emit_batch` is passed
/// back unchanged.
pub fn dispatch(runtime: &mut TransformRuntime, input: &[u8], sink: &mut dyn HostSink) -> i32 {
    let output = match runtime.on_batch(input) {
        Ok(output) => output,
        Err(e) => return e.kind().status_code(),
    };

    let rc = sink.emit_batch(&output.batch);
    if rc != STATUS_OK {
        error!(status = rc, "host rejected output batch");
        return rc;
    }

    if let Some(report) = &output.report {
        match report.to_json() {
            Ok(json) => {
                let rc = sink.report_failures(&json);
                if rc != STATUS_OK {
                    warn!(status = rc, failed = report.failed, "host rejected failure report");
                }
            }
            Err(e) => error!(error = %e, "failed to serialize failure report"),
        }
    }

    STATUS_OK
}

/// Allocate `len` bytes for the host to write into.
pub fn alloc(len: usize) -> *mut u8 {
    Box::into_raw(vec![0u8; len].into_boxed_slice()) as *mut u8
}

/// Release a buffer obtained from [`alloc`].
///
/// # Safety
///
/// `ptr` must come from `alloc(len)` with the same `len` and must not be
/// used afterwards.
pub unsafe fn dealloc(ptr: *mut u8, len: usize) {
    if !ptr.is_null() {
        let _ = unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) };
    }
}

// ---------------------------------------------------------------------------
// WASM guest glue
// ---------------------------------------------------------------------------

#[cfg(target_arch = "wasm32")]
mod host_abi {
    #[link(wasm_import_module = "transform_host")]
    unsafe extern "C" {
        pub fn emit_batch(ptr: *const u8, len: usize) -> i32;
        pub fn report_failures(ptr: *const u8, len: usize) -> i32;
    }
}

/// [`HostSink`] backed by the `transform_host` imports.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HostImports;

#[cfg(target_arch = "wasm32")]
impl HostSink for HostImports {
    fn emit_batch(&mut self, batch: &[u8]) -> i32 {
        unsafe { host_abi::emit_batch(batch.as_ptr(), batch.len()) }
    }

    fn report_failures(&mut self, report: &[u8]) -> i32 {
        unsafe { host_abi::report_failures(report.as_ptr(), report.len()) }
    }
}

/// Instance-lifetime runtime slot used by the generated exports.
#[cfg(target_arch = "wasm32")]
pub mod guest {
    use std::cell::RefCell;

    use tracing::{error, info};
    use transform_sr::{HostSchemaFetcher, SchemaRegistryClient};

    use super::{HostImports, STATUS_OK, dispatch};
    use crate::config::TransformConfig;
    use crate::error::TransformError;
    use crate::logging;
    use crate::runtime::TransformRuntime;

    thread_local! {
        static RUNTIME: RefCell<Option<TransformRuntime>> = const { RefCell::new(None) };
    }

    fn build<F>(setup: F) -> Result<TransformRuntime, TransformError>
    where
        F: FnOnce(&mut TransformRuntime) -> Result<(), TransformError>,
    {
        let config = TransformConfig::from_env()?;
        let registry = SchemaRegistryClient::new(Box::new(HostSchemaFetcher));
        let mut runtime = TransformRuntime::new(config, registry);
        setup(&mut runtime)?;
        if !runtime.is_registered() {
            return Err(TransformError::CallbackNotRegistered);
        }
        Ok(runtime)
    }

    pub fn init<F>(setup: F) -> i32
    where
        F: FnOnce(&mut TransformRuntime) -> Result<(), TransformError>,
    {
        logging::init();
        RUNTIME.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                error!("transform_init called twice");
                return TransformError::CallbackAlreadyRegistered.kind().status_code();
            }
            match build(setup) {
                Ok(runtime) => {
                    info!(
                        abi = super::TRANSFORM_ABI_VERSION,
                        max_outputs_per_record = runtime.config().max_outputs_per_record,
                        "transform initialised"
                    );
                    *slot = Some(runtime);
                    STATUS_OK
                }
                Err(e) => {
                    error!(error = %e, "transform init failed");
                    e.kind().status_code()
                }
            }
        })
    }

    /// # Safety
    ///
    /// `ptr..ptr + len` must be readable guest memory for the whole call.
    pub unsafe fn on_batch(ptr: *const u8, len: usize) -> i32 {
        let input: &[u8] = if len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(ptr, len) }
        };
        RUNTIME.with(|slot| match slot.borrow_mut().as_mut() {
            Some(runtime) => dispatch(runtime, input, &mut HostImports),
            None => TransformError::CallbackNotRegistered.kind().status_code(),
        })
    }
}

/// Export the guest ABI for a transform module.
///
/// `$setup` is called once from `transform_init` with the fresh runtime
/// and must register the transform:
///
/// ```ignore
/// fn setup(rt: &mut TransformRuntime) -> Result<(), TransformError> {
///     rt.register(Box::new(MyTransform))
/// }
/// transform_sdk::export_transform!(setup);
/// ```
///
/// Expands to nothing outside `wasm32`, so the same crate can be unit
/// tested natively.
#[macro_export]
macro_rules! export_transform {
    ($setup:expr) => {
        #[cfg(target_arch = "wasm32")]
        #[unsafe(no_mangle)]
        pub extern "C" fn transform_abi_version() -> u32 {
            $crate::abi::TRANSFORM_ABI_VERSION
        }

        #[cfg(target_arch = "wasm32")]
        #[unsafe(no_mangle)]
        pub extern "C" fn transform_alloc(len: usize) -> *mut u8 {
            $crate::abi::alloc(len)
        }

        #[cfg(target_arch = "wasm32")]
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn transform_dealloc(ptr: *mut u8, len: usize) {
            unsafe { $crate::abi::dealloc(ptr, len) }
        }

        #[cfg(target_arch = "wasm32")]
        #[unsafe(no_mangle)]
        pub extern "C" fn transform_init() -> i32 {
            $crate::abi::guest::init($setup)
        }

        #[cfg(target_arch = "wasm32")]
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn transform_on_batch(ptr: *const u8, len: usize) -> i32 {
            unsafe { $crate::abi::guest::on_batch(ptr, len) }
        }
    };
}

#[cfg(test)]
mod tests {
    use transform_sr::{InMemoryFetcher, SchemaRegistryClient};

    use super::*;
    use crate::bridge;
    use crate::config::TransformConfig;
    use crate::error::ErrorKind;
    use crate::record::{BatchMeta, Record};

    #[derive(Default)]
    struct RecordingSink {
        batches: Vec<Vec<u8>>,
        reports: Vec<Vec<u8>>,
        emit_status: i32,
    }

    impl HostSink for RecordingSink {
        fn emit_batch(&mut self, batch: &[u8]) -> i32 {
            self.batches.push(batch.to_vec());
            self.emit_status
        }

        fn report_failures(&mut self, report: &[u8]) -> i32 {
            self.reports.push(report.to_vec());
            STATUS_OK
        }
    }

    fn runtime() -> TransformRuntime {
        let mut rt = TransformRuntime::new(
            TransformConfig::default(),
            SchemaRegistryClient::new(Box::new(InMemoryFetcher::new())),
        );
        rt.register_fn(|record, _| {
            if record.value().is_none() {
                return Err("value required".into());
            }
            Ok(vec![record.clone()])
        })
        .unwrap();
        rt
    }

    fn input(records: &[Record]) -> Vec<u8> {
        bridge::write_batch(&BatchMeta::default(), records).unwrap()
    }

    #[test]
    fn clean_batch_emits_without_report() {
        let mut sink = RecordingSink::default();
        let records = [Record::builder().value("a").build()];

        assert_eq!(dispatch(&mut runtime(), &input(&records), &mut sink), STATUS_OK);
        assert_eq!(sink.batches.len(), 1);
        assert!(sink.reports.is_empty());
        assert_eq!(bridge::read_batch(&sink.batches[0]).unwrap().records, records);
    }

    #[test]
    fn failed_record_is_reported_after_emit() {
        let mut sink = RecordingSink::default();
        let records = [Record::builder().value("a").build(), Record::default()];

        assert_eq!(dispatch(&mut runtime(), &input(&records), &mut sink), STATUS_OK);
        assert_eq!(bridge::read_batch(&sink.batches[0]).unwrap().len(), 1);

        let report: serde_json::Value = serde_json::from_slice(&sink.reports[0]).unwrap();
        assert_eq!(report["failed"], 1);
        assert_eq!(report["failures"][0]["position"], 1);
        assert_eq!(report["failures"][0]["kind"], "CALLBACK_ERROR");
    }

    #[test]
    fn malformed_batch_reaches_host_as_status() {
        let mut sink = RecordingSink::default();
        let rc = dispatch(&mut runtime(), &[1, 2, 3], &mut sink);
        assert_eq!(rc, ErrorKind::MalformedBatch.status_code());
        assert!(sink.batches.is_empty());
    }

    #[test]
    fn host_emit_failure_is_passed_through() {
        let mut sink = RecordingSink {
            emit_status: -42,
            ..Default::default()
        };
        let records = [Record::default()];
        assert_eq!(dispatch(&mut runtime(), &input(&records), &mut sink), -42);
        assert!(sink.reports.is_empty());
    }

    #[test]
    fn alloc_dealloc() {
        for len in [0, 1, 4096] {
            let ptr = alloc(len);
            assert!(!ptr.is_null());
            unsafe { dealloc(ptr, len) };
        }
    }
}
