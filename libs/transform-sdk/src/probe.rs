use std::time::{Duration, Instant};

/// Per-instance counters, updated by the runtime as batches flow through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformProbe {
    pub batches: u64,
    pub malformed_batches: u64,
    pub records_in: u64,
    pub records_out: u64,
    pub record_errors: u64,
    pub latency: LatencyStats,
}

/// Callback latency, one sample per input record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl LatencyStats {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
    }

    pub fn mean(&self) -> Option<Duration> {
        let count = u32::try_from(self.count).ok()?;
        self.total.checked_div(count)
    }
}

/// Start a latency sample.
///
/// `wasm32-unknown-unknown` has no clock and `Instant::now` panics there,
/// so no sample is taken on that target.
pub(crate) fn start_sample() -> Option<Instant> {
    if cfg!(all(target_arch = "wasm32", target_os = "unknown")) {
        None
    } else {
        Some(Instant::now())
    }
}

impl TransformProbe {
    pub(crate) fn batch_received(&mut self, records: usize) {
        self.batches += 1;
        self.records_in += records as u64;
    }

    pub(crate) fn batch_rejected(&mut self) {
        self.malformed_batches += 1;
    }

    pub(crate) fn record_done(&mut self, emitted: usize, elapsed: Option<Duration>) {
        self.records_out += emitted as u64;
        if let Some(elapsed) = elapsed {
            self.latency.record(elapsed);
        }
    }

    pub(crate) fn record_failed(&mut self, elapsed: Option<Duration>) {
        self.record_errors += 1;
        if let Some(elapsed) = elapsed {
            self.latency.record(elapsed);
        }
    }
}
