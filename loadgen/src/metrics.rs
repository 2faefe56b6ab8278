//! Lock-free latency accounting shared by all workers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Latency histogram with log2(microsecond) buckets.
pub struct LatencyHistogram {
    ok: AtomicU64,
    err: AtomicU64,
    bytes: AtomicU64,
    buckets: [AtomicU64; Self::BUCKETS],
}

/// Point-in-time copy of the histogram.
pub struct Snapshot {
    pub ok: u64,
    pub err: u64,
    pub bytes: u64,
    pub buckets: Vec<u64>,
}

impl LatencyHistogram {
    pub const BUCKETS: usize = 64;

    pub fn new() -> Self {
        Self {
            ok: AtomicU64::new(0),
            err: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Zero everything; used at the warmup/measure boundary.
    pub fn reset(&self) {
        self.ok.store(0, Ordering::Relaxed);
        self.err.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
        for b in &self.buckets {
            b.store(0, Ordering::Relaxed);
        }
    }

    pub fn record_ok(&self, latency_us: u64, bytes_in: u64) {
        self.ok.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes_in, Ordering::Relaxed);

        let idx = (63 - (latency_us + 1).leading_zeros() as usize).min(Self::BUCKETS - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_err(&self) {
        self.err.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            ok: self.ok.load(Ordering::Relaxed),
            err: self.err.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            buckets: self
                .buckets
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

impl Snapshot {
    /// Approximate percentile as the upper bound (2^i microseconds) of the
    /// bucket holding the requested rank.
    pub fn approx_percentile_us(&self, p: f64) -> u64 {
        if self.ok == 0 {
            return 0;
        }
        let rank = ((self.ok - 1) as f64 * p) as u64;
        let mut cumulative = 0u64;
        for (i, count) in self.buckets.iter().enumerate() {
            cumulative += count;
            if cumulative > rank {
                return 1u64 << i.min(62);
            }
        }
        1u64 << (LatencyHistogram::BUCKETS - 1).min(62)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_into_log2_buckets() {
        let hist = LatencyHistogram::new();
        hist.record_ok(0, 10); // bucket 0
        hist.record_ok(3, 10); // log2(4) = 2
        hist.record_ok(1000, 10); // log2(1001) ~ 9

        let snap = hist.snapshot();
        assert_eq!(snap.ok, 3);
        assert_eq!(snap.bytes, 30);
        assert_eq!(snap.buckets[0], 1);
        assert_eq!(snap.buckets[2], 1);
        assert_eq!(snap.buckets[9], 1);
    }

    #[test]
    fn percentiles_are_bucket_upper_bounds() {
        let hist = LatencyHistogram::new();
        for _ in 0..90 {
            hist.record_ok(100, 0); // bucket 6 (64..127)
        }
        for _ in 0..10 {
            hist.record_ok(60_000, 0); // bucket 15
        }

        let snap = hist.snapshot();
        assert_eq!(snap.approx_percentile_us(0.50), 1 << 6);
        assert_eq!(snap.approx_percentile_us(0.99), 1 << 15);
    }

    #[test]
    fn reset_zeroes_counters() {
        let hist = LatencyHistogram::new();
        hist.record_ok(5, 5);
        hist.record_err();
        hist.reset();

        let snap = hist.snapshot();
        assert_eq!(snap.ok, 0);
        assert_eq!(snap.err, 0);
        assert_eq!(snap.bytes, 0);
        assert!(snap.buckets.iter().all(|&b| b == 0));
    }
}
