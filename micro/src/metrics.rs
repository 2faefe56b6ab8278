//! Thread-safe metrics registry with Prometheus text exposition.
//!
//! Metrics are registered by `(name, labels)` and the returned handles stay
//! valid for the life of the registry; entries are never removed. Counters
//! are relaxed atomics, gauges and histograms serialize observations behind
//! their own lock, and the registry itself takes a single lock for
//! registration and for walking the exposition.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Label set for a metric, kept sorted by key so the composite registry key
/// and the exposition text are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricLabels {
    kv: BTreeMap<String, String>,
}

impl MetricLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(pairs: &[(&str, &str)]) -> Self {
        let mut labels = Self::default();
        for (k, v) in pairs {
            labels.insert(k, v);
        }
        labels
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.kv.insert(key.to_string(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.kv.is_empty()
    }

    /// Render as `{k="v",...}` with `\`, `"` and newlines escaped.
    fn to_prometheus_text(&self) -> String {
        if self.kv.is_empty() {
            return String::new();
        }
        let mut out = String::from("{");
        let mut first = true;
        for (k, v) in &self.kv {
            if !first {
                out.push(',');
            }
            first = false;
            out.push_str(k);
            out.push_str("=\"");
            for c in v.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    '\n' => out.push_str("\\n"),
                    _ => out.push(c),
                }
            }
            out.push('"');
        }
        out.push('}');
        out
    }
}

/// Monotonically non-decreasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
}

impl Counter {
    pub fn inc(&self, v: i64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Last-write-wins floating point gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: Mutex<f64>,
}

impl Gauge {
    pub fn set(&self, v: f64) {
        *self.value.lock() = v;
    }

    pub fn value(&self) -> f64 {
        *self.value.lock()
    }
}

#[derive(Debug)]
struct HistogramState {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

/// Histogram with fixed upper bucket bounds.
///
/// Bounds are upper-inclusive; an observation above every bound contributes
/// only to `_sum`, `_count` and the implicit `+Inf` bucket.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<f64>,
    state: Mutex<HistogramState>,
}

impl Histogram {
    fn new(mut buckets: Vec<f64>) -> Self {
        buckets.sort_by(f64::total_cmp);
        let len = buckets.len();
        Self {
            buckets,
            state: Mutex::new(HistogramState {
                bucket_counts: vec![0; len],
                sum: 0.0,
                count: 0,
            }),
        }
    }

    pub fn observe(&self, v: f64) {
        let mut st = self.state.lock();
        st.sum += v;
        st.count += 1;
        if let Some(idx) = self.buckets.iter().position(|&b| v <= b) {
            st.bucket_counts[idx] += 1;
        }
    }

    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    /// Per-bucket counts (non-cumulative), running sum and total count.
    pub fn snapshot(&self) -> (Vec<u64>, f64, u64) {
        let st = self.state.lock();
        (st.bucket_counts.clone(), st.sum, st.count)
    }
}

struct Entry<M> {
    name: String,
    help: String,
    labels: MetricLabels,
    metric: Arc<M>,
}

#[derive(Default)]
struct RegistryState {
    counters: HashMap<String, Entry<Counter>>,
    gauges: HashMap<String, Entry<Gauge>>,
    histograms: HashMap<String, Entry<Histogram>>,
}

/// Registry of named, labeled metrics.
#[derive(Default)]
pub struct MetricsRegistry {
    state: Mutex<RegistryState>,
}

fn composite_key(name: &str, labels: &MetricLabels) -> String {
    let mut key = String::with_capacity(name.len() + 1);
    key.push_str(name);
    key.push('\n');
    for (k, v) in &labels.kv {
        key.push_str(k);
        key.push('=');
        key.push_str(v);
        key.push('\n');
    }
    key
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the counter registered under `(name, labels)`.
    pub fn counter(&self, name: &str, help: &str, labels: MetricLabels) -> Arc<Counter> {
        let mut st = self.state.lock();
        let key = composite_key(name, &labels);
        let entry = st.counters.entry(key).or_insert_with(|| Entry {
            name: name.to_string(),
            help: help.to_string(),
            labels,
            metric: Arc::new(Counter::default()),
        });
        Arc::clone(&entry.metric)
    }

    /// Look up or create the gauge registered under `(name, labels)`.
    pub fn gauge(&self, name: &str, help: &str, labels: MetricLabels) -> Arc<Gauge> {
        let mut st = self.state.lock();
        let key = composite_key(name, &labels);
        let entry = st.gauges.entry(key).or_insert_with(|| Entry {
            name: name.to_string(),
            help: help.to_string(),
            labels,
            metric: Arc::new(Gauge::default()),
        });
        Arc::clone(&entry.metric)
    }

    /// Look up or create the histogram registered under `(name, labels)`.
    /// `buckets` only applies on first registration.
    pub fn histogram(
        &self,
        name: &str,
        help: &str,
        buckets: Vec<f64>,
        labels: MetricLabels,
    ) -> Arc<Histogram> {
        let mut st = self.state.lock();
        let key = composite_key(name, &labels);
        let entry = st.histograms.entry(key).or_insert_with(|| Entry {
            name: name.to_string(),
            help: help.to_string(),
            labels,
            metric: Arc::new(Histogram::new(buckets)),
        });
        Arc::clone(&entry.metric)
    }

    /// Render the whole registry in Prometheus text exposition format.
    ///
    /// The relative order of distinct metrics is unspecified; within one
    /// histogram, bucket samples are ascending with `+Inf` last, followed by
    /// `_sum` and `_count`.
    pub fn to_prometheus_text(&self) -> String {
        let st = self.state.lock();
        let mut out = String::with_capacity(4096);

        for entry in st.counters.values() {
            out.push_str(&format!("# HELP {} {}\n", entry.name, entry.help));
            out.push_str(&format!("# TYPE {} counter\n", entry.name));
            out.push_str(&format!(
                "{}{} {}\n",
                entry.name,
                entry.labels.to_prometheus_text(),
                entry.metric.value()
            ));
        }

        for entry in st.gauges.values() {
            out.push_str(&format!("# HELP {} {}\n", entry.name, entry.help));
            out.push_str(&format!("# TYPE {} gauge\n", entry.name));
            out.push_str(&format!(
                "{}{} {}\n",
                entry.name,
                entry.labels.to_prometheus_text(),
                entry.metric.value()
            ));
        }

        for entry in st.histograms.values() {
            let (bucket_counts, sum, count) = entry.metric.snapshot();
            let buckets = entry.metric.buckets();

            out.push_str(&format!("# HELP {} {}\n", entry.name, entry.help));
            out.push_str(&format!("# TYPE {} histogram\n", entry.name));

            let mut cumulative = 0u64;
            for (bound, bucket_count) in buckets.iter().zip(&bucket_counts) {
                cumulative += bucket_count;
                let mut labels = entry.labels.clone();
                labels.insert("le", &bound.to_string());
                out.push_str(&format!(
                    "{}_bucket{} {}\n",
                    entry.name,
                    labels.to_prometheus_text(),
                    cumulative
                ));
            }
            {
                let mut labels = entry.labels.clone();
                labels.insert("le", "+Inf");
                out.push_str(&format!(
                    "{}_bucket{} {}\n",
                    entry.name,
                    labels.to_prometheus_text(),
                    count
                ));
            }
            out.push_str(&format!(
                "{}_sum{} {}\n",
                entry.name,
                entry.labels.to_prometheus_text(),
                sum
            ));
            out.push_str(&format!(
                "{}_count{} {}\n",
                entry.name,
                entry.labels.to_prometheus_text(),
                count
            ));
        }

        out
    }
}

static DEFAULT_REGISTRY: Lazy<MetricsRegistry> = Lazy::new(MetricsRegistry::new);

/// Process-wide default registry.
pub fn default_registry() -> &'static MetricsRegistry {
    &DEFAULT_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_and_labels_share_the_metric() {
        let registry = MetricsRegistry::new();
        let labels = MetricLabels::with(&[("path", "/hello")]);

        let a = registry.counter("requests_total", "Requests", labels.clone());
        let b = registry.counter("requests_total", "Requests", labels);
        a.inc(2);
        b.inc(3);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.value(), 5);
    }

    #[test]
    fn different_labels_are_distinct_metrics() {
        let registry = MetricsRegistry::new();
        let a = registry.counter(
            "requests_total",
            "Requests",
            MetricLabels::with(&[("path", "/a")]),
        );
        let b = registry.counter(
            "requests_total",
            "Requests",
            MetricLabels::with(&[("path", "/b")]),
        );
        a.inc(1);
        assert_eq!(b.value(), 0);
    }

    #[test]
    fn gauge_is_last_write_wins() {
        let registry = MetricsRegistry::new();
        let g = registry.gauge("queue_depth", "Depth", MetricLabels::new());
        g.set(4.0);
        g.set(2.5);
        assert_eq!(g.value(), 2.5);
    }

    #[test]
    fn histogram_buckets_are_upper_inclusive() {
        let h = Histogram::new(vec![1.0, 5.0, 10.0]);
        h.observe(1.0); // lands in le=1
        h.observe(3.0); // lands in le=5
        h.observe(100.0); // above all bounds

        let (counts, sum, count) = h.snapshot();
        assert_eq!(counts, vec![1, 1, 0]);
        assert_eq!(sum, 104.0);
        assert_eq!(count, 3);
    }

    #[test]
    fn counter_exposition_line() {
        let registry = MetricsRegistry::new();
        let c = registry.counter(
            "http_server_requests_total",
            "HTTP server requests total",
            MetricLabels::with(&[("path", "/hello"), ("status", "200")]),
        );
        c.inc(2);

        let text = registry.to_prometheus_text();
        assert!(text.contains("# TYPE http_server_requests_total counter\n"));
        assert!(text.contains("http_server_requests_total{path=\"/hello\",status=\"200\"} 2\n"));
    }

    #[test]
    fn histogram_exposition_is_cumulative_and_ordered() {
        let registry = MetricsRegistry::new();
        let h = registry.histogram(
            "latency_ms",
            "Latency",
            vec![1.0, 5.0, 10.0],
            MetricLabels::new(),
        );
        h.observe(0.5);
        h.observe(4.0);
        h.observe(4.5);
        h.observe(50.0);

        let text = registry.to_prometheus_text();
        let lines: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("latency_ms"))
            .collect();
        assert_eq!(
            lines,
            vec![
                "latency_ms_bucket{le=\"1\"} 1",
                "latency_ms_bucket{le=\"5\"} 3",
                "latency_ms_bucket{le=\"10\"} 3",
                "latency_ms_bucket{le=\"+Inf\"} 4",
                "latency_ms_sum 59",
                "latency_ms_count 4",
            ]
        );
    }

    #[test]
    fn label_values_are_escaped() {
        let mut labels = MetricLabels::new();
        labels.insert("path", "a\"b\\c\nd");
        assert_eq!(labels.to_prometheus_text(), "{path=\"a\\\"b\\\\c\\nd\"}");
    }
}
