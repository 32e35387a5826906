//! Optional metrics sink
//!
//! The node reports a handful of counters, gauges and timings through this
//! trait. Every holder keeps an `Option<Arc<dyn MetricsSink>>`; `None` means
//! nothing is recorded.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Counter of accepted connections
pub const CONN_ACCEPTED: &str = "conn_accepted";
/// Counter of rejected connections
pub const CONN_REJECTED: &str = "conn_rejected";
/// Gauge of trust graph node count
pub const GRAPH_NODES: &str = "graph_nodes";
/// Timing histogram name for connection-gate work
pub const LATENCY: &str = "latency";

/// Metrics backend
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &str, label: &str);
    fn set_gauge(&self, name: &str, value: f64);
    /// Observe a duration in seconds for `part` of `name`
    fn observe(&self, name: &str, part: &str, seconds: f64);
}

pub type SharedMetrics = Option<Arc<dyn MetricsSink>>;

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr_counter(&self, _name: &str, _label: &str) {}
    fn set_gauge(&self, _name: &str, _value: f64) {}
    fn observe(&self, _name: &str, _part: &str, _seconds: f64) {}
}

/// Increment a counter if a sink is configured
pub fn incr(metrics: &SharedMetrics, name: &str, label: &str) {
    if let Some(m) = metrics {
        m.incr_counter(name, label);
    }
}

/// Set a gauge if a sink is configured
pub fn gauge(metrics: &SharedMetrics, name: &str, value: f64) {
    if let Some(m) = metrics {
        m.set_gauge(name, value);
    }
}

/// Records the elapsed time for `part` when dropped
pub struct Timer<'a> {
    metrics: &'a SharedMetrics,
    part: &'static str,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn start(metrics: &'a SharedMetrics, part: &'static str) -> Self {
        Self {
            metrics,
            part,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        if let Some(m) = self.metrics {
            m.observe(LATENCY, self.part, self.start.elapsed().as_secs_f64());
        }
    }
}

/// In-memory sink, handy for inspection in tests and status output
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
    gauges: Mutex<HashMap<String, f64>>,
    observations: Mutex<HashMap<String, Vec<f64>>>,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str, label: &str) -> u64 {
        self.counters
            .lock()
            .get(&format!("{name}/{label}"))
            .copied()
            .unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.lock().get(name).copied()
    }

    pub fn observations(&self, name: &str, part: &str) -> usize {
        self.observations
            .lock()
            .get(&format!("{name}/{part}"))
            .map_or(0, Vec::len)
    }
}

impl MetricsSink for MemoryMetrics {
    fn incr_counter(&self, name: &str, label: &str) {
        *self
            .counters
            .lock()
            .entry(format!("{name}/{label}"))
            .or_insert(0) += 1;
    }

    fn set_gauge(&self, name: &str, value: f64) {
        self.gauges.lock().insert(name.to_string(), value);
    }

    fn observe(&self, name: &str, part: &str, seconds: f64) {
        self.observations
            .lock()
            .entry(format!("{name}/{part}"))
            .or_default()
            .push(seconds);
    }
}
