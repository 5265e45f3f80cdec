//! Lightweight in-memory metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct QueryMetrics {
    total: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    timeouts: AtomicU64,
    connects_ok: AtomicU64,
    connects_failed: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

static QUERY_METRICS: OnceLock<QueryMetrics> = OnceLock::new();

fn metrics() -> &'static QueryMetrics {
    QUERY_METRICS.get_or_init(QueryMetrics::default)
}

pub fn record_query(duration_ms: f64, success: bool) {
    let duration_ms = duration_ms.max(0.0) as u64;
    let metrics = metrics();
    metrics.total.fetch_add(1, Ordering::Relaxed);
    if !success {
        metrics.failed.fetch_add(1, Ordering::Relaxed);
    }
    metrics
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);
    metrics
        .duration_max_ms
        .fetch_max(duration_ms, Ordering::Relaxed);
}

pub fn record_cancel() {
    metrics().cancelled.fetch_add(1, Ordering::Relaxed);
}

/// Pool acquire timed out.
pub fn record_timeout() {
    metrics().timeouts.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connect(success: bool) {
    let metrics = metrics();
    if success {
        metrics.connects_ok.fetch_add(1, Ordering::Relaxed);
    } else {
        metrics.connects_failed.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetricsSnapshot {
    pub total: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub timeouts: u64,
    pub connects_ok: u64,
    pub connects_failed: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
}

pub fn snapshot() -> QueryMetricsSnapshot {
    let metrics = metrics();
    let total = metrics.total.load(Ordering::Relaxed);
    let duration_total = metrics.duration_total_ms.load(Ordering::Relaxed);
    let max_ms = metrics.duration_max_ms.load(Ordering::Relaxed);

    let avg_ms = if total > 0 {
        Some(duration_total as f64 / total as f64)
    } else {
        None
    };

    QueryMetricsSnapshot {
        total,
        failed: metrics.failed.load(Ordering::Relaxed),
        cancelled: metrics.cancelled.load(Ordering::Relaxed),
        timeouts: metrics.timeouts.load(Ordering::Relaxed),
        connects_ok: metrics.connects_ok.load(Ordering::Relaxed),
        connects_failed: metrics.connects_failed.load(Ordering::Relaxed),
        avg_ms,
        max_ms: if max_ms > 0 { Some(max_ms) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_flow() {
        // Counters are process-global and other tests record too, so compare
        // with lower bounds rather than exact deltas.
        let initial = snapshot();

        record_query(100.0, true);
        record_query(50.0, false);
        let s1 = snapshot();
        assert!(s1.total >= initial.total + 2);
        assert!(s1.failed > initial.failed);

        record_cancel();
        record_timeout();
        record_connect(true);
        record_connect(false);
        let s2 = snapshot();
        assert!(s2.cancelled > initial.cancelled);
        assert!(s2.timeouts > initial.timeouts);
        assert!(s2.connects_ok > initial.connects_ok);
        assert!(s2.connects_failed > initial.connects_failed);

        record_query(99999.0, true);
        let s3 = snapshot();
        assert!(s3.max_ms.unwrap() >= 99999);
        assert!(s3.avg_ms.is_some());
    }
}
