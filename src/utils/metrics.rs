use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::types::ProcessStatus;

/// Pipeline stages timed by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detection,
    Translation,
    Erasure,
    Rendering,
}

/// Process-wide metrics collector.
///
/// Cheap to clone; every clone feeds the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Stage durations
    detection_ms: RwLock<Vec<u64>>,
    translation_ms: RwLock<Vec<u64>>,
    erasure_ms: RwLock<Vec<u64>>,
    rendering_ms: RwLock<Vec<u64>>,

    // Image outcomes
    images_success: AtomicUsize,
    images_degraded: AtomicUsize,
    images_failed: AtomicUsize,
    batches_processed: AtomicUsize,

    // Outcome reasons ("Degraded(NoTextDetected)" -> count)
    status_counters: DashMap<String, AtomicUsize>,

    // Translation
    entries_translated: AtomicUsize,
    entries_fallen_back: AtomicUsize,
    translation_batches_failed: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_size: AtomicUsize,
    circuit_breaker_trips: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                detection_ms: RwLock::new(Vec::new()),
                translation_ms: RwLock::new(Vec::new()),
                erasure_ms: RwLock::new(Vec::new()),
                rendering_ms: RwLock::new(Vec::new()),
                images_success: AtomicUsize::new(0),
                images_degraded: AtomicUsize::new(0),
                images_failed: AtomicUsize::new(0),
                batches_processed: AtomicUsize::new(0),
                status_counters: DashMap::new(),
                entries_translated: AtomicUsize::new(0),
                entries_fallen_back: AtomicUsize::new(0),
                translation_batches_failed: AtomicUsize::new(0),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                cache_size: AtomicUsize::new(0),
                circuit_breaker_trips: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_stage(&self, stage: Stage, duration: Duration) {
        let slot = match stage {
            Stage::Detection => &self.inner.detection_ms,
            Stage::Translation => &self.inner.translation_ms,
            Stage::Erasure => &self.inner.erasure_ms,
            Stage::Rendering => &self.inner.rendering_ms,
        };
        slot.write().push(duration.as_millis() as u64);
    }

    pub fn record_image(&self, status: &ProcessStatus) {
        let counter = match status {
            ProcessStatus::Success => &self.inner.images_success,
            ProcessStatus::Degraded(_) => &self.inner.images_degraded,
            ProcessStatus::Failed(_) => &self.inner.images_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.inner
            .status_counters
            .entry(status.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_processed(&self) {
        self.inner.batches_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_translations(&self, translated: usize, fallen_back: usize) {
        self.inner
            .entries_translated
            .fetch_add(translated, Ordering::Relaxed);
        self.inner
            .entries_fallen_back
            .fetch_add(fallen_back, Ordering::Relaxed);
    }

    pub fn record_translation_batch_failure(&self) {
        self.inner
            .translation_batches_failed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_cache_size(&self, size: usize) {
        self.inner.cache_size.store(size, Ordering::Relaxed);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.inner
            .circuit_breaker_trips
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stage_avg = |slot: &RwLock<Vec<u64>>| avg(&slot.read());
        let stage_p95 = |slot: &RwLock<Vec<u64>>| percentile(&slot.read(), 0.95);

        let cache_hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        let statuses = self
            .inner
            .status_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            detection_avg_ms: stage_avg(&self.inner.detection_ms),
            detection_p95_ms: stage_p95(&self.inner.detection_ms),
            translation_avg_ms: stage_avg(&self.inner.translation_ms),
            translation_p95_ms: stage_p95(&self.inner.translation_ms),
            erasure_avg_ms: stage_avg(&self.inner.erasure_ms),
            erasure_p95_ms: stage_p95(&self.inner.erasure_ms),
            rendering_avg_ms: stage_avg(&self.inner.rendering_ms),
            rendering_p95_ms: stage_p95(&self.inner.rendering_ms),
            images_success: self.inner.images_success.load(Ordering::Relaxed),
            images_degraded: self.inner.images_degraded.load(Ordering::Relaxed),
            images_failed: self.inner.images_failed.load(Ordering::Relaxed),
            batches_processed: self.inner.batches_processed.load(Ordering::Relaxed),
            statuses,
            entries_translated: self.inner.entries_translated.load(Ordering::Relaxed),
            entries_fallen_back: self.inner.entries_fallen_back.load(Ordering::Relaxed),
            translation_batches_failed: self
                .inner
                .translation_batches_failed
                .load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            cache_hit_rate,
            cache_size: self.inner.cache_size.load(Ordering::Relaxed),
            circuit_breaker_trips: self.inner.circuit_breaker_trips.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Prometheus text exposition
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = format!(
            r#"# HELP stage_avg_duration_ms Average stage duration in milliseconds
# TYPE stage_avg_duration_ms gauge
stage_avg_duration_ms{{stage="detection"}} {}
stage_avg_duration_ms{{stage="translation"}} {}
stage_avg_duration_ms{{stage="erasure"}} {}
stage_avg_duration_ms{{stage="rendering"}} {}

# HELP images_processed_total Images processed by outcome
# TYPE images_processed_total counter
images_processed_total{{outcome="success"}} {}
images_processed_total{{outcome="degraded"}} {}
images_processed_total{{outcome="failed"}} {}

# HELP batches_processed_total Total number of batches processed
# TYPE batches_processed_total counter
batches_processed_total {}

# HELP translation_entries_total Translation entries by outcome
# TYPE translation_entries_total counter
translation_entries_total{{outcome="translated"}} {}
translation_entries_total{{outcome="fallback"}} {}

# HELP translation_batches_failed_total Whole translation batches that failed
# TYPE translation_batches_failed_total counter
translation_batches_failed_total {}

# HELP cache_hit_rate Translation cache hit rate (0.0 to 1.0)
# TYPE cache_hit_rate gauge
cache_hit_rate {}

# HELP cache_size Current translation cache size
# TYPE cache_size gauge
cache_size {}

# HELP circuit_breaker_trips_total Total circuit breaker trips
# TYPE circuit_breaker_trips_total counter
circuit_breaker_trips_total {}

# HELP uptime_seconds Uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {}
"#,
            s.detection_avg_ms,
            s.translation_avg_ms,
            s.erasure_avg_ms,
            s.rendering_avg_ms,
            s.images_success,
            s.images_degraded,
            s.images_failed,
            s.batches_processed,
            s.entries_translated,
            s.entries_fallen_back,
            s.translation_batches_failed,
            s.cache_hit_rate,
            s.cache_size,
            s.circuit_breaker_trips,
            s.uptime_seconds,
        );

        if !s.statuses.is_empty() {
            out.push_str("\n# HELP image_status_total Images by detailed status\n");
            out.push_str("# TYPE image_status_total counter\n");
            for (status, count) in &s.statuses {
                out.push_str(&format!("image_status_total{{status=\"{}\"}} {}\n", status, count));
            }
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub detection_avg_ms: u64,
    pub detection_p95_ms: u64,
    pub translation_avg_ms: u64,
    pub translation_p95_ms: u64,
    pub erasure_avg_ms: u64,
    pub erasure_p95_ms: u64,
    pub rendering_avg_ms: u64,
    pub rendering_p95_ms: u64,
    pub images_success: usize,
    pub images_degraded: usize,
    pub images_failed: usize,
    pub batches_processed: usize,
    pub statuses: BTreeMap<String, usize>,
    pub entries_translated: usize,
    pub entries_fallen_back: usize,
    pub translation_batches_failed: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub cache_size: usize,
    pub circuit_breaker_trips: usize,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
