//! Metrics collection using metrics-rs.

use metrics::{Counter, Gauge, Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const FRAMES_PUBLISHED: &str = "framelink_frames_published";
const FRAMES_DROPPED: &str = "framelink_frames_dropped";
const FRAMES_DELIVERED: &str = "framelink_frames_delivered";
const FRAMES_SKIPPED: &str = "framelink_frames_skipped";
const ARENA_USED_BYTES: &str = "framelink_arena_used_bytes";
const CLIENT_RECONNECTS: &str = "framelink_client_reconnects";
const RENDER_TICKS: &str = "framelink_render_ticks";
const RENDER_OVERRUNS: &str = "framelink_render_overruns";
const RENDER_TICK_TIME_NS: &str = "framelink_render_tick_time_ns";

/// Initialize metrics descriptions.
///
/// Call this once at application startup. Safe to call multiple times
/// (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        FRAMES_PUBLISHED,
        Unit::Count,
        "Frames handed to a provider for publication"
    );
    metrics::describe_counter!(
        FRAMES_DROPPED,
        Unit::Count,
        "Frames a provider dropped because its arena was full"
    );
    metrics::describe_counter!(
        FRAMES_DELIVERED,
        Unit::Count,
        "Frame descriptors sent to clients"
    );
    metrics::describe_counter!(
        FRAMES_SKIPPED,
        Unit::Count,
        "Frames superseded before a consumer saw them"
    );
    metrics::describe_gauge!(
        ARENA_USED_BYTES,
        Unit::Bytes,
        "Bytes allocated in a provider's shared-memory arena"
    );
    metrics::describe_counter!(
        CLIENT_RECONNECTS,
        Unit::Count,
        "Connection attempts made by transport clients after a failure"
    );
    metrics::describe_counter!(RENDER_TICKS, Unit::Count, "Composed renderer ticks");
    metrics::describe_counter!(
        RENDER_OVERRUNS,
        Unit::Count,
        "Renderer ticks that took longer than the refresh interval"
    );
    metrics::describe_histogram!(
        RENDER_TICK_TIME_NS,
        Unit::Nanoseconds,
        "Time to compose one renderer tick"
    );
}

/// Per-stream transport metrics with pre-configured labels.
#[derive(Clone)]
pub struct StreamMetrics {
    stream: String,
    published: Counter,
    dropped: Counter,
    delivered: Counter,
    skipped: Counter,
    arena_used: Gauge,
    reconnects: Counter,
}

impl StreamMetrics {
    /// Create a collector labelled with `stream`.
    pub fn new(stream: &str) -> Self {
        Self {
            stream: stream.to_string(),
            published: counter!(FRAMES_PUBLISHED, "stream" => stream.to_string()),
            dropped: counter!(FRAMES_DROPPED, "stream" => stream.to_string()),
            delivered: counter!(FRAMES_DELIVERED, "stream" => stream.to_string()),
            skipped: counter!(FRAMES_SKIPPED, "stream" => stream.to_string(), "stage" => "transport"),
            arena_used: gauge!(ARENA_USED_BYTES, "stream" => stream.to_string()),
            reconnects: counter!(CLIENT_RECONNECTS, "stream" => stream.to_string()),
        }
    }

    /// A frame was accepted for publication.
    #[inline]
    pub fn record_published(&self) {
        self.published.increment(1);
    }

    /// A frame was dropped before publication.
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.increment(1);
    }

    /// A descriptor was sent; `skipped` frames were superseded before this
    /// connection asked.
    #[inline]
    pub fn record_delivered(&self, skipped: u64) {
        self.delivered.increment(1);
        if skipped > 0 {
            self.skipped.increment(skipped);
        }
    }

    /// Current arena usage.
    #[inline]
    pub fn record_arena_used(&self, bytes: usize) {
        self.arena_used.set(bytes as f64);
    }

    /// A client is about to reconnect.
    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.increment(1);
    }

    /// Get the stream name.
    pub fn stream(&self) -> &str {
        &self.stream
    }
}

/// Renderer metrics.
#[derive(Clone)]
pub struct RenderMetrics {
    ticks: Counter,
    overruns: Counter,
    skipped: Counter,
    tick_time: Histogram,
}

impl RenderMetrics {
    /// Create the renderer collectors.
    pub fn new() -> Self {
        Self {
            ticks: counter!(RENDER_TICKS),
            overruns: counter!(RENDER_OVERRUNS),
            skipped: counter!(FRAMES_SKIPPED, "stage" => "renderer"),
            tick_time: histogram!(RENDER_TICK_TIME_NS),
        }
    }

    /// Record one tick and whether it overran `budget`.
    #[inline]
    pub fn record_tick(&self, elapsed: Duration, budget: Duration) {
        self.ticks.increment(1);
        self.tick_time.record(elapsed.as_nanos() as f64);
        if elapsed > budget {
            self.overruns.increment(1);
        }
    }

    /// An input sample was overwritten before any tick used it.
    #[inline]
    pub fn record_input_skipped(&self) {
        self.skipped.increment(1);
    }
}

impl Default for RenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}
