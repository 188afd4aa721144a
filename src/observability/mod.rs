//! Observability features: metrics and tracing.
//!
//! - **Metrics**: counters, gauges and histograms via `metrics-rs`. Install
//!   any recorder (prometheus, statsd, ...) to collect them; without one,
//!   recording is a no-op.
//! - **Tracing**: structured logs and spans via `tracing`. The crate never
//!   installs a subscriber.
//!
//! ## Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `framelink_frames_published` | Counter | `stream` | Frames accepted by a provider |
//! | `framelink_frames_dropped` | Counter | `stream` | Frames dropped on arena exhaustion |
//! | `framelink_frames_delivered` | Counter | `stream` | Descriptors sent to clients |
//! | `framelink_frames_skipped` | Counter | `stream`, `stage` | Frames superseded before a consumer saw them |
//! | `framelink_arena_used_bytes` | Gauge | `stream` | Arena bytes in use |
//! | `framelink_client_reconnects` | Counter | `stream` | Client reconnect attempts |
//! | `framelink_render_ticks` | Counter | | Composed ticks |
//! | `framelink_render_overruns` | Counter | | Ticks longer than the refresh interval |
//! | `framelink_render_tick_time_ns` | Histogram | | Time per tick |
//!
//! ## Example
//!
//! ```rust
//! use framelink::observability::init_metrics;
//!
//! // Describe metrics once at startup
//! init_metrics();
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{RenderMetrics, StreamMetrics, init_metrics};
pub use tracing_support::{
    span_client, span_connection, span_provider, span_renderer, trace_thread_error,
};
