//! Tracing spans for the long-lived worker threads.

use tracing::{Level, Span, span};

/// Span covering a provider's I/O thread.
#[inline]
pub fn span_provider(stream: &str) -> Span {
    span!(Level::INFO, "provider", stream = %stream)
}

/// Span covering a client's I/O thread.
#[inline]
pub fn span_client(stream: &str) -> Span {
    span!(Level::INFO, "client", stream = %stream)
}

/// Span covering a renderer's tick thread.
#[inline]
pub fn span_renderer(width: u32, height: u32) -> Span {
    span!(Level::INFO, "renderer", width = width, height = height)
}

/// Span for one transport connection.
#[inline]
pub fn span_connection(stream: &str, id: u64) -> Span {
    span!(Level::DEBUG, "connection", stream = %stream, id = id)
}

/// Log a fault caught at a thread boundary.
#[inline]
pub fn trace_thread_error(component: &str, error: &dyn std::error::Error) {
    tracing::error!(
        component = %component,
        error = %error,
        "worker thread stopped on error"
    );
}
