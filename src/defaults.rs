//! Default sizes, intervals and naming constants.
//!
//! The configuration structs ([`TransportConfig`](crate::transport::TransportConfig),
//! [`RendererConfig`](crate::renderer::RendererConfig)) start from these
//! values; override them with the `with_*` builders.
//!
//! Arena sizing follows typical frame sizes:
//! - 1080p BGRA = 8.3MB, 1080p I420 = 3.1MB
//! - A client holding a frame while the provider publishes the next one
//!   needs at least two frames of headroom per connection

use std::time::Duration;

// =============================================================================
// Shared-memory arena
// =============================================================================

/// Prefix of every arena's shared-memory object name.
pub const ARENA_NAME_PREFIX: &str = "/framelink.";

/// Default arena capacity: room for several 1080p BGRA frames in flight.
pub const DEFAULT_ARENA_SIZE: usize = 64 * 1024 * 1024;

/// Alignment of every arena block (offset and size).
pub const ARENA_ALIGN: usize = 16;

/// Bytes reserved at the start of the arena for its header.
pub const ARENA_HEADER_SIZE: usize = 64;

// =============================================================================
// Local transport
// =============================================================================

/// Prefix of the control socket file name inside the socket directory.
pub const SOCKET_NAME_PREFIX: &str = "framelink-";

/// Suffix of the control socket file name.
pub const SOCKET_NAME_SUFFIX: &str = ".sock";

/// Socket directory used when `XDG_RUNTIME_DIR` is unset.
pub const FALLBACK_SOCKET_DIR: &str = "/tmp";

/// Wait between client reconnect attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Renderer
// =============================================================================

/// Default canvas width.
pub const DEFAULT_CANVAS_WIDTH: u32 = 1280;

/// Default canvas height.
pub const DEFAULT_CANVAS_HEIGHT: u32 = 720;

/// Default tick period (25 fps).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(40);

/// Inputs whose timestamp is further than this from "now" render as no signal.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);

/// Default viewport border thickness in pixels.
pub const DEFAULT_BORDER_WIDTH: u32 = 2;
