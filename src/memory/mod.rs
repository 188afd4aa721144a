//! Memory backends for frame storage.
//!
//! # Architecture
//!
//! - [`MemorySegment`]: trait over every backend
//! - [`HeapSegment`]: process-private, 16-byte aligned storage
//! - [`BorrowedSegment`]: externally owned memory, `unsafe` constructors only
//! - [`Arena`] / [`ArenaBlock`]: named shared-memory heap on the provider side
//! - [`ArenaMapping`] / [`MappedFrame`]: read-only client view of an arena
//!
//! # Example
//!
//! ```rust,no_run
//! use framelink::memory::{Arena, ArenaMapping, MappedFrame, MemorySegment};
//!
//! // Provider process
//! let arena = Arena::create("preview", 8 * 1024 * 1024)?;
//! let block = arena.alloc(1024).expect("arena has room");
//! let handle = block.handle();
//!
//! // Client process, after receiving `handle` over the control socket
//! let mapping = ArenaMapping::open("preview")?;
//! let frame = MappedFrame::new(mapping, handle, 1024)?;
//! assert_eq!(frame.len(), 1024);
//! # Ok::<(), framelink::error::Error>(())
//! ```

mod arena;
mod borrowed;
mod heap;
mod mapping;
mod segment;

pub use arena::{Arena, ArenaBlock, shm_name};
pub use borrowed::BorrowedSegment;
pub use heap::HeapSegment;
pub use mapping::{ArenaMapping, MappedFrame};
pub use segment::{ArenaLocation, MemorySegment, MemoryType};

#[cfg(test)]
pub(crate) use arena::tests::unique_stream;
