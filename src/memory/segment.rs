//! Storage backends behind a [`Buffer`](crate::buffer::Buffer).

/// Kind of storage a segment wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryType {
    /// Process-private heap memory.
    Heap,
    /// A block inside a named shared-memory arena owned by this process.
    Arena,
    /// A read-only view of a block in another process's arena.
    Mapped,
    /// Externally owned memory wrapped without taking ownership.
    Borrowed,
}

/// Where a segment lives inside a shared-memory arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaLocation {
    /// Process-unique identifier of the arena instance.
    pub arena_id: u64,
    /// Byte offset of the segment from the arena base (its handle).
    pub offset: u64,
}

/// A contiguous byte region that a buffer can hold on to.
///
/// The region is released when the segment is dropped; for arena blocks
/// that returns the range to the arena, for mapped frames it queues a FREE
/// to the provider.
///
/// # Safety
///
/// `as_ptr` must point to `len` readable bytes for as long as the segment
/// lives, and `as_mut_ptr`, when it returns a pointer, to `len` writable
/// ones. Segments handed out by this crate start on a 16-byte boundary.
pub trait MemorySegment: Send + Sync {
    /// Start of the region.
    fn as_ptr(&self) -> *const u8;

    /// Start of the region for writing, `None` for read-only segments.
    fn as_mut_ptr(&self) -> Option<*mut u8>;

    /// Size in bytes.
    fn len(&self) -> usize;

    /// Whether the region is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kind of storage.
    fn memory_type(&self) -> MemoryType;

    /// Arena placement, for segments that live in a local shared arena.
    fn arena_location(&self) -> Option<ArenaLocation> {
        None
    }

    /// The region as bytes.
    ///
    /// # Safety
    ///
    /// No mutable reference into the region may exist while the slice lives.
    unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: forwarded caller contract.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }
}
