//! Reference-counted byte storage shared between samples.

use crate::error::{Error, Result};
use crate::memory::{ArenaLocation, BorrowedSegment, HeapSegment, MemorySegment, MemoryType};
use std::fmt;
use std::sync::Arc;

/// A byte range of a [`MemorySegment`], kept alive by an `Arc`.
///
/// Cloning bumps the segment's reference count; the number of clones alive
/// is what [`Buffer::ownership`] reports.
#[derive(Clone)]
pub struct MemoryHandle {
    segment: Arc<dyn MemorySegment>,
    start: usize,
    len: usize,
}

impl MemoryHandle {
    /// Range `start..start + len` of `segment`.
    pub fn new(segment: Arc<dyn MemorySegment>, start: usize, len: usize) -> Result<Self> {
        let end = start.checked_add(len);
        if end.is_none_or(|end| end > segment.len()) {
            return Err(Error::InvalidArgument(format!(
                "range {}+{} outside segment of {} bytes",
                start,
                len,
                segment.len()
            )));
        }
        Ok(Self { segment, start, len })
    }

    /// The whole of `segment`.
    pub fn from_segment(segment: Arc<dyn MemorySegment>) -> Self {
        let len = segment.len();
        Self { segment, start: 0, len }
    }

    /// First byte of the range.
    pub fn as_ptr(&self) -> *const u8 {
        // SAFETY: start <= segment.len(), checked on construction.
        unsafe { self.segment.as_ptr().add(self.start) }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The range as bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the range is inside the segment, which lives as long as self.
        // Writers only exist while this handle is the sole holder (`as_mut_slice`).
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    /// The range as mutable bytes.
    ///
    /// `None` if the segment is read-only or any other handle shares it.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        let segment = Arc::get_mut(&mut self.segment)?;
        let ptr = segment.as_mut_ptr()?;
        // SAFETY: exclusive access to the only Arc, range checked on construction.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.add(self.start), self.len) })
    }

    /// Number of handles sharing the backing segment.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.segment)
    }

    /// Kind of the backing segment.
    pub fn memory_type(&self) -> MemoryType {
        self.segment.memory_type()
    }

    /// Start of the range within the segment.
    pub fn offset(&self) -> usize {
        self.start
    }

    /// The backing segment.
    pub fn segment(&self) -> &Arc<dyn MemorySegment> {
        &self.segment
    }

    /// Arena placement of this handle's first byte, if arena-backed.
    pub fn arena_location(&self) -> Option<ArenaLocation> {
        self.segment.arena_location().map(|loc| ArenaLocation {
            arena_id: loc.arena_id,
            offset: loc.offset + self.start as u64,
        })
    }

    /// Sub-range `offset..offset + len` of this range.
    pub fn subrange(&self, offset: usize, len: usize) -> Result<Self> {
        if offset.checked_add(len).is_none_or(|end| end > self.len) {
            return Err(Error::InvalidArgument(format!(
                "view {}+{} outside buffer of {} bytes",
                offset, len, self.len
            )));
        }
        Ok(Self {
            segment: Arc::clone(&self.segment),
            start: self.start + offset,
            len,
        })
    }
}

impl fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("type", &self.memory_type())
            .field("range", &(self.start..self.start + self.len))
            .field("holders", &self.holders())
            .finish()
    }
}

/// How a buffer relates to its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Sole holder of crate-managed storage.
    Owned,
    /// Storage kept alive by a reference count shared with other holders.
    Shared,
    /// Externally owned memory; the caller guarantees its lifetime.
    Borrowed,
}

/// A byte range with an ownership mode.
///
/// Buffers are cheap to clone: [`Buffer::dup`] only bumps a reference
/// count, never copies bytes. Mutable access is granted only to the sole
/// holder of writable storage, so a buffer that was handed to anyone else
/// (a transport connection, a renderer input) cannot be written through.
///
/// # Example
///
/// ```rust
/// use framelink::buffer::{Buffer, Ownership};
///
/// let mut buffer = Buffer::alloc(1024).unwrap();
/// buffer.as_mut_bytes().unwrap()[0] = 1;
///
/// let dup = buffer.dup();
/// assert_eq!(buffer.ownership(), Ownership::Shared);
/// assert!(buffer.as_mut_bytes().is_none());
///
/// drop(buffer);
/// assert_eq!(dup.as_bytes()[0], 1);
/// ```
#[derive(Clone)]
pub struct Buffer {
    memory: MemoryHandle,
}

impl Buffer {
    /// Wrap a memory handle.
    pub fn new(memory: MemoryHandle) -> Self {
        Self { memory }
    }

    /// Wrap a whole segment.
    pub fn from_segment(segment: impl MemorySegment + 'static) -> Self {
        Self::new(MemoryHandle::from_segment(Arc::new(segment)))
    }

    /// Allocate `size` zeroed bytes of owned heap storage.
    pub fn alloc(size: usize) -> Result<Self> {
        Ok(Self::from_segment(HeapSegment::new(size)?))
    }

    /// Wrap externally owned, read-only memory without copying.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for reads of `len` bytes until this buffer and
    /// every duplicate or view derived from it has been dropped.
    pub unsafe fn borrowed(ptr: *const u8, len: usize) -> Result<Self> {
        // SAFETY: forwarded caller contract.
        let segment = unsafe { BorrowedSegment::new(ptr, len)? };
        Ok(Self::from_segment(segment))
    }

    /// Another handle to the same storage. O(1).
    #[inline]
    pub fn dup(&self) -> Self {
        self.clone()
    }

    /// Current ownership mode.
    pub fn ownership(&self) -> Ownership {
        if self.memory.memory_type() == MemoryType::Borrowed {
            Ownership::Borrowed
        } else if self.memory.holders() == 1 {
            Ownership::Owned
        } else {
            Ownership::Shared
        }
    }

    /// The underlying memory handle.
    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }

    /// The bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.memory.as_slice()
    }

    /// Mutable bytes, when this is the sole holder of writable storage.
    pub fn as_mut_bytes(&mut self) -> Option<&mut [u8]> {
        self.memory.as_mut_slice()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Kind of the backing storage.
    pub fn memory_type(&self) -> MemoryType {
        self.memory.memory_type()
    }

    /// A buffer over `offset..offset + len` of this one, sharing storage.
    pub fn view(&self, offset: usize, len: usize) -> Result<Self> {
        self.memory.subrange(offset, len).map(Self::new)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("ownership", &self.ownership())
            .field("memory_type", &self.memory_type())
            .finish()
    }
}
