//! Heap-backed memory segment.

use super::{MemorySegment, MemoryType};
use crate::error::{Error, Result};
use std::ptr::NonNull;

#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Chunk([u8; 16]);

/// A zero-initialized heap block whose start is aligned to 16 bytes.
///
/// This is the storage of owned samples: deep copies, converted frames and
/// renderer canvases.
///
/// # Example
///
/// ```rust
/// use framelink::memory::{HeapSegment, MemorySegment};
///
/// let segment = HeapSegment::new(1000).unwrap();
/// assert_eq!(segment.len(), 1000);
/// assert_eq!(segment.as_ptr() as usize % 16, 0);
/// ```
pub struct HeapSegment {
    ptr: NonNull<Chunk>,
    chunks: usize,
    len: usize,
}

impl HeapSegment {
    /// Allocate `size` zeroed bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if size is 0.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::AllocationFailed(
                "size must be greater than 0".into(),
            ));
        }
        let chunks = size.div_ceil(16);
        let boxed: Box<[Chunk]> = vec![Chunk([0; 16]); chunks].into_boxed_slice();
        let raw = Box::into_raw(boxed).cast::<Chunk>();
        let ptr = NonNull::new(raw)
            .ok_or_else(|| Error::AllocationFailed("allocator returned null".into()))?;
        Ok(Self {
            ptr,
            chunks,
            len: size,
        })
    }
}

impl Drop for HeapSegment {
    fn drop(&mut self) {
        // SAFETY: ptr/chunks came from Box::into_raw of a boxed slice of this length.
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.chunks,
            )));
        }
    }
}

// SAFETY: the allocation is exclusively owned; mutable access is gated by
// `Buffer`, which only hands it out to the sole holder.
unsafe impl Send for HeapSegment {}
unsafe impl Sync for HeapSegment {}

impl MemorySegment for HeapSegment {
    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr().cast::<u8>()
    }

    fn as_mut_ptr(&self) -> Option<*mut u8> {
        Some(self.ptr.as_ptr().cast::<u8>())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Heap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_segment_creation() {
        let segment = HeapSegment::new(1024).unwrap();
        assert_eq!(segment.len(), 1024);
        assert_eq!(segment.memory_type(), MemoryType::Heap);
        assert!(segment.arena_location().is_none());
    }

    #[test]
    fn test_heap_segment_zero_size_fails() {
        assert!(HeapSegment::new(0).is_err());
    }

    #[test]
    fn test_heap_segment_alignment_for_odd_sizes() {
        for size in [1, 15, 17, 333] {
            let segment = HeapSegment::new(size).unwrap();
            assert_eq!(segment.as_ptr() as usize % 16, 0);
            assert_eq!(segment.len(), size);
        }
    }

    #[test]
    fn test_heap_segment_read_write() {
        let segment = HeapSegment::new(64).unwrap();
        let ptr = segment.as_mut_ptr().unwrap();
        unsafe {
            std::ptr::write(ptr, 42);
            std::ptr::write(ptr.add(63), 43);
            let slice = segment.as_slice();
            assert_eq!(slice[0], 42);
            assert_eq!(slice[63], 43);
            assert!(slice[1..63].iter().all(|&b| b == 0));
        }
    }
}
