//! Wrapping externally owned memory.

use super::{MemorySegment, MemoryType};
use crate::error::{Error, Result};
use std::ptr::NonNull;

/// A segment over memory this crate does not own.
///
/// Used for zero-copy ingestion of frames that live in a capture driver's
/// or decoder's buffers. The only constructors are `unsafe`: the caller
/// promises the memory outlives every `Buffer`/`Sample` built on top of it,
/// including duplicates and ROI views.
pub struct BorrowedSegment {
    ptr: NonNull<u8>,
    len: usize,
    writable: bool,
}

impl BorrowedSegment {
    /// Wrap a read-only region.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes for as long as this
    /// segment or any buffer sharing it exists, and must not be written
    /// through other aliases during that time.
    pub unsafe fn new(ptr: *const u8, len: usize) -> Result<Self> {
        let ptr = NonNull::new(ptr.cast_mut())
            .ok_or_else(|| Error::InvalidArgument("borrowed pointer is null".into()))?;
        Ok(Self {
            ptr,
            len,
            writable: false,
        })
    }

    /// Wrap a writable region.
    ///
    /// # Safety
    ///
    /// Same as [`BorrowedSegment::new`], and additionally `ptr` must be valid
    /// for writes with no other live references to the region.
    pub unsafe fn new_mut(ptr: *mut u8, len: usize) -> Result<Self> {
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| Error::InvalidArgument("borrowed pointer is null".into()))?;
        Ok(Self {
            ptr,
            len,
            writable: true,
        })
    }
}

// SAFETY: the constructor contract makes the caller responsible for the
// region's validity on whichever thread the segment ends up.
unsafe impl Send for BorrowedSegment {}
unsafe impl Sync for BorrowedSegment {}

impl MemorySegment for BorrowedSegment {
    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn as_mut_ptr(&self) -> Option<*mut u8> {
        self.writable.then_some(self.ptr.as_ptr())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Borrowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrowed_segment_reads_through() {
        let data = [1u8, 2, 3, 4];
        let segment = unsafe { BorrowedSegment::new(data.as_ptr(), data.len()) }.unwrap();
        assert_eq!(segment.memory_type(), MemoryType::Borrowed);
        assert!(segment.as_mut_ptr().is_none());
        assert_eq!(unsafe { segment.as_slice() }, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_borrowed_segment_null_rejected() {
        let result = unsafe { BorrowedSegment::new(std::ptr::null(), 4) };
        assert!(result.is_err());
    }

    #[test]
    fn test_borrowed_mut_segment_is_writable() {
        let mut data = [0u8; 8];
        let segment = unsafe { BorrowedSegment::new_mut(data.as_mut_ptr(), data.len()) }.unwrap();
        assert!(segment.as_mut_ptr().is_some());
    }
}
