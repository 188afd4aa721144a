//! Client-side, read-only view of another process's arena.

use super::arena::{shm_name, ArenaHeader};
use super::{MemorySegment, MemoryType};
use crate::defaults::ARENA_HEADER_SIZE;
use crate::error::{Error, Result};
use rustix::fs::Mode;
use rustix::mm::{MapFlags, ProtFlags};
use rustix::shm;
use std::ptr::NonNull;
use std::sync::Arc;

/// A read-only mapping of a named arena.
///
/// Opened by transport clients on every (re)connect. Frames translated
/// against a mapping keep it alive, so a handle is never resolved in a
/// different arena instance than the one it was served from.
pub struct ArenaMapping {
    stream: String,
    base: NonNull<u8>,
    map_len: usize,
    total_size: usize,
    data_offset: usize,
}

impl ArenaMapping {
    /// Map the arena published under `stream` and validate its header.
    pub fn open(stream: &str) -> Result<Arc<Self>> {
        let name = shm_name(stream)?;
        let fd = shm::open(name.as_str(), shm::OFlags::RDONLY, Mode::empty())?;
        let stat = rustix::fs::fstat(&fd)?;
        let map_len = usize::try_from(stat.st_size)
            .map_err(|_| Error::Protocol(format!("arena {:?} has a negative size", stream)))?;
        if map_len < ARENA_HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "arena {:?} is {} bytes, smaller than its header",
                stream, map_len
            )));
        }

        let base = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ,
                MapFlags::SHARED,
                &fd,
                0,
            )?
        };
        let base = NonNull::new(base.cast::<u8>())
            .ok_or_else(|| Error::AllocationFailed("mmap returned null".into()))?;

        // Constructed before validation so the mapping is released on error.
        let mut mapping = Self {
            stream: stream.to_string(),
            base,
            map_len,
            total_size: 0,
            data_offset: 0,
        };

        // SAFETY: map_len >= ARENA_HEADER_SIZE and the mapping is readable.
        let raw = unsafe { std::slice::from_raw_parts(base.as_ptr(), ARENA_HEADER_SIZE) };
        let header = ArenaHeader::decode(raw)?;
        let total_size = usize::try_from(header.total_size).unwrap_or(usize::MAX);
        let data_offset = usize::try_from(header.data_offset).unwrap_or(usize::MAX);
        if total_size > map_len || data_offset < ARENA_HEADER_SIZE || data_offset > total_size {
            return Err(Error::Protocol(format!(
                "arena {:?} header is inconsistent (total {}, data at {}, mapped {})",
                stream, total_size, data_offset, map_len
            )));
        }
        mapping.total_size = total_size;
        mapping.data_offset = data_offset;

        tracing::debug!(stream = %stream, size = total_size, "Mapped arena read-only");
        Ok(Arc::new(mapping))
    }

    /// Resolve `len` bytes at `handle` to a local pointer.
    ///
    /// Fails with [`Error::InvalidArgument`] unless the whole range lies in
    /// the data region.
    pub fn ptr_of(&self, handle: u64, len: usize) -> Result<*const u8> {
        let offset = usize::try_from(handle).unwrap_or(usize::MAX);
        let in_range = offset >= self.data_offset
            && offset
                .checked_add(len)
                .is_some_and(|end| end <= self.total_size);
        if !in_range {
            return Err(Error::InvalidArgument(format!(
                "handle {} (+{} bytes) is outside arena {:?}",
                handle, len, self.stream
            )));
        }
        // SAFETY: bounds checked against the mapped size above.
        Ok(unsafe { self.base.as_ptr().add(offset) }.cast_const())
    }

    /// Stream name of the mapped arena.
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Total arena size, header included.
    pub fn total_size(&self) -> usize {
        self.total_size
    }
}

impl Drop for ArenaMapping {
    fn drop(&mut self) {
        unsafe {
            let _ = rustix::mm::munmap(self.base.as_ptr().cast(), self.map_len);
        }
    }
}

// SAFETY: the mapping is read-only and immutable after construction.
unsafe impl Send for ArenaMapping {}
unsafe impl Sync for ArenaMapping {}

impl std::fmt::Debug for ArenaMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaMapping")
            .field("stream", &self.stream)
            .field("total_size", &self.total_size)
            .finish()
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// A block of a remote arena, seen through an [`ArenaMapping`].
///
/// Read-only. The optional release hook runs once when the last holder
/// drops the frame; the transport client uses it to queue a FREE for the
/// provider.
pub struct MappedFrame {
    mapping: Arc<ArenaMapping>,
    handle: u64,
    len: usize,
    on_release: Option<ReleaseHook>,
}

impl MappedFrame {
    /// View `len` bytes at `handle` inside `mapping`.
    pub fn new(mapping: Arc<ArenaMapping>, handle: u64, len: usize) -> Result<Self> {
        mapping.ptr_of(handle, len)?;
        Ok(Self {
            mapping,
            handle,
            len,
            on_release: None,
        })
    }

    /// Run `hook` when this frame is dropped.
    pub fn with_release(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// Handle of the block in the remote arena.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// The mapping this frame was resolved against.
    pub fn mapping(&self) -> &Arc<ArenaMapping> {
        &self.mapping
    }
}

impl Drop for MappedFrame {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl MemorySegment for MappedFrame {
    fn as_ptr(&self) -> *const u8 {
        // SAFETY: range validated in `new`; the mapping outlives self.
        unsafe { self.mapping.base.as_ptr().add(self.handle as usize) }
    }

    fn as_mut_ptr(&self) -> Option<*mut u8> {
        None
    }

    fn len(&self) -> usize {
        self.len
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Mapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::arena::tests::unique_stream;
    use crate::memory::Arena;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_mapping_sees_provider_writes() {
        let name = unique_stream("map");
        let arena = Arena::create(&name, 64 * 1024).unwrap();
        let block = arena.alloc(4).unwrap();
        unsafe {
            std::ptr::copy_nonoverlapping([9u8, 8, 7, 6].as_ptr(), block.as_mut_ptr().unwrap(), 4);
        }

        let mapping = ArenaMapping::open(&name).unwrap();
        let frame = MappedFrame::new(Arc::clone(&mapping), block.handle(), 4).unwrap();
        assert_eq!(unsafe { frame.as_slice() }, &[9, 8, 7, 6]);
        assert!(frame.as_mut_ptr().is_none());
        Arena::remove(&name).unwrap();
    }

    #[test]
    fn test_mapping_rejects_out_of_range_handles() {
        let name = unique_stream("range");
        let arena = Arena::create(&name, 4096).unwrap();
        let mapping = ArenaMapping::open(&name).unwrap();
        assert!(mapping.ptr_of(0, 1).is_err());
        assert!(mapping.ptr_of(4000, 200).is_err());
        assert!(mapping.ptr_of(64, 16).is_ok());
        assert_eq!(mapping.total_size(), arena.total_size());
        Arena::remove(&name).unwrap();
    }

    #[test]
    fn test_missing_arena_is_an_error() {
        assert!(ArenaMapping::open(&unique_stream("absent")).is_err());
    }

    #[test]
    fn test_release_hook_runs_once_on_drop() {
        let name = unique_stream("hook");
        let arena = Arena::create(&name, 4096).unwrap();
        let block = arena.alloc(16).unwrap();
        let mapping = ArenaMapping::open(&name).unwrap();

        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let frame = MappedFrame::new(mapping, block.handle(), 16)
            .unwrap()
            .with_release(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        drop(frame);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        Arena::remove(&name).unwrap();
    }
}
