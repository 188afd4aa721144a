//! Named shared-memory arena.
//!
//! A provider process creates one arena per published stream: a POSIX
//! shared-memory object named [`ARENA_NAME_PREFIX`] + stream name, mapped
//! read-write, carved into variable-size blocks. Client processes map the
//! same object read-only (see [`ArenaMapping`](super::ArenaMapping)) and
//! reach blocks through their *handle*: the block's byte offset from the
//! arena base, which is the same number in every process.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────┬───────────────────────────────────────────────┐
//! │ header (64B) │ data region (first-fit blocks, 16B aligned)   │
//! └──────────────┴───────────────────────────────────────────────┘
//! ^ base                                          base + total_size
//! ```
//!
//! Allocation metadata (free list, live blocks) lives in the provider's heap,
//! never in the shared mapping: clients only read payload bytes.

use super::{ArenaLocation, MemorySegment, MemoryType};
use crate::defaults::{ARENA_ALIGN, ARENA_HEADER_SIZE, ARENA_NAME_PREFIX};
use crate::error::{Error, Result};
use crate::format::align_up;
use rustix::fs::Mode;
use rustix::io::Errno;
use rustix::mm::{MapFlags, ProtFlags};
use rustix::shm;
use std::collections::BTreeMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Magic number at the start of every arena header.
pub(crate) const ARENA_MAGIC: u64 = u64::from_le_bytes(*b"FRMLINK\0");

/// Header layout version.
pub(crate) const ARENA_VERSION: u32 = 1;

/// Global counter for process-unique arena IDs.
static ARENA_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_arena_id() -> u64 {
    ARENA_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Shared-memory object name for a stream.
///
/// Stream names must be non-empty and free of `/` and NUL.
pub fn shm_name(stream: &str) -> Result<String> {
    if stream.is_empty() || stream.len() > 200 {
        return Err(Error::InvalidArgument(format!(
            "stream name must be 1..=200 bytes, got {}",
            stream.len()
        )));
    }
    if stream.contains(['/', '\0']) {
        return Err(Error::InvalidArgument(format!(
            "stream name {:?} contains '/' or NUL",
            stream
        )));
    }
    Ok(format!("{}{}", ARENA_NAME_PREFIX, stream))
}

/// Fixed header at offset 0 of the shared object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArenaHeader {
    pub total_size: u64,
    pub data_offset: u64,
}

impl ArenaHeader {
    pub(crate) fn encode(&self) -> [u8; ARENA_HEADER_SIZE] {
        let mut bytes = [0u8; ARENA_HEADER_SIZE];
        bytes[0..8].copy_from_slice(&ARENA_MAGIC.to_le_bytes());
        bytes[8..12].copy_from_slice(&ARENA_VERSION.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.total_size.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.data_offset.to_le_bytes());
        bytes
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        let field = |range: std::ops::Range<usize>| -> Result<&[u8]> {
            bytes
                .get(range)
                .ok_or_else(|| Error::Protocol("arena header truncated".into()))
        };
        let u64_at = |at: usize| -> Result<u64> {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(field(at..at + 8)?);
            Ok(u64::from_le_bytes(raw))
        };

        let magic = u64_at(0)?;
        if magic != ARENA_MAGIC {
            return Err(Error::Protocol(format!("bad arena magic {:#018x}", magic)));
        }
        let mut raw = [0u8; 4];
        raw.copy_from_slice(field(8..12)?);
        let version = u32::from_le_bytes(raw);
        if version != ARENA_VERSION {
            return Err(Error::Protocol(format!(
                "unsupported arena version {}",
                version
            )));
        }
        Ok(Self {
            total_size: u64_at(16)?,
            data_offset: u64_at(24)?,
        })
    }
}

/// First-fit free list over absolute arena offsets.
#[derive(Debug)]
struct FreeList {
    /// offset -> length of free ranges, coalesced.
    free: BTreeMap<usize, usize>,
    /// offset -> length of live blocks.
    live: BTreeMap<usize, usize>,
    used: usize,
}

impl FreeList {
    fn new(start: usize, len: usize) -> Self {
        let mut free = BTreeMap::new();
        if len > 0 {
            free.insert(start, len);
        }
        Self {
            free,
            live: BTreeMap::new(),
            used: 0,
        }
    }

    fn allocate(&mut self, size: usize) -> Option<usize> {
        let (offset, len) = self
            .free
            .iter()
            .find(|&(_, &len)| len >= size)
            .map(|(&offset, &len)| (offset, len))?;
        self.free.remove(&offset);
        if len > size {
            self.free.insert(offset + size, len - size);
        }
        self.live.insert(offset, size);
        self.used += size;
        Some(offset)
    }

    fn release(&mut self, offset: usize) {
        let Some(size) = self.live.remove(&offset) else {
            return;
        };
        self.used -= size;

        let mut start = offset;
        let mut len = size;
        if let Some((&prev, &prev_len)) = self.free.range(..offset).next_back() {
            if prev + prev_len == offset {
                self.free.remove(&prev);
                start = prev;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free.remove(&(offset + size)) {
            len += next_len;
        }
        self.free.insert(start, len);
    }

    /// Live block containing `offset`, as (start, len).
    fn containing(&self, offset: usize) -> Option<(usize, usize)> {
        let (&start, &len) = self.live.range(..=offset).next_back()?;
        (offset < start + len).then_some((start, len))
    }
}

struct ArenaShared {
    id: u64,
    stream: String,
    base: NonNull<u8>,
    total_size: usize,
    state: Mutex<FreeList>,
}

impl ArenaShared {
    fn lock(&self) -> MutexGuard<'_, FreeList> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ArenaShared {
    fn drop(&mut self) {
        unsafe {
            let _ = rustix::mm::munmap(self.base.as_ptr().cast(), self.total_size);
        }
    }
}

// SAFETY: allocation metadata is behind a mutex; payload bytes are only
// written through blocks held exclusively by their allocator.
unsafe impl Send for ArenaShared {}
unsafe impl Sync for ArenaShared {}

/// Provider side of a named shared-memory arena.
///
/// Cheap to clone; the mapping stays alive while the arena or any of its
/// blocks is held.
///
/// # Example
///
/// ```rust,no_run
/// use framelink::memory::{Arena, MemorySegment};
///
/// let arena = Arena::create("camera0", 16 * 1024 * 1024)?;
/// let block = arena.alloc(4096).expect("arena has room");
/// let handle = arena.handle_of(block.as_ptr())?;
/// assert_eq!(arena.ptr_of(handle)?.cast_const(), block.as_ptr());
/// # Ok::<(), framelink::error::Error>(())
/// ```
#[derive(Clone)]
pub struct Arena {
    shared: Arc<ArenaShared>,
}

impl Arena {
    /// Create the arena for `stream` with a total size of `max_size` bytes
    /// (header included).
    ///
    /// An object left behind under the same name is unlinked first, so
    /// clients still mapping it keep their old memory while new clients
    /// attach to the fresh one.
    pub fn create(stream: &str, max_size: usize) -> Result<Self> {
        let name = shm_name(stream)?;
        let total_size = align_up(max_size, ARENA_ALIGN);
        if total_size <= ARENA_HEADER_SIZE {
            return Err(Error::AllocationFailed(format!(
                "arena size {} leaves no room after the {} byte header",
                max_size, ARENA_HEADER_SIZE
            )));
        }

        match shm::unlink(name.as_str()) {
            Ok(()) | Err(Errno::NOENT) => {}
            Err(e) => return Err(e.into()),
        }
        let fd = shm::open(
            name.as_str(),
            shm::OFlags::CREATE | shm::OFlags::EXCL | shm::OFlags::RDWR,
            Mode::RUSR | Mode::WUSR,
        )?;

        let mapped = rustix::fs::ftruncate(&fd, total_size as u64).and_then(|()| unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                total_size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
        });
        let base = match mapped {
            Ok(ptr) => ptr,
            Err(e) => {
                let _ = shm::unlink(name.as_str());
                return Err(e.into());
            }
        };
        let base = NonNull::new(base.cast::<u8>())
            .ok_or_else(|| Error::AllocationFailed("mmap returned null".into()))?;

        let header = ArenaHeader {
            total_size: total_size as u64,
            data_offset: ARENA_HEADER_SIZE as u64,
        };
        // SAFETY: the mapping is at least ARENA_HEADER_SIZE bytes and writable.
        unsafe {
            std::ptr::copy_nonoverlapping(
                header.encode().as_ptr(),
                base.as_ptr(),
                ARENA_HEADER_SIZE,
            );
        }

        let arena = Self {
            shared: Arc::new(ArenaShared {
                id: next_arena_id(),
                stream: stream.to_string(),
                base,
                total_size,
                state: Mutex::new(FreeList::new(
                    ARENA_HEADER_SIZE,
                    total_size - ARENA_HEADER_SIZE,
                )),
            }),
        };
        tracing::debug!(
            stream = %stream,
            shm = %name,
            size = total_size,
            "Created shared-memory arena"
        );
        Ok(arena)
    }

    /// Unlink the shared-memory object of `stream`.
    ///
    /// Existing mappings stay valid until unmapped. A missing object is not
    /// an error.
    pub fn remove(stream: &str) -> Result<()> {
        let name = shm_name(stream)?;
        match shm::unlink(name.as_str()) {
            Ok(()) | Err(Errno::NOENT) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Allocate a 16-byte aligned block of at least `size` bytes.
    ///
    /// Returns `None` when the arena cannot fit the block; callers treat
    /// that as "drop this frame".
    pub fn alloc(&self, size: usize) -> Option<ArenaBlock> {
        let rounded = align_up(size.max(1), ARENA_ALIGN);
        let offset = self.shared.lock().allocate(rounded)?;
        tracing::trace!(stream = %self.shared.stream, offset, size = rounded, "Arena alloc");
        Some(ArenaBlock {
            shared: Arc::clone(&self.shared),
            offset,
            len: size,
        })
    }

    /// Like [`Arena::alloc`], but reports exhaustion as an error.
    pub fn try_alloc(&self, size: usize) -> Result<ArenaBlock> {
        self.alloc(size)
            .ok_or(Error::ArenaExhausted { requested: size })
    }

    /// Translate a pointer inside a live block into its handle.
    ///
    /// Fails with [`Error::InvalidArgument`] if the pointer is outside this
    /// arena instance or not inside a live allocation.
    pub fn handle_of(&self, ptr: *const u8) -> Result<u64> {
        let base = self.shared.base.as_ptr() as usize;
        let addr = ptr as usize;
        if addr < base || addr >= base + self.shared.total_size {
            return Err(Error::InvalidArgument(format!(
                "pointer does not belong to arena {:?}",
                self.shared.stream
            )));
        }
        let offset = addr - base;
        self.shared.lock().containing(offset).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "offset {} is not inside a live allocation of arena {:?}",
                offset, self.shared.stream
            ))
        })?;
        Ok(offset as u64)
    }

    /// Translate a handle back into a local pointer.
    ///
    /// Fails with [`Error::InvalidArgument`] unless the handle points inside
    /// a live allocation.
    pub fn ptr_of(&self, handle: u64) -> Result<*mut u8> {
        let offset = usize::try_from(handle)
            .map_err(|_| Error::InvalidArgument(format!("handle {} out of range", handle)))?;
        self.shared.lock().containing(offset).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "handle {} is not a live allocation of arena {:?}",
                handle, self.shared.stream
            ))
        })?;
        // SAFETY: a live allocation lies inside the mapping.
        Ok(unsafe { self.shared.base.as_ptr().add(offset) })
    }

    /// Process-unique identifier of this arena instance.
    #[inline]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Stream name this arena was created for.
    #[inline]
    pub fn stream(&self) -> &str {
        &self.shared.stream
    }

    /// Total mapped size, header included.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.shared.total_size
    }

    /// Bytes available for blocks.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.total_size - ARENA_HEADER_SIZE
    }

    /// Bytes currently allocated (after alignment rounding).
    pub fn used_bytes(&self) -> usize {
        self.shared.lock().used
    }

    /// Number of live blocks.
    pub fn live_blocks(&self) -> usize {
        self.shared.lock().live.len()
    }

    /// Whether `segment` is a block of this arena instance.
    pub fn owns(&self, segment: &dyn MemorySegment) -> bool {
        segment
            .arena_location()
            .is_some_and(|loc| loc.arena_id == self.shared.id)
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.shared.id)
            .field("stream", &self.shared.stream)
            .field("total_size", &self.shared.total_size)
            .finish()
    }
}

/// One allocation inside an [`Arena`].
///
/// The range returns to the arena when the block is dropped. Share it by
/// wrapping it in a [`Buffer`](crate::buffer::Buffer), which counts holders.
pub struct ArenaBlock {
    shared: Arc<ArenaShared>,
    offset: usize,
    len: usize,
}

impl ArenaBlock {
    /// The block's handle (offset from the arena base).
    #[inline]
    pub fn handle(&self) -> u64 {
        self.offset as u64
    }

    /// Identifier of the owning arena.
    #[inline]
    pub fn arena_id(&self) -> u64 {
        self.shared.id
    }
}

impl Drop for ArenaBlock {
    fn drop(&mut self) {
        self.shared.lock().release(self.offset);
        tracing::trace!(stream = %self.shared.stream, offset = self.offset, "Arena release");
    }
}

impl MemorySegment for ArenaBlock {
    #[inline]
    fn as_ptr(&self) -> *const u8 {
        // SAFETY: offset lies inside the mapping by construction.
        unsafe { self.shared.base.as_ptr().add(self.offset) }
    }

    #[inline]
    fn as_mut_ptr(&self) -> Option<*mut u8> {
        // SAFETY: offset lies inside the mapping by construction.
        Some(unsafe { self.shared.base.as_ptr().add(self.offset) })
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn memory_type(&self) -> MemoryType {
        MemoryType::Arena
    }

    fn arena_location(&self) -> Option<ArenaLocation> {
        Some(ArenaLocation {
            arena_id: self.shared.id,
            offset: self.offset as u64,
        })
    }
}

impl std::fmt::Debug for ArenaBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaBlock")
            .field("arena", &self.shared.stream)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static NAME_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Arena name unique to this process and call.
    pub(crate) fn unique_stream(tag: &str) -> String {
        format!(
            "unit-{}-{}-{}",
            tag,
            std::process::id(),
            NAME_COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    struct Cleanup(String);

    impl Drop for Cleanup {
        fn drop(&mut self) {
            let _ = Arena::remove(&self.0);
        }
    }

    fn arena(tag: &str, size: usize) -> (Arena, Cleanup) {
        let name = unique_stream(tag);
        let arena = Arena::create(&name, size).unwrap();
        (arena, Cleanup(name))
    }

    #[test]
    fn test_free_list_coalesces() {
        let mut list = FreeList::new(64, 256);
        let a = list.allocate(64).unwrap();
        let b = list.allocate(64).unwrap();
        let c = list.allocate(64).unwrap();
        assert_eq!((a, b, c), (64, 128, 192));
        list.release(b);
        list.release(a);
        list.release(c);
        assert_eq!(list.used, 0);
        assert_eq!(list.free.len(), 1);
        assert_eq!(list.free.get(&64), Some(&256));
    }

    #[test]
    fn test_free_list_first_fit_reuses_hole() {
        let mut list = FreeList::new(0, 128);
        let a = list.allocate(32).unwrap();
        let _b = list.allocate(32).unwrap();
        list.release(a);
        assert_eq!(list.allocate(16), Some(0));
        assert_eq!(list.allocate(128), None);
    }

    #[test]
    fn test_header_roundtrip_and_bad_magic() {
        let header = ArenaHeader {
            total_size: 4096,
            data_offset: 64,
        };
        let bytes = header.encode();
        assert_eq!(ArenaHeader::decode(&bytes).unwrap(), header);

        let mut corrupt = bytes;
        corrupt[0] ^= 0xff;
        assert!(matches!(
            ArenaHeader::decode(&corrupt),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_shm_name_validation() {
        assert_eq!(shm_name("cam").unwrap(), "/framelink.cam");
        assert!(shm_name("").is_err());
        assert!(shm_name("a/b").is_err());
    }

    #[test]
    fn test_alloc_is_aligned_and_accounted() {
        let (arena, _cleanup) = arena("align", 64 * 1024);
        let a = arena.alloc(10).unwrap();
        let b = arena.alloc(100).unwrap();
        assert_eq!(a.as_ptr() as usize % ARENA_ALIGN, 0);
        assert_eq!(b.as_ptr() as usize % ARENA_ALIGN, 0);
        assert_eq!(a.len(), 10);
        assert_eq!(arena.used_bytes(), 16 + 112);
        assert_eq!(arena.live_blocks(), 2);
        drop(a);
        drop(b);
        assert_eq!(arena.used_bytes(), 0);
        assert_eq!(arena.live_blocks(), 0);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let (arena, _cleanup) = arena("full", 4096);
        let big = arena.alloc(arena.capacity()).unwrap();
        assert!(arena.alloc(16).is_none());
        assert!(matches!(
            arena.try_alloc(16),
            Err(Error::ArenaExhausted { requested: 16 })
        ));
        drop(big);
        assert!(arena.alloc(16).is_some());
    }

    #[test]
    fn test_handle_roundtrip() {
        let (arena, _cleanup) = arena("handle", 64 * 1024);
        let block = arena.alloc(256).unwrap();
        let handle = arena.handle_of(block.as_ptr()).unwrap();
        assert_eq!(handle, block.handle());
        assert_eq!(arena.ptr_of(handle).unwrap().cast_const(), block.as_ptr());

        let interior = unsafe { block.as_ptr().add(100) };
        let h2 = arena.handle_of(interior).unwrap();
        assert_eq!(arena.ptr_of(h2).unwrap().cast_const(), interior);
    }

    #[test]
    fn test_foreign_pointer_rejected() {
        let (arena, _cleanup) = arena("foreign", 64 * 1024);
        let local = [0u8; 16];
        assert!(matches!(
            arena.handle_of(local.as_ptr()),
            Err(Error::InvalidArgument(_))
        ));
        let block = arena.alloc(32).unwrap();
        let handle = block.handle();
        drop(block);
        assert!(matches!(
            arena.ptr_of(handle),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_block_memory_is_writable() {
        let (arena, _cleanup) = arena("write", 64 * 1024);
        let block = arena.alloc(8).unwrap();
        let ptr = block.as_mut_ptr().unwrap();
        unsafe {
            ptr.write(7);
            assert_eq!(block.as_slice()[0], 7);
        }
        assert!(arena.owns(&block));
        assert_eq!(block.memory_type(), MemoryType::Arena);
    }
}
