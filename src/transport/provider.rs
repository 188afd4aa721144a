//! Publishing side of a stream.
//!
//! A [`Provider`] owns the stream's arena and control socket. Producers
//! call [`Provider::process`]; a single I/O thread multiplexes the listener
//! and every client connection with `poll(2)` and answers requests with the
//! latest frame.

use super::config::TransportConfig;
use super::protocol::{COMMAND_SIZE, Command, FrameDescriptor};
use crate::buffer::Buffer;
use crate::clock::Timestamp;
use crate::error::{Error, Result};
use crate::format::MediaFormat;
use crate::memory::Arena;
use crate::observability::{StreamMetrics, span_connection, span_provider, trace_thread_error};
use crate::sample::{Sample, copy_planes};
use rustix::event::{PollFd, PollFlags, poll};
use rustix::io::Errno;
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Snapshot of a provider's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    /// Open client connections.
    pub connections: usize,
    /// Frames currently held by clients (sum over connections).
    pub held_frames: usize,
    /// Frames accepted by [`Provider::process`].
    pub frames_published: u64,
    /// Frames dropped because the arena was full.
    pub frames_dropped: u64,
    /// Descriptors sent to clients.
    pub frames_delivered: u64,
}

/// The frame clients are served next.
#[derive(Clone)]
struct Published {
    sample: Sample,
    descriptor: FrameDescriptor,
    index: u64,
}

struct ProviderState {
    current: Option<Published>,
    frame_index: u64,
    stop: bool,
    stats: ProviderStats,
}

struct ProviderShared {
    stream: String,
    arena: Arena,
    metrics: StreamMetrics,
    waker: UnixStream,
    state: Mutex<ProviderState>,
}

impl ProviderShared {
    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self) {
        // A full wake pipe already guarantees a pending wakeup.
        match (&self.waker).write(&[1]) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!(stream = %self.stream, error = %e, "Failed to wake I/O thread"),
        }
    }
}

/// Publishing endpoint of a named stream.
///
/// # Example
///
/// ```rust,no_run
/// use framelink::clock::Timestamp;
/// use framelink::format::{MediaFormat, PixelFormat};
/// use framelink::transport::{Provider, TransportConfig};
///
/// let mut provider = Provider::start("camera0", TransportConfig::default())?;
/// let format = MediaFormat::video(PixelFormat::I420, 1280, 720);
///
/// // Allocated in the arena: published without a copy.
/// let frame = provider.alloc_sample(format)?;
/// provider.process(&frame, Timestamp::now())?;
///
/// provider.stop();
/// # Ok::<(), framelink::Error>(())
/// ```
pub struct Provider {
    shared: Arc<ProviderShared>,
    socket_path: PathBuf,
    thread: Option<JoinHandle<()>>,
}

impl Provider {
    /// Create the arena and control socket of `stream` and start serving.
    ///
    /// A socket file left behind under the same path is replaced.
    pub fn start(stream: &str, config: TransportConfig) -> Result<Self> {
        config.validate()?;
        let socket_path = config.socket_path(stream)?;
        std::fs::create_dir_all(&config.socket_dir)?;

        let arena = Arena::create(stream, config.arena_size)?;

        // Remove stale socket file if it exists
        let _ = std::fs::remove_file(&socket_path);
        let listener = match UnixListener::bind(&socket_path) {
            Ok(listener) => listener,
            Err(e) => {
                let _ = Arena::remove(stream);
                return Err(e.into());
            }
        };
        listener.set_nonblocking(true)?;

        let (waker, wake_rx) = UnixStream::pair()?;
        waker.set_nonblocking(true)?;
        wake_rx.set_nonblocking(true)?;

        let shared = Arc::new(ProviderShared {
            stream: stream.to_string(),
            metrics: StreamMetrics::new(stream),
            arena,
            waker,
            state: Mutex::new(ProviderState {
                current: None,
                frame_index: 0,
                stop: false,
                stats: ProviderStats::default(),
            }),
        });

        let io = IoLoop {
            shared: Arc::clone(&shared),
            listener,
            wake_rx,
            connections: Vec::new(),
            next_connection_id: 0,
        };
        let thread = std::thread::Builder::new()
            .name(format!("framelink-provider-{}", stream))
            .spawn(move || io.run());
        let thread = match thread {
            Ok(handle) => handle,
            Err(e) => {
                let _ = std::fs::remove_file(&socket_path);
                let _ = Arena::remove(stream);
                return Err(e.into());
            }
        };

        info!(
            stream = %stream,
            socket = %socket_path.display(),
            arena_size = shared.arena.total_size(),
            "Provider started"
        );

        Ok(Self {
            shared,
            socket_path,
            thread: Some(thread),
        })
    }

    /// Publish `sample` as the stream's latest frame.
    ///
    /// Samples already living in this provider's arena are published
    /// without a copy. Anything else is copied into a fresh arena block;
    /// when the arena cannot fit it the frame is dropped, counted, and
    /// `Ok(())` is returned. Clients waiting for a frame are served
    /// immediately.
    pub fn process(&self, sample: &Sample, timestamp: Timestamp) -> Result<()> {
        let shared = &self.shared;
        let published = if shared.arena.owns(&**sample.buffer().memory().segment()) {
            sample.dup()
        } else {
            match self.copy_into_arena(sample)? {
                Some(copy) => copy,
                None => {
                    warn!(
                        stream = %shared.stream,
                        format = %sample.format(),
                        used = shared.arena.used_bytes(),
                        "Arena full, dropping frame"
                    );
                    shared.metrics.record_dropped();
                    shared.lock().stats.frames_dropped += 1;
                    return Ok(());
                }
            }
        };

        let handle = published
            .buffer()
            .memory()
            .arena_location()
            .map(|loc| loc.offset)
            .ok_or_else(|| Error::InvalidArgument("published sample is not arena-backed".into()))?;
        let descriptor = FrameDescriptor::for_sample(handle, timestamp, &published)?;

        {
            let mut state = shared.lock();
            if state.stop {
                return Err(Error::InvalidArgument("provider is stopped".into()));
            }
            state.frame_index += 1;
            let index = state.frame_index;
            state.current = Some(Published {
                sample: published,
                descriptor,
                index,
            });
            state.stats.frames_published += 1;
        }
        shared.metrics.record_published();
        shared.metrics.record_arena_used(shared.arena.used_bytes());
        shared.wake();
        Ok(())
    }

    fn copy_into_arena(&self, sample: &Sample) -> Result<Option<Sample>> {
        let format = *sample.format();
        let (_, size) = format.canonical_layout()?;
        let Some(block) = self.shared.arena.alloc(size) else {
            return Ok(None);
        };
        let mut copy = Sample::with_canonical_layout(Buffer::from_segment(block), format)?;
        copy_planes(sample, &mut copy)?;
        Ok(Some(copy))
    }

    /// Allocate a writable sample of `format` inside the arena.
    ///
    /// Filling it and passing it to [`process`](Self::process) publishes
    /// it without a copy.
    pub fn alloc_sample(&self, format: MediaFormat) -> Result<Sample> {
        let (_, size) = format.canonical_layout()?;
        let block = self.shared.arena.try_alloc(size)?;
        Sample::with_canonical_layout(Buffer::from_segment(block), format)
    }

    /// The provider's arena.
    pub fn arena(&self) -> &Arena {
        &self.shared.arena
    }

    /// Stream name.
    pub fn stream(&self) -> &str {
        &self.shared.stream
    }

    /// Control socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ProviderStats {
        self.shared.lock().stats
    }

    /// Stop serving: close every connection, remove the socket file and
    /// unlink the arena. Idempotent.
    ///
    /// Frames still referenced by the application stay valid; clients
    /// keep their mapping until they reconnect.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        {
            let mut state = self.shared.lock();
            state.stop = true;
            state.current = None;
        }
        self.shared.wake();
        if thread.join().is_err() {
            warn!(stream = %self.shared.stream, "Provider I/O thread panicked");
        }

        let _ = std::fs::remove_file(&self.socket_path);
        if let Err(e) = Arena::remove(&self.shared.stream) {
            warn!(stream = %self.shared.stream, error = %e, "Failed to unlink arena");
        }
        info!(stream = %self.shared.stream, "Provider stopped");
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// I/O thread
// ============================================================================

struct Connection {
    id: u64,
    socket: UnixStream,
    inbox: Vec<u8>,
    outbox: Vec<u8>,
    /// Frames sent and not yet freed, keyed by handle.
    held: HashMap<u64, Vec<Sample>>,
    last_index: u64,
    starving: bool,
    closed: bool,
}

impl Connection {
    fn new(id: u64, socket: UnixStream) -> Self {
        Self {
            id,
            socket,
            inbox: Vec::with_capacity(COMMAND_SIZE * 4),
            outbox: Vec::new(),
            held: HashMap::new(),
            last_index: 0,
            starving: false,
            closed: false,
        }
    }

    fn held_count(&self) -> usize {
        self.held.values().map(Vec::len).sum()
    }

    /// Drain readable bytes into complete commands.
    fn read_commands(&mut self) -> Result<Vec<Command>> {
        let mut chunk = [0u8; 256];
        loop {
            match self.socket.read(&mut chunk) {
                Ok(0) => return Err(Error::Io(ErrorKind::UnexpectedEof.into())),
                Ok(n) => self.inbox.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let whole = self.inbox.len() / COMMAND_SIZE * COMMAND_SIZE;
        let mut commands = Vec::with_capacity(whole / COMMAND_SIZE);
        for raw in self.inbox[..whole].chunks_exact(COMMAND_SIZE) {
            let mut bytes = [0u8; COMMAND_SIZE];
            bytes.copy_from_slice(raw);
            commands.push(Command::decode(&bytes)?);
        }
        self.inbox.drain(..whole);
        Ok(commands)
    }

    fn free(&mut self, stream: &str, handle: u64) {
        let released = match self.held.get_mut(&handle) {
            Some(frames) => {
                frames.pop();
                if frames.is_empty() {
                    self.held.remove(&handle);
                }
                true
            }
            None => false,
        };
        if !released {
            debug!(stream = %stream, connection = self.id, handle, "FREE for unknown handle ignored");
        }
    }

    fn send(&mut self, frame: &Published, metrics: &StreamMetrics) -> Result<()> {
        let skipped = if self.last_index == 0 {
            0
        } else {
            frame.index - self.last_index - 1
        };
        self.outbox.extend_from_slice(&frame.descriptor.encode());
        self.held
            .entry(frame.descriptor.handle)
            .or_default()
            .push(frame.sample.dup());
        self.last_index = frame.index;
        self.starving = false;
        metrics.record_delivered(skipped);
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        while !self.outbox.is_empty() {
            match self.socket.write(&self.outbox) {
                Ok(0) => return Err(Error::Io(ErrorKind::WriteZero.into())),
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

struct IoLoop {
    shared: Arc<ProviderShared>,
    listener: UnixListener,
    wake_rx: UnixStream,
    connections: Vec<Connection>,
    next_connection_id: u64,
}

impl IoLoop {
    fn run(mut self) {
        let _span = span_provider(&self.shared.stream).entered();
        if let Err(e) = self.serve() {
            trace_thread_error("provider", &e);
        }
        let held: usize = self.connections.iter().map(Connection::held_count).sum();
        debug!(
            connections = self.connections.len(),
            held,
            "Closing client connections"
        );
        self.connections.clear();
    }

    fn serve(&mut self) -> Result<()> {
        loop {
            if self.shared.lock().stop {
                return Ok(());
            }

            let revents: Vec<PollFlags> = {
                let mut fds = Vec::with_capacity(self.connections.len() + 2);
                fds.push(PollFd::new(&self.wake_rx, PollFlags::IN));
                fds.push(PollFd::new(&self.listener, PollFlags::IN));
                for conn in &self.connections {
                    let mut flags = PollFlags::IN;
                    if !conn.outbox.is_empty() {
                        flags |= PollFlags::OUT;
                    }
                    fds.push(PollFd::new(&conn.socket, flags));
                }
                match poll(&mut fds, None) {
                    Ok(_) => {}
                    Err(Errno::INTR) => continue,
                    Err(e) => return Err(e.into()),
                }
                fds.iter().map(PollFd::revents).collect()
            };

            if revents[0].intersects(PollFlags::IN) {
                self.drain_waker();
            }

            // Index by pre-accept position; new connections are appended.
            for (conn, events) in self.connections.iter_mut().zip(&revents[2..]) {
                if events.is_empty() {
                    continue;
                }
                let _span = span_connection(&self.shared.stream, conn.id).entered();
                if let Err(e) = Self::service(&self.shared, conn, *events) {
                    match e {
                        Error::Protocol(_) => warn!(error = %e, "Closing connection on protocol error"),
                        ref e if e.is_connection_fault() => debug!(error = %e, "Connection closed"),
                        _ => warn!(error = %e, "Closing connection after failure"),
                    }
                    conn.closed = true;
                }
            }

            if revents[1].intersects(PollFlags::IN) {
                self.accept_all();
            }

            self.feed_starving();
            self.reap_closed();
            self.publish_stats();
        }
    }

    fn drain_waker(&mut self) {
        let mut sink = [0u8; 64];
        loop {
            match self.wake_rx.read(&mut sink) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }

    /// Accept every pending connection. Failures affect only the socket
    /// concerned.
    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((socket, _)) => {
                    if let Err(e) = socket.set_nonblocking(true) {
                        warn!(error = %e, "Dropping accepted socket");
                        continue;
                    }
                    self.next_connection_id += 1;
                    let id = self.next_connection_id;
                    info!(connection = id, "Client connected");
                    self.connections.push(Connection::new(id, socket));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    return;
                }
            }
        }
    }

    fn service(shared: &ProviderShared, conn: &mut Connection, events: PollFlags) -> Result<()> {
        if events.intersects(PollFlags::OUT) {
            conn.flush()?;
        }
        if !events.intersects(PollFlags::IN | PollFlags::HUP | PollFlags::ERR) {
            return Ok(());
        }

        for command in conn.read_commands()? {
            let wants_frame = match command {
                Command::Request => true,
                Command::Free(handle) => {
                    conn.free(&shared.stream, handle);
                    false
                }
                Command::FreeAndRequest(handle) => {
                    conn.free(&shared.stream, handle);
                    true
                }
            };
            if !wants_frame {
                continue;
            }

            let current = shared.lock().current.clone();
            match current {
                Some(frame) if frame.index > conn.last_index => {
                    conn.send(&frame, &shared.metrics)?;
                    shared.lock().stats.frames_delivered += 1;
                }
                _ => conn.starving = true,
            }
        }
        Ok(())
    }

    fn feed_starving(&mut self) {
        if !self.connections.iter().any(|c| c.starving && !c.closed) {
            return;
        }
        let Some(frame) = self.shared.lock().current.clone() else {
            return;
        };
        for conn in self.connections.iter_mut() {
            if !conn.starving || conn.closed || frame.index <= conn.last_index {
                continue;
            }
            let _span = span_connection(&self.shared.stream, conn.id).entered();
            match conn.send(&frame, &self.shared.metrics) {
                Ok(()) => self.shared.lock().stats.frames_delivered += 1,
                Err(e) => {
                    debug!(error = %e, "Connection closed while delivering");
                    conn.closed = true;
                }
            }
        }
    }

    fn reap_closed(&mut self) {
        self.connections.retain(|conn| {
            if conn.closed {
                info!(
                    connection = conn.id,
                    released = conn.held_count(),
                    "Client disconnected"
                );
            }
            !conn.closed
        });
    }

    fn publish_stats(&self) {
        let held = self.connections.iter().map(Connection::held_count).sum();
        {
            let mut state = self.shared.lock();
            state.stats.connections = self.connections.len();
            state.stats.held_frames = held;
        }
        self.shared
            .metrics
            .record_arena_used(self.shared.arena.used_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use crate::memory::unique_stream;
    use crate::transport::protocol::DESCRIPTOR_SIZE;
    use std::time::{Duration, Instant};

    fn config(dir: &Path) -> TransportConfig {
        TransportConfig::default()
            .with_socket_dir(dir)
            .with_arena_size(4 * 1024 * 1024)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn request(socket: &mut UnixStream, command: Command) -> FrameDescriptor {
        socket.write_all(&command.encode()).unwrap();
        let mut raw = [0u8; DESCRIPTOR_SIZE];
        socket.read_exact(&mut raw).unwrap();
        FrameDescriptor::decode(&raw).unwrap()
    }

    #[test]
    fn test_start_creates_socket_and_stop_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let stream = unique_stream("prov-start");
        let mut provider = Provider::start(&stream, config(dir.path())).unwrap();
        assert!(provider.socket_path().exists());
        provider.stop();
        assert!(!provider.socket_path().exists());
        provider.stop();
    }

    #[test]
    fn test_alloc_sample_is_published_without_copy() {
        let dir = tempfile::tempdir().unwrap();
        let stream = unique_stream("prov-zero");
        let provider = Provider::start(&stream, config(dir.path())).unwrap();

        let format = MediaFormat::video(PixelFormat::Gray8, 64, 32);
        let sample = provider.alloc_sample(format).unwrap();
        let blocks = provider.arena().live_blocks();
        provider.process(&sample, Timestamp::from_micros(1)).unwrap();
        assert_eq!(provider.arena().live_blocks(), blocks);

        let heap = Sample::new(format).unwrap();
        provider.process(&heap, Timestamp::from_micros(2)).unwrap();
        assert_eq!(provider.arena().live_blocks(), blocks + 1);
        assert_eq!(provider.stats().frames_published, 2);
    }

    #[test]
    fn test_exhausted_arena_drops_frame() {
        let dir = tempfile::tempdir().unwrap();
        let stream = unique_stream("prov-drop");
        let provider =
            Provider::start(&stream, config(dir.path()).with_arena_size(8 * 1024)).unwrap();

        let big = Sample::new_video(PixelFormat::Bgra, 256, 256).unwrap();
        provider.process(&big, Timestamp::ZERO).unwrap();
        let stats = provider.stats();
        assert_eq!(stats.frames_published, 0);
        assert_eq!(stats.frames_dropped, 1);
        assert!(provider.alloc_sample(*big.format()).is_err());
    }

    #[test]
    fn test_vanishing_clients_do_not_stop_serving() {
        let dir = tempfile::tempdir().unwrap();
        let stream = unique_stream("prov-vanish");
        let provider = Provider::start(&stream, config(dir.path())).unwrap();

        for _ in 0..32 {
            drop(UnixStream::connect(provider.socket_path()).unwrap());
        }
        let sample = Sample::new_video(PixelFormat::Gray8, 8, 8).unwrap();
        provider.process(&sample, Timestamp::from_micros(3)).unwrap();

        let mut socket = UnixStream::connect(provider.socket_path()).unwrap();
        let desc = request(&mut socket, Command::Request);
        assert_eq!(desc.timestamp, Timestamp::from_micros(3));
        assert!(wait_for(|| provider.stats().connections == 1));
    }

    #[test]
    fn test_starving_connection_skips_dropped_frame() {
        let dir = tempfile::tempdir().unwrap();
        let stream = unique_stream("prov-starve-drop");
        let provider =
            Provider::start(&stream, config(dir.path()).with_arena_size(8 * 1024)).unwrap();

        let mut socket = UnixStream::connect(provider.socket_path()).unwrap();
        socket.write_all(&Command::Request.encode()).unwrap();
        assert!(wait_for(|| provider.stats().connections == 1));

        let big = Sample::new_video(PixelFormat::Bgra, 256, 256).unwrap();
        provider.process(&big, Timestamp::from_micros(1)).unwrap();
        assert_eq!(provider.stats().frames_dropped, 1);

        socket.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut raw = [0u8; DESCRIPTOR_SIZE];
        assert!(socket.read_exact(&mut raw).is_err());

        let small = Sample::new_video(PixelFormat::Gray8, 16, 16).unwrap();
        provider.process(&small, Timestamp::from_micros(2)).unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        socket.read_exact(&mut raw).unwrap();
        let desc = FrameDescriptor::decode(&raw).unwrap();
        assert_eq!(desc.timestamp, Timestamp::from_micros(2));
        assert_eq!(desc.format, *small.format());
    }

    #[test]
    fn test_request_waits_for_newer_frame() {
        let dir = tempfile::tempdir().unwrap();
        let stream = unique_stream("prov-wait");
        let provider = Provider::start(&stream, config(dir.path())).unwrap();
        let format = MediaFormat::video(PixelFormat::Gray8, 16, 16);

        let mut socket = UnixStream::connect(provider.socket_path()).unwrap();
        let first = provider.alloc_sample(format).unwrap();
        provider.process(&first, Timestamp::from_micros(10)).unwrap();
        let desc = request(&mut socket, Command::Request);
        assert_eq!(desc.timestamp, Timestamp::from_micros(10));

        // Nothing newer: the request parks until the next publish.
        socket.write_all(&Command::FreeAndRequest(desc.handle).encode()).unwrap();
        assert!(wait_for(|| provider.stats().held_frames == 0));

        provider
            .process(&Sample::new(format).unwrap(), Timestamp::from_micros(20))
            .unwrap();
        let mut raw = [0u8; DESCRIPTOR_SIZE];
        socket.read_exact(&mut raw).unwrap();
        let desc = FrameDescriptor::decode(&raw).unwrap();
        assert_eq!(desc.timestamp, Timestamp::from_micros(20));
        assert!(wait_for(|| provider.stats().held_frames == 1));
    }

    #[test]
    fn test_unknown_opcode_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let stream = unique_stream("prov-proto");
        let provider = Provider::start(&stream, config(dir.path())).unwrap();

        let mut socket = UnixStream::connect(provider.socket_path()).unwrap();
        assert!(wait_for(|| provider.stats().connections == 1));
        let mut bad = [0u8; COMMAND_SIZE];
        bad[0] = 42;
        socket.write_all(&bad).unwrap();
        assert!(wait_for(|| provider.stats().connections == 0));

        let mut rest = Vec::new();
        assert_eq!(socket.read_to_end(&mut rest).unwrap_or(0), 0);
    }

    #[test]
    fn test_disconnect_releases_held_frames() {
        let dir = tempfile::tempdir().unwrap();
        let stream = unique_stream("prov-hold");
        let provider = Provider::start(&stream, config(dir.path())).unwrap();
        let format = MediaFormat::video(PixelFormat::Rgba, 32, 32);

        let mut socket = UnixStream::connect(provider.socket_path()).unwrap();
        provider
            .process(&Sample::new(format).unwrap(), Timestamp::from_micros(1))
            .unwrap();
        request(&mut socket, Command::Request);
        provider
            .process(&Sample::new(format).unwrap(), Timestamp::from_micros(2))
            .unwrap();

        // Current frame plus the one the client holds.
        assert_eq!(provider.arena().live_blocks(), 2);
        drop(socket);
        assert!(wait_for(|| provider.arena().live_blocks() == 1));
    }
}
