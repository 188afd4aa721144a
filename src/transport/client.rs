//! Consuming side of a stream.

use super::config::TransportConfig;
use super::protocol::{COMMAND_SIZE, Command, DESCRIPTOR_SIZE, FrameDescriptor};
use super::FrameSink;
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::format::MediaFormat;
use crate::memory::{ArenaMapping, MappedFrame};
use crate::observability::{StreamMetrics, span_client};
use crate::sample::Sample;
use rustix::event::{PollFd, PollFlags, poll};
use rustix::io::Errno;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Snapshot of a client's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Whether a provider connection is currently open.
    pub connected: bool,
    /// Frames handed to the sink.
    pub frames_received: u64,
    /// Reconnect attempts after a lost or refused connection.
    pub reconnects: u64,
}

struct ClientState {
    stop: bool,
    generation: u64,
    /// Handles released by the application, tagged with their connection.
    pending_free: Vec<(u64, u64)>,
    stats: ClientStats,
}

struct ClientShared {
    stream: String,
    socket_path: PathBuf,
    retry_interval: Duration,
    metrics: StreamMetrics,
    state: Mutex<ClientState>,
    wakeup: Condvar,
    /// Written by `stop` to interrupt a read in progress.
    waker: UnixStream,
    wake_rx: UnixStream,
}

impl ClientShared {
    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hook run when the application drops a frame. It keeps the frame's
    /// connection open: the provider holds a connection's frames until it
    /// closes, so the block cannot be reused while the frame is readable.
    fn release_hook(
        self: &Arc<Self>,
        generation: u64,
        handle: u64,
        connection: Arc<UnixStream>,
    ) -> impl FnOnce() + Send + Sync + 'static {
        let weak: Weak<Self> = Arc::downgrade(self);
        move || {
            let _connection = connection;
            if let Some(shared) = weak.upgrade() {
                shared.lock().pending_free.push((generation, handle));
            }
        }
    }

    /// Pending frees of the current connection. Frees of an older
    /// connection are discarded; closing it releases them all.
    fn take_pending(&self, generation: u64) -> Vec<u64> {
        let mut state = self.lock();
        state
            .pending_free
            .drain(..)
            .filter(|(g, _)| *g == generation)
            .map(|(_, handle)| handle)
            .collect()
    }
}

/// Receiving endpoint of a named stream.
///
/// A background thread connects to the provider, requests frames one at a
/// time and hands them to a [`FrameSink`]. Each frame maps the provider's
/// arena read-only; dropping the last [`Sample`] clone tells the provider
/// to release it. A connection that ended stays open until the application
/// dropped every frame received on it. Lost connections are retried every `retry_interval`
/// until [`stop`](Self::stop).
///
/// # Example
///
/// ```rust,no_run
/// use framelink::clock::Timestamp;
/// use framelink::sample::Sample;
/// use framelink::transport::{Client, TransportConfig};
///
/// let mut client = Client::start("camera0", TransportConfig::default(), |frame: Sample, ts: Timestamp| {
///     println!("{}x{} at {}", frame.width(), frame.height(), ts);
/// })?;
///
/// // ...
/// client.stop();
/// # Ok::<(), framelink::Error>(())
/// ```
pub struct Client {
    shared: Arc<ClientShared>,
    thread: Option<JoinHandle<()>>,
}

impl Client {
    /// Start receiving `stream`, delivering frames to `sink`.
    ///
    /// Returns immediately; a provider that is not running yet is retried.
    pub fn start(stream: &str, config: TransportConfig, sink: impl FrameSink) -> Result<Self> {
        config.validate()?;
        let socket_path = config.socket_path(stream)?;
        let (waker, wake_rx) = UnixStream::pair()?;
        waker.set_nonblocking(true)?;
        let shared = Arc::new(ClientShared {
            stream: stream.to_string(),
            socket_path,
            retry_interval: config.retry_interval,
            metrics: StreamMetrics::new(stream),
            state: Mutex::new(ClientState {
                stop: false,
                generation: 0,
                pending_free: Vec::new(),
                stats: ClientStats::default(),
            }),
            wakeup: Condvar::new(),
            waker,
            wake_rx,
        });

        let worker = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name(format!("framelink-client-{}", stream))
            .spawn(move || run(worker, sink))?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Stream name.
    pub fn stream(&self) -> &str {
        &self.shared.stream
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ClientStats {
        self.shared.lock().stats
    }

    /// Stop requesting frames and join the I/O thread. Idempotent.
    ///
    /// Frames the application still holds stay readable and unchanged; the
    /// connection closes once the last of them is dropped.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.shared.lock().stop = true;
        self.shared.wakeup.notify_all();
        if let Err(e) = (&self.shared.waker).write(&[1]) {
            if e.kind() != ErrorKind::WouldBlock {
                warn!(stream = %self.shared.stream, error = %e, "Failed to wake I/O thread");
            }
        }
        if thread.join().is_err() {
            warn!(stream = %self.shared.stream, "Client I/O thread panicked");
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: Arc<ClientShared>, mut sink: impl FrameSink) {
    let _span = span_client(&shared.stream).entered();
    let mut last_format: Option<MediaFormat> = None;
    let mut generation = 0u64;

    loop {
        generation += 1;
        let outcome = session(&shared, generation, &mut sink, &mut last_format);

        let mut state = shared.lock();
        state.stats.connected = false;
        if state.stop {
            break;
        }
        match outcome {
            Ok(()) => break,
            Err(e) => {
                if generation == 1 || state.stats.frames_received > 0 {
                    warn!(error = %e, retry_in = ?shared.retry_interval, "Provider unavailable");
                } else {
                    debug!(error = %e, "Reconnect failed");
                }
            }
        }

        let (mut state, _) = shared
            .wakeup
            .wait_timeout_while(state, shared.retry_interval, |s| !s.stop)
            .unwrap_or_else(PoisonError::into_inner);
        if state.stop {
            break;
        }
        state.stats.reconnects += 1;
        drop(state);
        shared.metrics.record_reconnect();
    }
    debug!("Client I/O thread exiting");
}

fn session(
    shared: &Arc<ClientShared>,
    generation: u64,
    sink: &mut impl FrameSink,
    last_format: &mut Option<MediaFormat>,
) -> Result<()> {
    let socket = Arc::new(UnixStream::connect(&shared.socket_path)?);
    let mapping = ArenaMapping::open(&shared.stream)?;
    {
        let mut state = shared.lock();
        if state.stop {
            return Ok(());
        }
        state.generation = generation;
        state.stats.connected = true;
    }
    info!(arena_size = mapping.total_size(), "Connected to provider");

    let mut raw = [0u8; DESCRIPTOR_SIZE];
    loop {
        let frees = shared.take_pending(generation);
        let mut out = Vec::with_capacity((frees.len() + 1) * COMMAND_SIZE);
        match frees.split_last() {
            Some((&last, rest)) => {
                for &handle in rest {
                    out.extend_from_slice(&Command::Free(handle).encode());
                }
                out.extend_from_slice(&Command::FreeAndRequest(last).encode());
            }
            None => out.extend_from_slice(&Command::Request.encode()),
        }
        (&*socket).write_all(&out)?;

        if !read_descriptor(shared, &socket, &mut raw)? {
            return Ok(());
        }
        let descriptor = FrameDescriptor::decode(&raw)?;
        let len = descriptor.required_len()?;
        let frame = MappedFrame::new(Arc::clone(&mapping), descriptor.handle, len)
            .map_err(|e| Error::Protocol(format!("descriptor outside arena: {}", e)))?
            .with_release(shared.release_hook(generation, descriptor.handle, Arc::clone(&socket)));
        let sample = Sample::from_buffer(Buffer::from_segment(frame), descriptor.format, &descriptor.planes)?;

        if last_format.as_ref() != Some(&descriptor.format) {
            debug!(format = %descriptor.format, "Format changed");
            sink.on_format(&descriptor.format);
            *last_format = Some(descriptor.format);
        }
        shared.lock().stats.frames_received += 1;
        sink.on_frame(sample, descriptor.timestamp);
    }
}

/// Fill `raw` from `socket`. Returns `false` once the client is stopping.
fn read_descriptor(shared: &ClientShared, socket: &UnixStream, raw: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < raw.len() {
        let (ready, stopping) = {
            let mut fds = [
                PollFd::new(socket, PollFlags::IN),
                PollFd::new(&shared.wake_rx, PollFlags::IN),
            ];
            match poll(&mut fds, None) {
                Ok(_) => {}
                Err(Errno::INTR) => continue,
                Err(e) => return Err(e.into()),
            }
            (fds[0].revents(), fds[1].revents().intersects(PollFlags::IN))
        };
        // Only `stop` writes to the waker.
        if stopping {
            return Ok(false);
        }
        if !ready.intersects(PollFlags::IN | PollFlags::HUP | PollFlags::ERR) {
            continue;
        }
        match (&*socket).read(&mut raw[filled..]) {
            Ok(0) => return Err(Error::Io(ErrorKind::UnexpectedEof.into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
