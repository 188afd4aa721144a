//! End-to-end tests of the local transport: a provider and its clients in
//! one process, talking over the real socket and shared memory.

use framelink::clock::Timestamp;
use framelink::format::{MediaFormat, PixelFormat, SampleFormat};
use framelink::sample::Sample;
use framelink::transport::protocol::{Command, DESCRIPTOR_SIZE, FrameDescriptor};
use framelink::transport::{Client, Provider, TransportConfig};
use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

static STREAM_COUNTER: AtomicUsize = AtomicUsize::new(0);

const TIMEOUT: Duration = Duration::from_secs(5);

fn unique_stream(tag: &str) -> String {
    format!(
        "e2e-{}-{}-{}",
        tag,
        std::process::id(),
        STREAM_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Log output for failing runs, filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(dir: &std::path::Path) -> TransportConfig {
    init_tracing();
    TransportConfig::default()
        .with_socket_dir(dir)
        .with_arena_size(32 * 1024 * 1024)
        .with_retry_interval(Duration::from_millis(20))
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

fn send(socket: &mut UnixStream, command: Command) {
    socket.write_all(&command.encode()).unwrap();
}

fn receive(socket: &mut UnixStream) -> FrameDescriptor {
    let mut raw = [0u8; DESCRIPTOR_SIZE];
    socket.read_exact(&mut raw).unwrap();
    FrameDescriptor::decode(&raw).unwrap()
}

fn gray(value: u8) -> Sample {
    let mut sample = Sample::new_video(PixelFormat::Gray8, 32, 16).unwrap();
    sample.data_mut().unwrap().fill(value);
    sample
}

// ============================================================================
// Delivery
// ============================================================================

/// A client connected before publication receives the frame as published.
#[test]
fn test_scenario_a_full_hd_frame() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("a");
    let provider = Provider::start(&stream, config(dir.path())).unwrap();

    let (tx, rx) = mpsc::channel();
    let mut client = Client::start(&stream, config(dir.path()), move |frame: Sample, ts: Timestamp| {
        let _ = tx.send((frame, ts));
    })
    .unwrap();
    assert!(wait_until(|| provider.stats().connections == 1));

    let format = MediaFormat::video(PixelFormat::I420, 1920, 1080);
    let mut frame = provider.alloc_sample(format).unwrap();
    frame.row_mut(0, 540).unwrap().fill(0x11);
    frame.row_mut(2, 270).unwrap().fill(0x22);
    provider.process(&frame, Timestamp::from_micros(1000)).unwrap();

    let (received, ts) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(ts, Timestamp::from_micros(1000));
    assert_eq!((received.width(), received.height()), (1920, 1080));
    assert_eq!(received.planes(), frame.planes());
    assert_eq!(received.row(0, 540).unwrap(), frame.row(0, 540).unwrap());
    assert_eq!(received.row(2, 270).unwrap(), &[0x22; 960][..]);

    drop(received);
    client.stop();
}

/// Two frames published before the first request: only the newer one is
/// delivered.
#[test]
fn test_scenario_b_latest_wins() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("b");
    let provider = Provider::start(&stream, config(dir.path())).unwrap();

    provider.process(&gray(1), Timestamp::from_micros(1000)).unwrap();
    provider.process(&gray(2), Timestamp::from_micros(1200)).unwrap();

    let mut socket = UnixStream::connect(provider.socket_path()).unwrap();
    send(&mut socket, Command::Request);
    let desc = receive(&mut socket);
    assert_eq!(desc.timestamp, Timestamp::from_micros(1200));
    assert_eq!(desc.format, MediaFormat::video(PixelFormat::Gray8, 32, 16));
}

/// A second request without a new frame waits rather than repeating the
/// last one.
#[test]
fn test_no_repeat_without_new_frame() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("repeat");
    let provider = Provider::start(&stream, config(dir.path())).unwrap();
    provider.process(&gray(1), Timestamp::from_micros(1)).unwrap();

    let mut socket = UnixStream::connect(provider.socket_path()).unwrap();
    send(&mut socket, Command::Request);
    let first = receive(&mut socket);

    send(&mut socket, Command::Request);
    socket.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    let mut raw = [0u8; DESCRIPTOR_SIZE];
    let err = socket.read_exact(&mut raw).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));

    socket.set_read_timeout(Some(TIMEOUT)).unwrap();
    provider.process(&gray(2), Timestamp::from_micros(2)).unwrap();
    let second = receive(&mut socket);
    assert_eq!(second.timestamp, Timestamp::from_micros(2));
    assert_ne!(second.handle, first.handle);
}

#[test]
fn test_audio_format_survives_wire() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("audio");
    let provider = Provider::start(&stream, config(dir.path())).unwrap();

    let (tx, rx) = mpsc::channel();
    let _client = Client::start(&stream, config(dir.path()), move |frame: Sample, _: Timestamp| {
        let _ = tx.send(*frame.format());
    })
    .unwrap();

    let audio = Sample::new_audio(SampleFormat::F32Planar, 960, 2, 48_000).unwrap();
    provider.process(&audio, Timestamp::from_micros(5)).unwrap();
    let format = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(format, MediaFormat::audio(SampleFormat::F32Planar, 960, 2, 48_000));
}

#[test]
fn test_multiple_clients_receive_same_frame() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("fanout");
    let provider = Provider::start(&stream, config(dir.path())).unwrap();

    let (tx, rx) = mpsc::channel();
    let clients: Vec<Client> = (0..3)
        .map(|id| {
            let tx = tx.clone();
            Client::start(&stream, config(dir.path()), move |frame: Sample, ts: Timestamp| {
                let _ = tx.send((id, frame.row(0, 0).map(|r| r[0]), ts));
            })
            .unwrap()
        })
        .collect();
    assert!(wait_until(|| provider.stats().connections == 3));

    provider.process(&gray(0x42), Timestamp::from_micros(9)).unwrap();
    let mut seen = Vec::new();
    for _ in 0..3 {
        let (id, first_byte, ts) = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(first_byte, Some(0x42));
        assert_eq!(ts, Timestamp::from_micros(9));
        seen.push(id);
    }
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2]);
    drop(clients);
}

// ============================================================================
// Failure handling
// ============================================================================

/// A dropped connection releases everything it held while the provider
/// keeps serving other connections.
#[test]
fn test_scenario_d_dropped_connection_releases_frames() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("d");
    let mut provider = Provider::start(&stream, config(dir.path())).unwrap();
    let baseline = provider.arena().live_blocks();

    let mut doomed = UnixStream::connect(provider.socket_path()).unwrap();
    let mut survivor = UnixStream::connect(provider.socket_path()).unwrap();

    provider.process(&gray(1), Timestamp::from_micros(1)).unwrap();
    send(&mut doomed, Command::Request);
    send(&mut survivor, Command::Request);
    let first = receive(&mut doomed);
    assert_eq!(receive(&mut survivor).handle, first.handle);

    provider.process(&gray(2), Timestamp::from_micros(2)).unwrap();
    assert_eq!(provider.arena().live_blocks(), baseline + 2);

    doomed.shutdown(Shutdown::Both).unwrap();
    drop(doomed);

    send(&mut survivor, Command::FreeAndRequest(first.handle));
    let second = receive(&mut survivor);
    assert_eq!(second.timestamp, Timestamp::from_micros(2));

    // Frame 1 had no holder left besides the dropped connection.
    assert!(wait_until(|| provider.arena().live_blocks() == baseline + 1));
    assert!(wait_until(|| provider.stats().connections == 1));

    drop(survivor);
    assert!(wait_until(|| provider.stats().held_frames == 0));
    provider.stop();
    assert_eq!(provider.arena().live_blocks(), baseline);
}

#[test]
fn test_protocol_violation_only_affects_offender() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("proto");
    let provider = Provider::start(&stream, config(dir.path())).unwrap();
    provider.process(&gray(3), Timestamp::from_micros(3)).unwrap();

    let mut bad = UnixStream::connect(provider.socket_path()).unwrap();
    let mut good = UnixStream::connect(provider.socket_path()).unwrap();
    bad.write_all(&[0xff; 16]).unwrap();
    assert!(wait_until(|| provider.stats().connections == 1));

    send(&mut good, Command::Request);
    assert_eq!(receive(&mut good).timestamp, Timestamp::from_micros(3));
}

#[test]
fn test_free_of_unknown_handle_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("unknown");
    let provider = Provider::start(&stream, config(dir.path())).unwrap();
    provider.process(&gray(4), Timestamp::from_micros(4)).unwrap();

    let mut socket = UnixStream::connect(provider.socket_path()).unwrap();
    send(&mut socket, Command::Free(123_456));
    send(&mut socket, Command::FreeAndRequest(7));
    assert_eq!(receive(&mut socket).timestamp, Timestamp::from_micros(4));
    assert_eq!(provider.stats().connections, 1);
}

/// The client reconnects to a restarted provider, and frames from the old
/// one stay readable.
#[test]
fn test_client_survives_provider_restart() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("restart");
    let mut provider = Provider::start(&stream, config(dir.path())).unwrap();

    let (tx, rx) = mpsc::channel();
    let mut client = Client::start(&stream, config(dir.path()), move |frame: Sample, ts: Timestamp| {
        let _ = tx.send((frame, ts));
    })
    .unwrap();

    provider.process(&gray(0x10), Timestamp::from_micros(10)).unwrap();
    let (old_frame, ts) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(ts, Timestamp::from_micros(10));

    provider.stop();
    drop(provider);
    assert!(wait_until(|| !client.stats().connected));

    let provider = Provider::start(&stream, config(dir.path())).unwrap();
    provider.process(&gray(0x20), Timestamp::from_micros(20)).unwrap();
    let (new_frame, ts) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(ts, Timestamp::from_micros(20));
    assert_eq!(new_frame.row(0, 0).unwrap()[0], 0x20);

    assert_eq!(old_frame.row(0, 15).unwrap()[31], 0x10);
    assert!(client.stats().reconnects >= 1);
    client.stop();
}

/// A frame kept after the client stopped is not reclaimed by the provider;
/// the connection closes when the frame goes.
#[test]
fn test_frame_outlives_stopped_client() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("outlive");
    let provider = Provider::start(&stream, config(dir.path())).unwrap();

    let (tx, rx) = mpsc::channel();
    let mut client = Client::start(&stream, config(dir.path()), move |frame: Sample, _: Timestamp| {
        let _ = tx.send(frame);
    })
    .unwrap();

    provider.process(&gray(0x10), Timestamp::from_micros(1)).unwrap();
    let held = rx.recv_timeout(TIMEOUT).unwrap();
    client.stop();

    for i in 0..4u8 {
        provider
            .process(&gray(0x20 + i), Timestamp::from_micros(2 + i as i64))
            .unwrap();
    }
    assert!(wait_until(|| provider.stats().frames_published == 5));
    assert_eq!(held.row(0, 0).unwrap()[0], 0x10);
    assert_eq!(held.row(0, 15).unwrap(), &[0x10; 32][..]);
    assert_eq!(provider.stats().connections, 1);

    drop(held);
    assert!(wait_until(|| provider.stats().connections == 0));
    assert!(wait_until(|| provider.stats().held_frames == 0));
}

#[test]
fn test_client_releases_frames_it_drops() {
    let dir = tempfile::tempdir().unwrap();
    let stream = unique_stream("release");
    let provider = Provider::start(&stream, config(dir.path())).unwrap();

    // Drops every frame immediately.
    let (tx, rx) = mpsc::channel();
    let _client = Client::start(&stream, config(dir.path()), move |_: Sample, ts: Timestamp| {
        let _ = tx.send(ts);
    })
    .unwrap();

    for i in 1..=5 {
        provider.process(&gray(i), Timestamp::from_micros(i as i64)).unwrap();
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Timestamp::from_micros(i as i64));
    }
    // The last frame is current; the client gave back all the others.
    assert!(wait_until(|| provider.arena().live_blocks() <= 2));
    assert!(provider.stats().held_frames <= 1);
}
