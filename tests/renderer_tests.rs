//! Integration tests for the compositing renderer.

use framelink::clock::Timestamp;
use framelink::format::{PixelFormat, VideoFormat};
use framelink::renderer::{
    Color, ComposedFrame, Compositor, Layout, NormRect, RenderSink, Renderer, RendererConfig,
    RendererInput, Viewport,
};
use framelink::sample::Sample;
use framelink::transport::{Client, Provider, TransportConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn solid_rgba(width: u32, height: u32, color: Color) -> Sample {
    let mut sample = Sample::new_video(PixelFormat::Rgba, width, height).unwrap();
    for y in 0..height as usize {
        for px in sample.row_mut(0, y).unwrap().chunks_exact_mut(4) {
            px.copy_from_slice(&[color.r, color.g, color.b, 255]);
        }
    }
    sample
}

fn bgra_at(frame: &ComposedFrame, x: usize, y: usize) -> [u8; 4] {
    let row = frame.sample.row(0, y).unwrap();
    [row[x * 4], row[x * 4 + 1], row[x * 4 + 2], row[x * 4 + 3]]
}

fn bgra(color: Color) -> [u8; 4] {
    [color.b, color.g, color.r, 255]
}

// ============================================================================
// Composition
// ============================================================================

/// Two inputs side by side, only the first one fed: the second viewport
/// shows the placeholder, the first the aspect-fit input.
#[test]
fn test_scenario_c_side_by_side_with_missing_input() {
    let compositor = Compositor::new(&RendererConfig::default().with_size(640, 480)).unwrap();
    let left = compositor.add_input("left");
    let _right = compositor.add_input("right");
    compositor.set_layout(Layout::side_by_side(2));

    let magenta = Color::rgb(255, 0, 255);
    let red = Color::rgb(255, 0, 0);
    compositor
        .set_no_signal_image(Some(solid_rgba(64, 48, magenta)))
        .unwrap();

    let now = Timestamp::now();
    compositor
        .set_input_sample(left, solid_rgba(1280, 720, red), now)
        .unwrap();

    let frame = compositor.compose(now).unwrap().unwrap();
    assert_eq!((frame.sample.width(), frame.sample.height()), (640, 480));
    assert_eq!(frame.live_viewports, 1);
    assert_eq!(frame.timestamp, now);

    // 16:9 in a 320x480 column: 320x180 starting at row 150.
    assert_eq!(bgra_at(&frame, 160, 240), bgra(red));
    assert_eq!(bgra_at(&frame, 160, 151), bgra(red));
    assert_eq!(bgra_at(&frame, 160, 100), bgra(Color::BLACK));
    assert_eq!(bgra_at(&frame, 160, 400), bgra(Color::BLACK));

    // 4:3 placeholder in the right column: 320x240 starting at row 120.
    assert_eq!(bgra_at(&frame, 480, 240), bgra(magenta));
    assert_eq!(bgra_at(&frame, 480, 121), bgra(magenta));
    assert_eq!(bgra_at(&frame, 480, 60), bgra(Color::BLACK));
}

#[test]
fn test_compose_is_idempotent_without_changes() {
    for format in [PixelFormat::Bgra, PixelFormat::I420] {
        let compositor = Compositor::new(
            &RendererConfig::default()
                .with_size(320, 240)
                .with_format(format),
        )
        .unwrap();
        let a = compositor.add_input("a");
        let b = compositor.add_input("b");
        compositor.set_layout(Layout::grid(2, 2).with_borders(Color::WHITE));
        compositor.set_background_color(Color::rgb(10, 20, 30));

        let now = Timestamp::now();
        let mut gradient = Sample::new_video(PixelFormat::I420, 100, 60).unwrap();
        for y in 0..60usize {
            for (x, p) in gradient.row_mut(0, y).unwrap().iter_mut().enumerate() {
                *p = (x * 2 + y) as u8;
            }
        }
        compositor.set_input_sample(a, gradient, now).unwrap();
        compositor
            .set_input_sample(b, solid_rgba(30, 70, Color::rgb(0, 200, 0)), now)
            .unwrap();

        let first = compositor.compose(now).unwrap().unwrap();
        let second = compositor.compose(now).unwrap().unwrap();
        for plane in 0..first.sample.plane_count() {
            assert_eq!(
                first.sample.plane_data(plane),
                second.sample.plane_data(plane),
                "{} plane {} differs",
                format,
                plane
            );
        }
        assert_eq!(first.timestamp, second.timestamp);
    }
}

#[test]
fn test_source_crop_and_decoration() {
    let compositor = Compositor::new(&RendererConfig::default().with_size(100, 100).with_border_width(2)).unwrap();
    let input = compositor.add_input("a");

    // Left half black, right half white.
    let mut split = solid_rgba(20, 20, Color::BLACK);
    for y in 0..20 {
        for px in split.row_mut(0, y).unwrap()[40..].chunks_exact_mut(4) {
            px.copy_from_slice(&[255, 255, 255, 255]);
        }
    }
    compositor.set_layout(Layout::new(vec![
        Viewport::new(input, NormRect::new(0.0, 0.0, 0.5, 0.5))
            .with_source(NormRect::new(0.5, 0.0, 0.5, 1.0)),
        Viewport::decoration(NormRect::new(0.5, 0.5, 0.5, 0.5), Color::rgb(0, 0, 255)),
    ]));

    let now = Timestamp::now();
    compositor.set_input_sample(input, split, now).unwrap();
    let frame = compositor.compose(now).unwrap().unwrap();

    // Only the white half was taken: 10x20 fit into 50x50 is 25x50.
    assert_eq!(bgra_at(&frame, 25, 25), bgra(Color::WHITE));
    assert_eq!(bgra_at(&frame, 5, 25), bgra(Color::BLACK));

    // Decoration: border only, interior untouched.
    assert_eq!(bgra_at(&frame, 50, 50), bgra(Color::rgb(0, 0, 255)));
    assert_eq!(bgra_at(&frame, 99, 99), bgra(Color::rgb(0, 0, 255)));
    assert_eq!(bgra_at(&frame, 75, 75), bgra(Color::BLACK));
}

#[test]
fn test_layout_change_applies_next_tick() {
    let compositor = Compositor::new(&RendererConfig::default().with_size(64, 64)).unwrap();
    let input = compositor.add_input("a");
    let now = Timestamp::now();
    compositor
        .set_input_sample(input, solid_rgba(64, 64, Color::WHITE), now)
        .unwrap();

    compositor.set_layout(Layout::side_by_side(1));
    let full = compositor.compose(now).unwrap().unwrap();
    assert_eq!(bgra_at(&full, 2, 2), bgra(Color::WHITE));

    compositor.set_layout(Layout::new(vec![Viewport::new(
        input,
        NormRect::new(0.5, 0.5, 0.5, 0.5),
    )]));
    let quarter = compositor.compose(now).unwrap().unwrap();
    assert_eq!(bgra_at(&quarter, 2, 2), bgra(Color::BLACK));
    assert_eq!(bgra_at(&quarter, 48, 48), bgra(Color::WHITE));

    compositor.clear_layout();
    assert!(compositor.compose(now).unwrap().is_none());
}

#[test]
fn test_canvas_change() {
    let compositor = Compositor::new(&RendererConfig::default().with_size(64, 64)).unwrap();
    compositor.set_layout(Layout::default());
    compositor
        .set_canvas(VideoFormat::new(PixelFormat::I420, 32, 16))
        .unwrap();
    let frame = compositor.compose(Timestamp::ZERO).unwrap().unwrap();
    assert_eq!(
        frame.sample.video_format(),
        Some(&VideoFormat::new(PixelFormat::I420, 32, 16))
    );
    assert!(compositor
        .set_canvas(VideoFormat::new(PixelFormat::Yuy2, 32, 16))
        .is_err());
}

// ============================================================================
// Tick thread
// ============================================================================

struct Collector {
    formats: mpsc::Sender<VideoFormat>,
    frames: mpsc::Sender<Timestamp>,
}

impl RenderSink for Collector {
    fn on_format(&mut self, format: &VideoFormat) {
        let _ = self.formats.send(*format);
    }

    fn on_frame(&mut self, frame: ComposedFrame) {
        let _ = self.frames.send(frame.timestamp);
    }
}

#[test]
fn test_renderer_ticks_and_announces_format_once() {
    let (format_tx, format_rx) = mpsc::channel();
    let (frame_tx, frame_rx) = mpsc::channel();
    let config = RendererConfig::default()
        .with_size(64, 48)
        .with_refresh_interval(Duration::from_millis(10));
    let mut renderer = Renderer::start(
        config,
        Collector {
            formats: format_tx,
            frames: frame_tx,
        },
    )
    .unwrap();

    // No layout: ticks produce nothing.
    std::thread::sleep(Duration::from_millis(50));
    assert!(frame_rx.try_recv().is_err());

    renderer.compositor().set_layout(Layout::side_by_side(1));
    for _ in 0..3 {
        frame_rx.recv_timeout(TIMEOUT).unwrap();
    }
    renderer.stop();

    let formats: Vec<_> = format_rx.try_iter().collect();
    assert_eq!(formats, vec![VideoFormat::new(PixelFormat::Bgra, 64, 48)]);

    // Stopped: no further frames.
    let _ = frame_rx.try_iter().count();
    std::thread::sleep(Duration::from_millis(50));
    assert!(frame_rx.try_recv().is_err());
    renderer.stop();
}

#[test]
fn test_renderer_paces_ticks() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let config = RendererConfig::default()
        .with_size(32, 32)
        .with_refresh_interval(Duration::from_millis(20));
    let mut renderer = Renderer::start(config, move |_: ComposedFrame| {
        counter.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();
    renderer.compositor().set_layout(Layout::default());

    let started = Instant::now();
    std::thread::sleep(Duration::from_millis(200));
    renderer.stop();
    let elapsed = started.elapsed().as_millis() as usize;

    let count = ticks.load(Ordering::Relaxed);
    assert!(count >= 2, "only {} ticks", count);
    assert!(count <= elapsed / 20 + 2, "{} ticks in {} ms", count, elapsed);
}

/// With a long refresh interval, new data still reaches the sink at once
/// while nothing live is on screen; once live input is drawn, ticks are paced.
#[test]
fn test_new_data_wakes_idle_renderer() {
    let (tx, rx) = mpsc::channel();
    let config = RendererConfig::default()
        .with_size(32, 32)
        .with_refresh_interval(Duration::from_secs(10));
    let mut renderer = Renderer::start(config, move |frame: ComposedFrame| {
        let _ = tx.send(frame.live_viewports);
    })
    .unwrap();
    let compositor = Arc::clone(renderer.compositor());
    let cam = compositor.add_input("cam");

    compositor.set_layout(Layout::side_by_side(1));
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 0);

    compositor
        .set_input_sample(cam, solid_rgba(32, 32, Color::WHITE), Timestamp::now())
        .unwrap();
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let live = rx.recv_timeout(deadline.saturating_duration_since(Instant::now())).unwrap();
        if live == 1 {
            break;
        }
    }

    // Live input on screen: the next sample waits for the tick boundary.
    compositor
        .set_input_sample(cam, solid_rgba(32, 32, Color::BLACK), Timestamp::now())
        .unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    let started = Instant::now();
    renderer.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// Frames from a transport client land in a renderer input.
#[test]
fn test_client_feeds_renderer_input() {
    let dir = tempfile::tempdir().unwrap();
    let stream = format!("render-feed-{}", std::process::id());
    let config = TransportConfig::default()
        .with_socket_dir(dir.path())
        .with_arena_size(8 * 1024 * 1024)
        .with_retry_interval(Duration::from_millis(20));
    let provider = Provider::start(&stream, config.clone()).unwrap();

    let compositor = Arc::new(Compositor::new(&RendererConfig::default().with_size(64, 64)).unwrap());
    compositor.set_layout(Layout::side_by_side(1));
    let input = RendererInput::new(Arc::clone(&compositor), &stream);
    let mut client = Client::start(&stream, config, input).unwrap();

    let ts = Timestamp::now();
    provider
        .process(&solid_rgba(64, 64, Color::rgb(0, 0, 250)), ts)
        .unwrap();

    let deadline = Instant::now() + TIMEOUT;
    let frame = loop {
        let frame = compositor.compose(Timestamp::now()).unwrap().unwrap();
        if frame.live_viewports == 1 || Instant::now() > deadline {
            break frame;
        }
        std::thread::sleep(Duration::from_millis(5));
    };
    assert_eq!(frame.live_viewports, 1);
    assert_eq!(frame.timestamp, ts);
    assert_eq!(bgra_at(&frame, 32, 32), bgra(Color::rgb(0, 0, 250)));
    client.stop();
}
