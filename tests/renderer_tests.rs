// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the preview renderer's producer/consumer hand-off

use camera_preview::errors::{CameraError, RenderError};
use camera_preview::renderer::{Presented, PreviewRenderer, RenderBackend};
use camera_preview::session::types::{CameraFrame, MemoryBuffer, Orientation, RenderSurface};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Shared state observed by the tests while the renderer drives the mock
#[derive(Default)]
struct MockShared {
    events: Mutex<Vec<String>>,
    /// Set while any backend call is executing; concurrent entry means the
    /// renderer lock failed to serialize producer/consumer/control calls
    busy: AtomicBool,
    fail_draw: AtomicBool,
    fatal_composite: AtomicBool,
}

impl MockShared {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

struct MockBackend {
    shared: Arc<MockShared>,
    surface_bound: bool,
}

impl MockBackend {
    fn new(shared: Arc<MockShared>) -> Self {
        Self {
            shared,
            surface_bound: false,
        }
    }

    /// Assert exclusive entry for the duration of one call
    fn exclusive<R>(&self, name: &str, body: impl FnOnce() -> R) -> R {
        let was_busy = self.shared.busy.swap(true, Ordering::SeqCst);
        assert!(!was_busy, "{name} entered while another call was in flight");
        // Widen the race window so overlapping calls would be caught
        thread::sleep(Duration::from_micros(200));
        let result = body();
        self.shared.busy.store(false, Ordering::SeqCst);
        self.shared.events.lock().unwrap().push(name.to_string());
        result
    }
}

impl RenderBackend for MockBackend {
    fn resize_offscreen(&mut self, _width: u32, _height: u32) -> Result<(), RenderError> {
        self.exclusive("resize", || Ok(()))
    }

    fn draw_frame(&mut self, _frame: &CameraFrame) -> Result<(), RenderError> {
        let shared = Arc::clone(&self.shared);
        self.exclusive("draw", || {
            if shared.fail_draw.load(Ordering::SeqCst) {
                Err(RenderError::ImportFailed("mock import failure".into()))
            } else {
                Ok(())
            }
        })
    }

    fn composite(&mut self) -> Result<(), RenderError> {
        let shared = Arc::clone(&self.shared);
        self.exclusive("composite", || {
            if shared.fatal_composite.load(Ordering::SeqCst) {
                Err(RenderError::ContextLost("mock context loss".into()))
            } else {
                Ok(())
            }
        })
    }

    fn bind_surface(&mut self, _surface: &RenderSurface) -> Result<(), RenderError> {
        self.exclusive("bind", || Ok(()))?;
        self.surface_bound = true;
        Ok(())
    }

    fn release_surface(&mut self) {
        self.exclusive("release", || {});
        self.surface_bound = false;
    }

    fn has_surface(&self) -> bool {
        self.surface_bound
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_frame() -> CameraFrame {
    CameraFrame::new(
        Arc::new(MemoryBuffer::blank(16, 16)),
        Orientation::Deg0,
        false,
    )
}

fn test_surface() -> RenderSurface {
    RenderSurface {
        token: 1,
        width: 640,
        height: 480,
    }
}

fn renderer_with_surface(shared: &Arc<MockShared>) -> PreviewRenderer {
    let renderer = PreviewRenderer::new(Box::new(MockBackend::new(Arc::clone(shared)))).unwrap();
    renderer.attach_output(&test_surface()).unwrap();
    renderer
}

#[test]
fn test_present_without_attach_is_noop() {
    let shared = Arc::new(MockShared::default());
    let renderer = renderer_with_surface(&shared);

    assert_eq!(renderer.present_frame().unwrap(), Presented::Skipped);
    assert_eq!(
        shared.count("composite"),
        0,
        "Visible content must stay unchanged without an attached frame"
    );
}

#[test]
fn test_one_attach_composites_exactly_once() {
    let shared = Arc::new(MockShared::default());
    let renderer = renderer_with_surface(&shared);

    renderer.attach_frame(&test_frame()).unwrap();
    assert_eq!(renderer.present_frame().unwrap(), Presented::Composited);
    assert_eq!(
        renderer.present_frame().unwrap(),
        Presented::Skipped,
        "Second present without a new frame must be a no-op"
    );
    assert_eq!(shared.count("composite"), 1);
}

#[test]
fn test_pending_frame_survives_until_surface_attaches() {
    let shared = Arc::new(MockShared::default());
    let renderer = PreviewRenderer::new(Box::new(MockBackend::new(Arc::clone(&shared)))).unwrap();

    // Frame arrives before any surface is attached
    renderer.attach_frame(&test_frame()).unwrap();
    assert_eq!(renderer.present_frame().unwrap(), Presented::Skipped);

    renderer.attach_output(&test_surface()).unwrap();
    assert_eq!(
        renderer.present_frame().unwrap(),
        Presented::Composited,
        "First composite happens only after at least one attached frame"
    );
}

#[test]
fn test_resize_invalidates_pending_frame() {
    let shared = Arc::new(MockShared::default());
    let renderer = renderer_with_surface(&shared);

    renderer.attach_frame(&test_frame()).unwrap();
    renderer.resize_input(1920, 1080).unwrap();
    assert_eq!(renderer.present_frame().unwrap(), Presented::Skipped);
    assert_eq!(shared.count("composite"), 0);
}

#[test]
fn test_draw_failure_drops_frame_and_pipeline_continues() {
    let shared = Arc::new(MockShared::default());
    let renderer = renderer_with_surface(&shared);

    shared.fail_draw.store(true, Ordering::SeqCst);
    assert!(renderer.attach_frame(&test_frame()).is_err());
    assert_eq!(
        renderer.present_frame().unwrap(),
        Presented::Skipped,
        "Failed frame must not become pending"
    );

    // Next frame goes through
    shared.fail_draw.store(false, Ordering::SeqCst);
    renderer.attach_frame(&test_frame()).unwrap();
    assert_eq!(renderer.present_frame().unwrap(), Presented::Composited);
    assert!(!renderer.is_lost());
}

#[test]
fn test_fatal_error_poisons_renderer() {
    let shared = Arc::new(MockShared::default());
    let renderer = renderer_with_surface(&shared);

    shared.fatal_composite.store(true, Ordering::SeqCst);
    renderer.attach_frame(&test_frame()).unwrap();
    assert!(renderer.present_frame().is_err());
    assert!(renderer.is_lost());

    // Every later call fails until the owner rebuilds the renderer
    match renderer.attach_frame(&test_frame()) {
        Err(CameraError::Render(RenderError::ContextLost(_))) => {}
        other => panic!("Expected ContextLost, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_detach_releases_surface_synchronously() {
    let shared = Arc::new(MockShared::default());
    let renderer = renderer_with_surface(&shared);

    renderer.detach_output();
    assert_eq!(
        shared.count("release"),
        1,
        "Release must have happened before detach_output returned"
    );
}

#[test]
fn test_concurrent_producer_consumer_control_serialize() {
    init_tracing();
    let shared = Arc::new(MockShared::default());
    let renderer = Arc::new(renderer_with_surface(&shared));

    let producer = {
        let renderer = Arc::clone(&renderer);
        thread::spawn(move || {
            for _ in 0..50 {
                let _ = renderer.attach_frame(&test_frame());
            }
        })
    };
    let consumer = {
        let renderer = Arc::clone(&renderer);
        thread::spawn(move || {
            for _ in 0..50 {
                let _ = renderer.present_frame();
            }
        })
    };
    let control = {
        let renderer = Arc::clone(&renderer);
        thread::spawn(move || {
            for i in 0..10 {
                let _ = renderer.resize_input(640 + i, 480 + i);
                thread::sleep(Duration::from_micros(500));
            }
        })
    };

    // The mock panics on overlapping entry; a panicking thread fails join
    producer.join().expect("producer overlapped another call");
    consumer.join().expect("consumer overlapped another call");
    control.join().expect("control overlapped another call");
}
