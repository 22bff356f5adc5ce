// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the declarative `update()` entry point

use camera_preview::config::PropKey;
use camera_preview::errors::{CameraResult, RenderError};
use camera_preview::renderer::{DEFAULT_INPUT_SIZE, PreviewRenderer, RenderBackend};
use camera_preview::session::types::{
    CameraFrame, FormatDescriptor, FormatRequest, MemoryBuffer, Orientation, OutputSet,
    PreviewKind, RenderSurface, Resolution, Torch,
};
use camera_preview::session::{CaptureEngine, FrameHandler};
use camera_preview::view::{CameraView, CapabilityProvider, ViewCallbacks};
use camera_preview::preview::PreviewViewFactory;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Recorder {
    engine_calls: Mutex<Vec<String>>,
    factory_calls: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    /// Frame handler the engine last received, invoked to simulate delivery
    handler: Mutex<Option<FrameHandler>>,
    /// Orientation and mirror flag of every frame the backend drew
    drawn_frames: Mutex<Vec<(Orientation, bool)>>,
    initialized: AtomicU32,
    permission: AtomicBool,
}

impl Recorder {
    fn granted() -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        recorder.permission.store(true, Ordering::SeqCst);
        recorder
    }

    fn engine_calls(&self) -> Vec<String> {
        self.engine_calls.lock().unwrap().clone()
    }

    fn factory_calls(&self) -> Vec<String> {
        self.factory_calls.lock().unwrap().clone()
    }

    fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    fn clear_engine(&self) {
        self.engine_calls.lock().unwrap().clear();
    }

    fn configure_count(&self) -> usize {
        self.engine_calls()
            .iter()
            .filter(|c| c.starts_with("configure("))
            .count()
    }

    fn drawn_frames(&self) -> Vec<(Orientation, bool)> {
        self.drawn_frames.lock().unwrap().clone()
    }

    /// Deliver one sensor frame (Deg0, unmirrored) through the registered
    /// handler, the way the capture engine would
    fn deliver_frame(&self) {
        let guard = self.handler.lock().unwrap();
        let handler = guard.as_ref().expect("frame handler registered");
        handler(CameraFrame::new(
            Arc::new(MemoryBuffer::blank(4, 4)),
            Orientation::Deg0,
            false,
        ));
    }
}

struct MockEngine {
    recorder: Arc<Recorder>,
}

impl MockEngine {
    fn record(&self, call: impl Into<String>) {
        self.recorder.engine_calls.lock().unwrap().push(call.into());
    }
}

impl CaptureEngine for MockEngine {
    fn configure(&mut self, device_id: &str, outputs: &OutputSet) -> CameraResult<()> {
        self.record(format!(
            "configure({device_id}, preview={})",
            outputs.preview.is_some()
        ));
        Ok(())
    }

    fn configure_format(&mut self, request: &FormatRequest) -> CameraResult<()> {
        self.record(format!("configure_format(fps={:?})", request.fps));
        Ok(())
    }

    fn supports_live_format_change(&self) -> bool {
        true
    }

    fn start(&mut self) -> CameraResult<()> {
        self.record("start");
        Ok(())
    }

    fn stop(&mut self) -> CameraResult<()> {
        self.record("stop");
        Ok(())
    }

    fn set_zoom(&mut self, factor: f32) -> CameraResult<()> {
        self.record(format!("set_zoom({factor})"));
        Ok(())
    }

    fn set_torch(&mut self, torch: Torch) -> CameraResult<()> {
        self.record(format!("set_torch({torch})"));
        Ok(())
    }

    fn set_orientation(&mut self, orientation: Orientation) -> CameraResult<()> {
        self.record(format!("set_orientation({orientation})"));
        Ok(())
    }

    fn set_frame_handler(&mut self, handler: Option<FrameHandler>) {
        *self.recorder.handler.lock().unwrap() = handler;
    }

    fn close(&mut self) {
        self.record("close");
    }
}

struct MockCapabilities {
    recorder: Arc<Recorder>,
    zoom_range: (f32, f32),
}

impl CapabilityProvider for MockCapabilities {
    fn permission_granted(&self) -> bool {
        self.recorder.permission.load(Ordering::SeqCst)
    }

    fn device_exists(&self, camera_id: &str) -> bool {
        camera_id == "0" || camera_id == "1"
    }

    fn zoom_range(&self, _camera_id: &str) -> (f32, f32) {
        self.zoom_range
    }
}

struct MockViewFactory {
    recorder: Arc<Recorder>,
}

impl PreviewViewFactory for MockViewFactory {
    fn build_native(&mut self, camera_id: &str) -> CameraResult<()> {
        self.recorder
            .factory_calls
            .lock()
            .unwrap()
            .push(format!("build_native({camera_id})"));
        Ok(())
    }

    fn build_gpu(&mut self) -> CameraResult<()> {
        self.recorder
            .factory_calls
            .lock()
            .unwrap()
            .push("build_gpu".to_string());
        Ok(())
    }

    fn teardown(&mut self) {
        self.recorder
            .factory_calls
            .lock()
            .unwrap()
            .push("teardown".to_string());
    }
}

/// Backend that accepts everything and records what it drew; the view
/// tests exercise wiring, not GPU work
struct NullBackend {
    recorder: Arc<Recorder>,
    surface_bound: bool,
}

impl RenderBackend for NullBackend {
    fn resize_offscreen(&mut self, _width: u32, _height: u32) -> Result<(), RenderError> {
        Ok(())
    }

    fn draw_frame(&mut self, frame: &CameraFrame) -> Result<(), RenderError> {
        self.recorder
            .drawn_frames
            .lock()
            .unwrap()
            .push((frame.orientation, frame.mirrored));
        Ok(())
    }

    fn composite(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    fn bind_surface(&mut self, _surface: &RenderSurface) -> Result<(), RenderError> {
        self.surface_bound = true;
        Ok(())
    }

    fn release_surface(&mut self) {
        self.surface_bound = false;
    }

    fn has_surface(&self) -> bool {
        self.surface_bound
    }
}

fn build_view(recorder: &Arc<Recorder>, zoom_range: (f32, f32)) -> CameraView {
    let callbacks = {
        let init_recorder = Arc::clone(recorder);
        let error_recorder = Arc::clone(recorder);
        ViewCallbacks {
            on_initialized: Box::new(move || {
                init_recorder.initialized.fetch_add(1, Ordering::SeqCst);
            }),
            on_error: Box::new(move |e| {
                error_recorder
                    .errors
                    .lock()
                    .unwrap()
                    .push(e.kind().to_string());
            }),
        }
    };

    let mut view = CameraView::new(
        Box::new(MockEngine {
            recorder: Arc::clone(recorder),
        }),
        Box::new(MockCapabilities {
            recorder: Arc::clone(recorder),
            zoom_range,
        }),
        Box::new(MockViewFactory {
            recorder: Arc::clone(recorder),
        }),
        {
            let backend_recorder = Arc::clone(recorder);
            Box::new(move || {
                PreviewRenderer::new(Box::new(NullBackend {
                    recorder: Arc::clone(&backend_recorder),
                    surface_bound: false,
                }))
                .map(Arc::new)
            })
        },
        callbacks,
    );
    view.on_view_attached();
    view
}

fn batch(keys: impl IntoIterator<Item = PropKey>) -> BTreeSet<PropKey> {
    keys.into_iter().collect()
}

/// Configure a plain session on device "0" and clear the engine log
fn configured_view(recorder: &Arc<Recorder>, zoom_range: (f32, f32)) -> CameraView {
    let mut view = build_view(recorder, zoom_range);
    view.config.camera_id = Some("0".to_string());
    view.config.is_active = true;
    view.update(&batch([PropKey::CameraId, PropKey::IsActive]));
    assert!(recorder.errors().is_empty(), "Setup must not error");
    recorder.clear_engine();
    view
}

/// Configure a GPU-composited preview on device "0" and clear the engine log
fn gpu_view(recorder: &Arc<Recorder>) -> CameraView {
    let mut view = build_view(recorder, (1.0, 10.0));
    view.config.camera_id = Some("0".to_string());
    view.config.preview_kind = PreviewKind::Gpu;
    view.config.is_active = true;
    view.update(&batch([
        PropKey::CameraId,
        PropKey::PreviewKind,
        PropKey::IsActive,
    ]));
    assert!(recorder.errors().is_empty(), "Setup must not error");
    recorder.clear_engine();
    view
}

#[test]
fn test_orientation_change_applies_to_later_frames() {
    let recorder = Recorder::granted();
    let mut view = gpu_view(&recorder);

    recorder.deliver_frame();
    view.config.orientation = Some(Orientation::Deg90);
    view.update(&batch([PropKey::Orientation]));
    recorder.deliver_frame();

    assert_eq!(
        recorder.drawn_frames(),
        vec![(Orientation::Deg0, false), (Orientation::Deg90, false)],
        "Frames delivered after an orientation change must carry the new override"
    );
    // The device control is applied too, with no session rebuild
    assert_eq!(recorder.engine_calls(), vec!["set_orientation(90°)"]);
}

#[test]
fn test_mirror_change_applies_to_later_frames() {
    let recorder = Recorder::granted();
    let mut view = gpu_view(&recorder);

    view.config.mirror_preview = true;
    view.update(&batch([PropKey::MirrorPreview]));
    recorder.deliver_frame();

    assert_eq!(
        recorder.drawn_frames(),
        vec![(Orientation::Deg0, true)],
        "Frames delivered after a mirror change must be drawn mirrored"
    );
    assert_eq!(recorder.configure_count(), 0, "Mirroring never rebuilds the session");
}

#[test]
fn test_cleared_format_restores_default_offscreen_size() {
    let recorder = Recorder::granted();
    let mut view = gpu_view(&recorder);
    let renderer = view.renderer().expect("GPU preview renderer mounted");

    view.config.format = Some(FormatDescriptor {
        video: Resolution::new(1920, 1080),
        photo: Resolution::new(4000, 3000),
    });
    view.update(&batch([PropKey::Format]));
    assert_eq!(renderer.input_size(), Resolution::new(1920, 1080));

    view.config.format = None;
    view.update(&batch([PropKey::Format]));
    assert_eq!(
        renderer.input_size(),
        DEFAULT_INPUT_SIZE,
        "Offscreen target must fall back to the default size without a format"
    );
    assert!(recorder.errors().is_empty());
}

#[test]
fn test_zoom_clamps_to_device_range() {
    let recorder = Recorder::granted();
    let mut view = configured_view(&recorder, (1.0, 3.0));

    view.config.zoom = 5.0;
    view.update(&batch([PropKey::Zoom]));

    assert_eq!(recorder.engine_calls(), vec!["set_zoom(3)"]);
    assert!(recorder.errors().is_empty());
}

#[test]
fn test_torch_change_does_not_touch_session() {
    let recorder = Recorder::granted();
    let mut view = configured_view(&recorder, (1.0, 10.0));

    view.config.torch = Torch::On;
    view.update(&batch([PropKey::Torch]));

    assert_eq!(
        recorder.engine_calls(),
        vec!["set_torch(on)"],
        "Torch is a device control, not a session rebuild"
    );
}

#[test]
fn test_unchanged_batch_is_skipped() {
    let recorder = Recorder::granted();
    let mut view = configured_view(&recorder, (1.0, 10.0));

    // Keys reported but values identical to the last applied configuration
    view.update(&batch([PropKey::Torch, PropKey::Zoom]));
    assert!(recorder.engine_calls().is_empty());
}

#[test]
fn test_native_preview_defers_session_until_surface_ready() {
    let recorder = Recorder::granted();
    let mut view = build_view(&recorder, (1.0, 10.0));

    view.config.camera_id = Some("0".to_string());
    view.config.preview_kind = PreviewKind::Native;
    view.update(&batch([PropKey::CameraId, PropKey::PreviewKind]));

    assert_eq!(recorder.factory_calls(), vec!["build_native(0)"]);
    assert_eq!(
        recorder.configure_count(),
        0,
        "Session configuration must wait for the realized surface"
    );
    assert!(recorder.errors().is_empty(), "Deferral is not a failure");

    view.on_preview_surface_ready(RenderSurface {
        token: 7,
        width: 1920,
        height: 1080,
    });
    assert_eq!(recorder.configure_count(), 1);
    assert_eq!(
        recorder.engine_calls().first().map(String::as_str),
        Some("configure(0, preview=true)")
    );
}

#[test]
fn test_gpu_preview_mounts_shared_renderer() {
    let recorder = Recorder::granted();
    let mut view = build_view(&recorder, (1.0, 10.0));

    view.config.camera_id = Some("0".to_string());
    view.config.preview_kind = PreviewKind::Gpu;
    view.update(&batch([PropKey::CameraId, PropKey::PreviewKind]));

    assert!(recorder.factory_calls().contains(&"build_gpu".to_string()));
    assert!(view.renderer().is_some());
    assert_eq!(recorder.configure_count(), 1, "GPU preview needs no deferral");
}

#[test]
fn test_permission_denied_routes_to_on_error() {
    let recorder = Arc::new(Recorder::default());
    let mut view = build_view(&recorder, (1.0, 10.0));

    view.config.camera_id = Some("0".to_string());
    view.update(&batch([PropKey::CameraId]));

    assert_eq!(recorder.errors(), vec!["permission"]);
    assert_eq!(recorder.configure_count(), 0);
}

#[test]
fn test_unknown_device_routes_to_on_error() {
    let recorder = Recorder::granted();
    let mut view = build_view(&recorder, (1.0, 10.0));

    view.config.camera_id = Some("nope".to_string());
    view.update(&batch([PropKey::CameraId]));

    assert_eq!(recorder.errors(), vec!["device-not-found"]);
}

#[test]
fn test_initialized_fires_once() {
    let recorder = Recorder::granted();
    let mut view = configured_view(&recorder, (1.0, 10.0));

    view.config.camera_id = Some("1".to_string());
    view.update(&batch([PropKey::CameraId]));

    assert!(recorder.errors().is_empty());
    assert_eq!(
        recorder.initialized.load(Ordering::SeqCst),
        1,
        "Initialization callback fires only for the first configuration"
    );
}

#[test]
fn test_detach_suspends_and_reattach_resumes() {
    let recorder = Recorder::granted();
    let mut view = configured_view(&recorder, (1.0, 10.0));

    view.on_view_detached();
    assert_eq!(recorder.engine_calls(), vec!["stop"]);
    view.on_view_attached();
    assert_eq!(
        recorder.engine_calls(),
        vec!["stop", "start"],
        "Reattachment resumes without renegotiation"
    );
}

#[test]
fn test_update_never_panics_on_error() {
    let recorder = Arc::new(Recorder::default());
    let mut view = build_view(&recorder, (1.0, 10.0));

    // Permission denied, no device, preview without camera: all routed
    view.update(&batch([PropKey::IsActive]));
    view.config.preview_kind = PreviewKind::Native;
    view.update(&batch([PropKey::PreviewKind]));

    assert!(
        !recorder.errors().is_empty(),
        "Failures surface through the error callback, not panics"
    );
}

#[test]
fn test_video_frames_flow_through_independent_channel() {
    let recorder = Recorder::granted();
    let mut view = build_view(&recorder, (1.0, 10.0));
    let mut frames = view.take_video_frames().expect("receiver available once");
    assert!(view.take_video_frames().is_none());

    view.config.camera_id = Some("0".to_string());
    view.config.video = true;
    view.update(&batch([PropKey::CameraId, PropKey::VideoEnabled]));
    assert!(recorder.errors().is_empty());

    // No frames delivered yet; the channel is empty but alive
    assert!(frames.try_recv().is_err());
}
