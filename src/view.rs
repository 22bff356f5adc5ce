// SPDX-License-Identifier: GPL-3.0-only

//! Top-level camera view core
//!
//! One entry point, `update()`, receives a coalesced batch of changed
//! property keys, computes the reconfiguration plan and executes it against
//! the session coordinator and preview surface manager. Every failure
//! inside a reconfiguration step is caught at this boundary and routed to
//! the `on_error` callback; `update()` itself never propagates errors.

use crate::config::{ConfigSnapshot, PreviewConfig, PropKey};
use crate::errors::{CameraError, CameraResult};
use crate::reconfigure::{ReconfigurePlan, Scope};
use crate::renderer::DEFAULT_INPUT_SIZE;
use crate::session::types::{
    CameraFrame, Orientation, OutputSet, PhotoOutput, PreviewOutput, RenderSurface,
    VideoOutput,
};
use crate::preview::{PreviewSurfaceManager, PreviewViewFactory, RendererFactory};
use crate::session::{CaptureEngine, SessionCoordinator};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Depth of the video output channel; recording lags briefly rather than
/// dropping frames the way the lossy preview hand-off does
const VIDEO_SINK_DEPTH: usize = 8;

/// Per-frame transform shared with the registered frame handler.
///
/// The handler reads this on every frame, so orientation and mirror
/// changes take effect without re-registering the handler or touching
/// the session.
#[derive(Debug, Clone, Copy, Default)]
struct FrameTransform {
    orientation_override: Option<Orientation>,
    mirrored: bool,
}

/// Capability layer boundary (permission and device facts are external)
pub trait CapabilityProvider: Send {
    /// Whether camera permission has been granted
    fn permission_granted(&self) -> bool;

    /// Whether a device with this identifier exists
    fn device_exists(&self, camera_id: &str) -> bool;

    /// Min/max zoom factor of the device
    fn zoom_range(&self, camera_id: &str) -> (f32, f32);
}

/// Outbound callbacks to the embedding layer
pub struct ViewCallbacks {
    /// Fired once, after the first successful session configuration
    pub on_initialized: Box<dyn Fn() + Send + Sync>,
    /// Fired for every error caught at the `update()` boundary or escalated
    /// from the frame path
    pub on_error: Box<dyn Fn(&CameraError) + Send + Sync>,
}

impl Default for ViewCallbacks {
    fn default() -> Self {
        Self {
            on_initialized: Box::new(|| {}),
            on_error: Box::new(|_| {}),
        }
    }
}

/// The camera view core: property state, session coordination and preview
/// surface ownership behind one declarative update entry point.
pub struct CameraView {
    /// Current property values; the marshaling layer writes these fields
    /// and then reports the changed keys in one `update()` call
    pub config: PreviewConfig,
    capabilities: Box<dyn CapabilityProvider>,
    session: SessionCoordinator,
    previews: PreviewSurfaceManager,
    snapshot: ConfigSnapshot,
    callbacks: Arc<ViewCallbacks>,
    frame_transform: Arc<Mutex<FrameTransform>>,
    video_tx: mpsc::Sender<Arc<CameraFrame>>,
    video_rx: Option<mpsc::Receiver<Arc<CameraFrame>>>,
    /// Whether the view is attached to a visible window
    window_attached: bool,
    initialized: bool,
}

impl CameraView {
    /// Create a view core over its external collaborators
    pub fn new(
        engine: Box<dyn CaptureEngine>,
        capabilities: Box<dyn CapabilityProvider>,
        view_factory: Box<dyn PreviewViewFactory>,
        renderer_factory: RendererFactory,
        callbacks: ViewCallbacks,
    ) -> Self {
        let (video_tx, video_rx) = mpsc::channel(VIDEO_SINK_DEPTH);
        Self {
            config: PreviewConfig::default(),
            capabilities,
            session: SessionCoordinator::new(engine),
            previews: PreviewSurfaceManager::new(view_factory, renderer_factory),
            snapshot: ConfigSnapshot::default(),
            callbacks: Arc::new(callbacks),
            frame_transform: Arc::new(Mutex::new(FrameTransform::default())),
            video_tx,
            video_rx: Some(video_rx),
            window_attached: false,
            initialized: false,
        }
    }

    /// Take the receiving end of the video output channel.
    ///
    /// Recording is sourced from this independent path, never from the
    /// lossy presentation buffer.
    pub fn take_video_frames(&mut self) -> Option<mpsc::Receiver<Arc<CameraFrame>>> {
        self.video_rx.take()
    }

    /// Apply one coalesced batch of property changes.
    ///
    /// Expected to be invoked once per batch, after all value assignments
    /// for that batch have been applied to `config`. Failures are routed to
    /// `on_error`; this method never propagates them.
    pub fn update(&mut self, changed: &BTreeSet<PropKey>) {
        let observable = self.snapshot.observable_changes(&self.config, changed);
        if observable.is_empty() {
            debug!(?changed, "Batch changed nothing observable, skipping");
            return;
        }

        let plan = ReconfigurePlan::from_changed(&observable);
        info!(changed = ?observable, scopes = ?plan.scopes(), "Props changed");

        match self.run_plan(&plan) {
            Ok(()) => self.snapshot.record(&self.config),
            Err(e) => {
                warn!(error = %e, "update() failed");
                (self.callbacks.on_error)(&e);
            }
        }
    }

    /// The view was attached to a visible window
    pub fn on_view_attached(&mut self) {
        self.window_attached = true;
        self.checked(Self::recheck_lifecycle);
    }

    /// The view was detached from its window
    pub fn on_view_detached(&mut self) {
        self.window_attached = false;
        self.checked(Self::recheck_lifecycle);
    }

    /// A preview surface was realized by the platform layer.
    ///
    /// Resumes a session configuration that was deferred on a pending
    /// native surface.
    pub fn on_preview_surface_ready(&mut self, surface: RenderSurface) {
        match self.previews.surface_ready(surface) {
            Ok(true) => {
                debug!("Resuming deferred session configuration");
                self.checked(Self::finish_deferred_configure);
            }
            Ok(false) => self.checked(Self::recheck_lifecycle),
            Err(e) => (self.callbacks.on_error)(&e),
        }
    }

    /// The preview surface went away
    pub fn on_preview_surface_destroyed(&mut self) {
        self.previews.surface_destroyed();
        self.checked(Self::recheck_lifecycle);
    }

    /// Release all hardware and GPU resources. Irreversible.
    pub fn close(&mut self) {
        info!("Closing camera view");
        self.previews.unmount();
        self.session.close();
    }

    /// Current session state (for the embedding layer and tests)
    pub fn session_state(&self) -> crate::session::types::SessionState {
        self.session.state()
    }

    /// The shared preview renderer, once the GPU preview has been mounted
    pub fn renderer(&self) -> Option<Arc<crate::renderer::PreviewRenderer>> {
        self.previews.renderer()
    }

    fn checked(&mut self, step: fn(&mut Self) -> CameraResult<()>) {
        if let Err(e) = step(self) {
            warn!(error = %e, "Reconfiguration step failed");
            (self.callbacks.on_error)(&e);
        }
    }

    fn run_plan(&mut self, plan: &ReconfigurePlan) -> CameraResult<()> {
        for scope in plan.scopes() {
            match scope {
                Scope::Preview => {
                    self.previews
                        .mount(self.config.preview_kind, self.config.camera_id.as_deref())?;
                }
                Scope::Session => self.configure_session()?,
                Scope::Format => self.session.configure_format(self.config.format_request())?,
                Scope::Lifecycle => self.recheck_lifecycle()?,
                Scope::Zoom => self.apply_zoom()?,
                Scope::Torch => self.session.apply_torch(self.config.torch)?,
                Scope::Orientation => {
                    self.refresh_frame_transform();
                    self.session
                        .apply_orientation(self.config.orientation.unwrap_or_default())?;
                }
            }
        }
        Ok(())
    }

    /// Recompute the full desired output set from current property values
    /// and apply it atomically.
    fn configure_session(&mut self) -> CameraResult<()> {
        if !self.capabilities.permission_granted() {
            return Err(CameraError::Permission);
        }
        let camera_id = self
            .config
            .camera_id
            .clone()
            .ok_or_else(|| CameraError::DeviceNotFound("no camera selected".into()))?;
        if !self.capabilities.device_exists(&camera_id) {
            return Err(CameraError::DeviceNotFound(camera_id));
        }

        if self.previews.is_awaiting_surface() {
            // Deferred, not failed: the ready callback resumes this
            debug!("Preview surface pending, deferring session configuration");
            return Ok(());
        }

        let format = self.config.format;
        let video_resolution = format.map(|f| f.video);

        // The offscreen target always follows the video output resolution,
        // falling back to the default when no format is requested
        if let Some(renderer) = self.previews.renderer() {
            let target = video_resolution.unwrap_or(DEFAULT_INPUT_SIZE);
            renderer.resize_input(target.width, target.height)?;
        }

        let outputs = OutputSet {
            preview: self
                .previews
                .surface()
                .map(|surface| PreviewOutput { surface }),
            photo: self.config.photo.then(|| PhotoOutput {
                resolution: format.map(|f| f.photo),
            }),
            video: self.config.video.then(|| VideoOutput {
                sink: self.video_tx.clone(),
                resolution: video_resolution,
            }),
        };

        self.register_frame_handler();
        self.session.configure(&camera_id, outputs)?;

        if !self.initialized {
            self.initialized = true;
            (self.callbacks.on_initialized)();
        }
        Ok(())
    }

    /// Push the current orientation override and mirror flag to the shared
    /// frame transform read by the registered handler
    fn refresh_frame_transform(&self) {
        let mut transform = self.frame_transform.lock().unwrap();
        transform.orientation_override = self.config.orientation;
        transform.mirrored = self.config.mirror_preview;
    }

    /// Wire the engine's frame delivery to the renderer and video sink.
    ///
    /// The handler runs on the capture-producer thread. Frame-scoped render
    /// failures are logged and the frame dropped; only fatal GPU loss
    /// escalates through `on_error`.
    fn register_frame_handler(&mut self) {
        self.refresh_frame_transform();
        let frame_transform = Arc::clone(&self.frame_transform);
        let renderer = self.previews.renderer();
        let video_tx = self.config.video.then(|| self.video_tx.clone());
        let callbacks = Arc::clone(&self.callbacks);

        self.session.set_frame_handler(Some(Box::new(move |mut frame| {
            let transform = *frame_transform.lock().unwrap();
            if let Some(orientation) = transform.orientation_override {
                frame.orientation = orientation;
            }
            frame.mirrored |= transform.mirrored;

            if let Some(renderer) = &renderer {
                match renderer.attach_frame(&frame) {
                    Ok(()) => {}
                    Err(CameraError::Render(e)) if e.is_fatal() => {
                        (callbacks.on_error)(&CameraError::Render(e));
                    }
                    Err(e) => debug!(error = %e, "Frame dropped"),
                }
            }

            if let Some(tx) = &video_tx {
                if tx.try_send(Arc::new(frame)).is_err() {
                    warn!("Video sink full or closed, dropping frame");
                }
            }
        })));
    }

    fn recheck_lifecycle(&mut self) -> CameraResult<()> {
        let should_be_active = self.config.is_active && self.window_attached;
        self.session.set_active(should_be_active)
    }

    /// Zoom clamps to the current device's range at apply time, so a device
    /// switch in the same batch clamps against the new device
    fn apply_zoom(&mut self) -> CameraResult<()> {
        let Some(camera_id) = &self.config.camera_id else {
            return Ok(());
        };
        let (min_zoom, max_zoom) = self.capabilities.zoom_range(camera_id);
        let clamped = self.config.zoom.clamp(min_zoom, max_zoom);
        if clamped != self.config.zoom {
            debug!(
                requested = self.config.zoom,
                clamped, "Zoom clamped to device range"
            );
        }
        self.session.apply_zoom(clamped)
    }

    /// Run the steps a deferred session configuration skipped: the session
    /// itself, then the device controls bound to it, then lifecycle.
    fn finish_deferred_configure(&mut self) -> CameraResult<()> {
        self.configure_session()?;
        self.session
            .configure_format(self.config.format_request())?;
        self.apply_zoom()?;
        self.session.apply_torch(self.config.torch)?;
        self.session
            .apply_orientation(self.config.orientation.unwrap_or_default())?;
        self.recheck_lifecycle()
    }
}

impl std::fmt::Debug for CameraView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraView")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("previews", &self.previews)
            .field("window_attached", &self.window_attached)
            .finish()
    }
}
