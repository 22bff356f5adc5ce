// SPDX-License-Identifier: GPL-3.0-only

//! GPU preview renderer
//!
//! Owns the offscreen render target and the live output surface binding,
//! and implements the producer/consumer frame hand-off: the capture thread
//! draws each frame into the offscreen target, the display thread
//! composites the most recent complete frame onto the live surface at its
//! own cadence. The hand-off is single-slot and lossy by design; a slow
//! consumer silently drops intermediate frames, which bounds end-to-end
//! latency. Recorded video is sourced from its own output path, never from
//! this presentation buffer.

pub mod present_loop;
pub mod wgpu_backend;

pub use present_loop::{LoopAction, PresentLoopController};
pub use wgpu_backend::{SurfaceSource, WgpuRenderBackend};

use crate::errors::{CameraResult, RenderError};
use crate::session::types::{CameraFrame, RenderSurface, Resolution};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Offscreen target size used when no video output resolution is requested
pub const DEFAULT_INPUT_SIZE: Resolution = Resolution {
    width: 1280,
    height: 720,
};

/// Outcome of one consumer-side present call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    /// The offscreen target was composited onto the live surface
    Composited,
    /// Nothing new to show; the prior composite stays visible
    Skipped,
}

/// GPU operations behind the renderer's locking contract.
///
/// Implementations own the actual GPU resources (offscreen target, surface
/// swapchain, pipelines). All calls arrive serialized under the renderer's
/// lock, so implementations need no locking of their own.
pub trait RenderBackend: Send {
    /// Reallocate the offscreen target
    fn resize_offscreen(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    /// Import the frame's backing buffer as a GPU texture and draw it into
    /// the offscreen target (one GPU submission)
    fn draw_frame(&mut self, frame: &CameraFrame) -> Result<(), RenderError>;

    /// Composite the offscreen target onto the bound surface
    fn composite(&mut self) -> Result<(), RenderError>;

    /// Bind the live output surface
    fn bind_surface(&mut self, surface: &RenderSurface) -> Result<(), RenderError>;

    /// Release the bound surface and its GPU resources, synchronously
    fn release_surface(&mut self);

    /// Whether an output surface is currently bound
    fn has_surface(&self) -> bool;
}

struct RendererState {
    backend: Box<dyn RenderBackend>,
    /// Set by the producer after a completed offscreen draw, cleared by the
    /// consumer after compositing it
    pending: bool,
    input_size: Resolution,
    /// GPU context loss poisons the instance; every later call fails until
    /// the owner rebuilds the renderer
    lost: bool,
}

/// The preview renderer.
///
/// One exclusive lock guards the offscreen target and the pending flag;
/// producer, consumer and control threads all serialize on it. Destruction
/// waits for the lock rather than racing an in-flight render.
pub struct PreviewRenderer {
    state: Mutex<RendererState>,
}

impl PreviewRenderer {
    /// Create a renderer over the given backend with the default offscreen
    /// target size
    pub fn new(backend: Box<dyn RenderBackend>) -> CameraResult<Self> {
        Self::with_input_size(backend, DEFAULT_INPUT_SIZE)
    }

    /// Create a renderer with an explicit offscreen target size
    pub fn with_input_size(
        mut backend: Box<dyn RenderBackend>,
        size: Resolution,
    ) -> CameraResult<Self> {
        info!(size = %size, "Creating preview renderer");
        backend.resize_offscreen(size.width, size.height)?;
        Ok(Self {
            state: Mutex::new(RendererState {
                backend,
                pending: false,
                input_size: size,
                lost: false,
            }),
        })
    }

    /// Producer-thread call: draw one camera frame into the offscreen
    /// target and mark it pending for the next present.
    ///
    /// Blocking time is bounded by one GPU submission. On failure the frame
    /// is dropped and the pipeline continues; the caller must not retry the
    /// same frame.
    pub fn attach_frame(&self, frame: &CameraFrame) -> CameraResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.lost {
            return Err(RenderError::ContextLost("renderer is poisoned".into()).into());
        }

        match state.backend.draw_frame(frame) {
            Ok(()) => {
                state.pending = true;
                Ok(())
            }
            Err(e) => {
                if e.is_fatal() {
                    warn!(error = %e, "Fatal GPU error on frame draw");
                    state.lost = true;
                } else {
                    debug!(error = %e, "Dropping frame after render failure");
                }
                Err(e.into())
            }
        }
    }

    /// Consumer-thread call, invoked at the display cadence.
    ///
    /// If no new frame is pending this is a no-op and the prior composite
    /// stays visible, avoiding flicker on a missed producer cycle. Never
    /// blocks waiting for a camera frame.
    pub fn present_frame(&self) -> CameraResult<Presented> {
        let mut state = self.state.lock().unwrap();
        if state.lost {
            return Err(RenderError::ContextLost("renderer is poisoned".into()).into());
        }
        if !state.pending || !state.backend.has_surface() {
            return Ok(Presented::Skipped);
        }

        match state.backend.composite() {
            Ok(()) => {
                state.pending = false;
                Ok(Presented::Composited)
            }
            Err(e) => {
                if e.is_fatal() {
                    warn!(error = %e, "Fatal GPU error on composite");
                    state.lost = true;
                }
                Err(e.into())
            }
        }
    }

    /// Reallocate the offscreen target.
    ///
    /// Serialized by the renderer lock, so it can never run while a render
    /// is in flight. Any pending frame is invalidated.
    pub fn resize_input(&self, width: u32, height: u32) -> CameraResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.lost {
            return Err(RenderError::ContextLost("renderer is poisoned".into()).into());
        }
        if state.input_size == Resolution::new(width, height) {
            return Ok(());
        }

        info!(width, height, "Resizing offscreen target");
        state.backend.resize_offscreen(width, height)?;
        state.input_size = Resolution::new(width, height);
        state.pending = false;
        Ok(())
    }

    /// Bind the live output surface
    pub fn attach_output(&self, surface: &RenderSurface) -> CameraResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.lost {
            return Err(RenderError::ContextLost("renderer is poisoned".into()).into());
        }
        info!(width = surface.width, height = surface.height, "Attaching output surface");
        state.backend.bind_surface(surface)?;
        Ok(())
    }

    /// Unbind the output surface, synchronously releasing its GPU
    /// resources so no GPU handle outlives view teardown
    pub fn detach_output(&self) {
        let mut state = self.state.lock().unwrap();
        info!("Detaching output surface");
        state.backend.release_surface();
    }

    /// Whether a fatal GPU error has poisoned this instance
    pub fn is_lost(&self) -> bool {
        self.state.lock().unwrap().lost
    }

    /// Current offscreen target size
    pub fn input_size(&self) -> Resolution {
        self.state.lock().unwrap().input_size
    }
}

impl Drop for PreviewRenderer {
    fn drop(&mut self) {
        // Waits for any in-flight attach/present before releasing, same
        // teardown order as the output-then-target GPU ownership chain
        if let Ok(mut state) = self.state.lock() {
            state.backend.release_surface();
        }
    }
}

impl std::fmt::Debug for PreviewRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("PreviewRenderer")
            .field("pending", &state.pending)
            .field("input_size", &state.input_size)
            .field("lost", &state.lost)
            .finish()
    }
}
