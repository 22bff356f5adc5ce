// SPDX-License-Identifier: GPL-3.0-only

//! Preview surface ownership
//!
//! Owns which concrete display-surface provider is mounted (none, platform
//! native, or GPU-composited) and its lifecycle. At most one provider is
//! mounted at a time; a kind change synchronously detaches and releases the
//! previous surface before the new view is constructed.

use crate::errors::{CameraError, CameraResult};
use crate::renderer::PreviewRenderer;
use crate::session::types::{PreviewKind, RenderSurface};
use std::sync::Arc;
use tracing::{debug, info};

/// Constructs and tears down the platform view backing a preview.
///
/// View-tree attachment mechanics are outside this crate; the embedding
/// layer implements this trait and later delivers realized surfaces through
/// `CameraView::on_preview_surface_ready`.
pub trait PreviewViewFactory: Send {
    /// Construct the platform-native surface view for a device.
    ///
    /// The surface is realized asynchronously; the factory must arrange for
    /// the ready callback to fire with a concrete surface handle.
    fn build_native(&mut self, camera_id: &str) -> CameraResult<()>;

    /// Construct the host view for the GPU-composited preview
    fn build_gpu(&mut self) -> CameraResult<()>;

    /// Tear down whichever view is currently mounted
    fn teardown(&mut self);
}

/// Builds the shared preview renderer on first use
pub type RendererFactory = Box<dyn FnMut() -> CameraResult<Arc<PreviewRenderer>> + Send>;

/// Owns the mounted preview provider and its surface lifecycle
pub struct PreviewSurfaceManager {
    factory: Box<dyn PreviewViewFactory>,
    renderer_factory: RendererFactory,
    mounted: PreviewKind,
    /// Shared renderer, created once and reused across reconfigurations
    /// (GPU context creation is costly)
    renderer: Option<Arc<PreviewRenderer>>,
    surface: Option<RenderSurface>,
    awaiting_native_surface: bool,
}

impl PreviewSurfaceManager {
    /// Create a manager with nothing mounted
    pub fn new(factory: Box<dyn PreviewViewFactory>, renderer_factory: RendererFactory) -> Self {
        Self {
            factory,
            renderer_factory,
            mounted: PreviewKind::None,
            renderer: None,
            surface: None,
            awaiting_native_surface: false,
        }
    }

    /// Mount the provider for the given preview kind.
    ///
    /// Always rebuilds: a preview-scoped reconfiguration may carry a new
    /// device identity even when the kind itself is unchanged. The previous
    /// surface is detached and released before the new view is constructed.
    /// Whether dependent session configuration must wait for an
    /// asynchronously realized surface is exposed via
    /// [`Self::is_awaiting_surface`].
    pub fn mount(&mut self, kind: PreviewKind, camera_id: Option<&str>) -> CameraResult<()> {
        info!(kind = ?kind, "Mounting preview provider");
        self.unmount();

        match kind {
            PreviewKind::None => Ok(()),
            PreviewKind::Native => {
                let camera_id = camera_id.ok_or_else(|| {
                    CameraError::DeviceNotFound("no camera selected for native preview".into())
                })?;
                self.factory.build_native(camera_id)?;
                self.mounted = PreviewKind::Native;
                self.awaiting_native_surface = true;
                debug!(device = %camera_id, "Native preview mounted, awaiting surface");
                Ok(())
            }
            PreviewKind::Gpu => {
                if self.renderer.is_none() {
                    self.renderer = Some((self.renderer_factory)()?);
                }
                self.factory.build_gpu()?;
                self.mounted = PreviewKind::Gpu;
                Ok(())
            }
        }
    }

    /// Detach and release the current provider, if any
    pub fn unmount(&mut self) {
        if self.mounted == PreviewKind::None && self.surface.is_none() {
            self.awaiting_native_surface = false;
            return;
        }

        debug!(kind = ?self.mounted, "Unmounting preview provider");
        if self.mounted == PreviewKind::Gpu {
            if let Some(renderer) = &self.renderer {
                // Synchronous release; the GPU surface must not outlive the view
                renderer.detach_output();
            }
        }
        self.factory.teardown();
        self.mounted = PreviewKind::None;
        self.surface = None;
        self.awaiting_native_surface = false;
    }

    /// A realized surface handle arrived from the platform layer.
    ///
    /// Returns true when a deferred session configuration should now run.
    pub fn surface_ready(&mut self, surface: RenderSurface) -> CameraResult<bool> {
        info!(width = surface.width, height = surface.height, "Preview surface ready");
        if self.mounted == PreviewKind::Gpu {
            if let Some(renderer) = &self.renderer {
                renderer.attach_output(&surface)?;
            }
        }
        self.surface = Some(surface);

        let resume = self.awaiting_native_surface;
        self.awaiting_native_surface = false;
        Ok(resume)
    }

    /// The platform surface went away (view hidden or destroyed)
    pub fn surface_destroyed(&mut self) {
        if self.surface.take().is_some() {
            info!("Preview surface destroyed");
            if self.mounted == PreviewKind::Gpu {
                if let Some(renderer) = &self.renderer {
                    renderer.detach_output();
                }
            }
        }
    }

    /// Currently mounted provider kind
    pub fn mounted_kind(&self) -> PreviewKind {
        self.mounted
    }

    /// The realized surface, while one is attached
    pub fn surface(&self) -> Option<RenderSurface> {
        self.surface
    }

    /// Whether session configuration is deferred on a pending native surface
    pub fn is_awaiting_surface(&self) -> bool {
        self.awaiting_native_surface
    }

    /// The shared renderer, once the GPU preview has been mounted
    pub fn renderer(&self) -> Option<Arc<PreviewRenderer>> {
        self.renderer.clone()
    }
}

impl std::fmt::Debug for PreviewSurfaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSurfaceManager")
            .field("mounted", &self.mounted)
            .field("surface", &self.surface)
            .field("awaiting_native_surface", &self.awaiting_native_surface)
            .finish()
    }
}
