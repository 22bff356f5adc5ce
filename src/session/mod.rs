// SPDX-License-Identifier: GPL-3.0-only

//! Capture session coordination
//!
//! This module owns the session's desired output set and active/suspended
//! lifecycle, and drives the external capture engine through a trait-based
//! boundary.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  CameraView         │  ← property batches, callbacks
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ SessionCoordinator  │  ← state machine, output set ownership
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureEngine trait │  ← hardware/driver boundary
//! └─────────────────────┘
//! ```

pub mod types;

pub use types::*;

use crate::errors::{CameraError, CameraResult};
use tracing::{debug, info, warn};

/// Registered handler for raw frames emitted by the capture engine.
///
/// Decouples the producer thread's affinity from the callback mechanism:
/// the engine invokes the handler on whatever thread delivers frames.
pub type FrameHandler = Box<dyn Fn(CameraFrame) + Send + Sync>;

/// External capture engine boundary.
///
/// The engine owns the physical camera device and the frame delivery
/// cadence. No internal timeouts are imposed on engine calls; their latency
/// is hardware-determined.
pub trait CaptureEngine: Send {
    /// Apply the full desired output set for a device, atomically.
    ///
    /// Either the whole set takes effect or the previous configuration
    /// stays in place.
    ///
    /// # Returns
    /// * `Err(CameraError::SessionConfig)` - the hardware rejected the set
    fn configure(&mut self, device_id: &str, outputs: &OutputSet) -> CameraResult<()>;

    /// Negotiate fps / stabilization / HDR / low-light boost on the
    /// configured session
    fn configure_format(&mut self, request: &FormatRequest) -> CameraResult<()>;

    /// Whether format changes can be negotiated without a session restart
    fn supports_live_format_change(&self) -> bool;

    /// Start (or resume) frame delivery
    fn start(&mut self) -> CameraResult<()>;

    /// Stop frame delivery and release the hardware device handle.
    ///
    /// The engine keeps its negotiated configuration so a subsequent
    /// `start` resumes without renegotiation.
    fn stop(&mut self) -> CameraResult<()>;

    /// Apply a zoom factor (already clamped to the device range)
    fn set_zoom(&mut self, factor: f32) -> CameraResult<()>;

    /// Apply the torch mode
    fn set_torch(&mut self, torch: Torch) -> CameraResult<()>;

    /// Apply the output orientation
    fn set_orientation(&mut self, orientation: Orientation) -> CameraResult<()>;

    /// Register (or clear) the frame delivery handler
    fn set_frame_handler(&mut self, handler: Option<FrameHandler>);

    /// Release every resource; the engine instance cannot be reused
    fn close(&mut self);
}

/// State machine owning the capture session's desired output set and
/// active/suspended lifecycle.
///
/// Every `configure` call reapplies the full desired output set rather than
/// a delta, so redundant calls are safe at the cost of reconfiguration
/// latency, never correctness.
pub struct SessionCoordinator {
    engine: Box<dyn CaptureEngine>,
    state: SessionState,
    device_id: Option<String>,
    outputs: Option<OutputSet>,
    /// Pending format request; applied live when supported, else via a
    /// format-scoped restart
    format: Option<FormatRequest>,
}

impl SessionCoordinator {
    /// Create a coordinator driving the given engine
    pub fn new(engine: Box<dyn CaptureEngine>) -> Self {
        Self {
            engine,
            state: SessionState::Unconfigured,
            device_id: None,
            outputs: None,
            format: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether an output set has been applied and not closed
    pub fn is_configured(&self) -> bool {
        self.outputs.is_some() && self.state != SessionState::Closed
    }

    /// Register (or clear) the frame delivery handler on the engine
    pub fn set_frame_handler(&mut self, handler: Option<FrameHandler>) {
        self.engine.set_frame_handler(handler);
    }

    /// Apply the full desired output set for a device.
    ///
    /// Transitions `Unconfigured`/`Active`/`Suspended` → `Configuring` →
    /// `Active`. On engine rejection the previous state is restored and the
    /// partial configuration is never observable.
    pub fn configure(&mut self, device_id: &str, outputs: OutputSet) -> CameraResult<()> {
        if self.state == SessionState::Closed {
            return Err(CameraError::SessionConfig("session is closed".into()));
        }

        info!(device = %device_id, ?outputs, "Configuring capture session");
        let previous = self.state;
        self.state = SessionState::Configuring;

        if let Err(e) = self.engine.configure(device_id, &outputs) {
            warn!(device = %device_id, error = %e, "Engine rejected output set");
            self.state = previous;
            return Err(e);
        }

        if let Some(format) = self.format {
            // Re-negotiate the pending format for the fresh session
            if let Err(e) = self.engine.configure_format(&format) {
                warn!(device = %device_id, error = %e, "Format negotiation failed");
                self.state = previous;
                return Err(e);
            }
        }

        if let Err(e) = self.engine.start() {
            warn!(device = %device_id, error = %e, "Engine failed to start");
            self.state = previous;
            return Err(e);
        }
        self.device_id = Some(device_id.to_string());
        self.outputs = Some(outputs);
        self.state = SessionState::Active;
        info!(device = %device_id, "Capture session active");
        Ok(())
    }

    /// Activate or suspend the session.
    ///
    /// Idempotent: repeated calls with the same value are no-ops.
    /// Suspension releases the hardware device handle but retains the
    /// output set, so resumption skips full reconfiguration.
    pub fn set_active(&mut self, active: bool) -> CameraResult<()> {
        if self.state == SessionState::Closed {
            return Err(CameraError::SessionConfig("session is closed".into()));
        }

        match (active, self.state) {
            (true, SessionState::Suspended) => {
                info!("Resuming capture session");
                self.engine.start()?;
                self.state = SessionState::Active;
            }
            (false, SessionState::Active) => {
                info!("Suspending capture session, releasing device handle");
                self.engine.stop()?;
                self.state = SessionState::Suspended;
            }
            _ => {
                debug!(active, state = %self.state, "Lifecycle recheck is a no-op");
            }
        }
        Ok(())
    }

    /// Apply a format request.
    ///
    /// Before the first `configure` the request is recorded and applied by
    /// the next session configuration. On a live session it is negotiated
    /// in place when the engine supports it, otherwise through a restart
    /// scoped to format only.
    pub fn configure_format(&mut self, request: FormatRequest) -> CameraResult<()> {
        if self.state == SessionState::Closed {
            return Err(CameraError::SessionConfig("session is closed".into()));
        }

        self.format = Some(request);
        if self.outputs.is_none() {
            debug!(?request, "No session yet, format request recorded");
            return Ok(());
        }

        if self.engine.supports_live_format_change() {
            debug!(?request, "Negotiating format on live session");
            self.engine.configure_format(&request)
        } else {
            info!(?request, "Format-scoped session restart");
            let was_active = self.state == SessionState::Active;
            if was_active {
                self.engine.stop()?;
            }
            self.engine.configure_format(&request)?;
            if was_active {
                self.engine.start()?;
            }
            Ok(())
        }
    }

    /// Apply a zoom factor; a no-op until a session is configured
    pub fn apply_zoom(&mut self, factor: f32) -> CameraResult<()> {
        if !self.is_configured() {
            return Ok(());
        }
        debug!(factor, "Applying zoom");
        self.engine.set_zoom(factor)
    }

    /// Apply the torch mode; a no-op until a session is configured
    pub fn apply_torch(&mut self, torch: Torch) -> CameraResult<()> {
        if !self.is_configured() {
            return Ok(());
        }
        debug!(torch = %torch, "Applying torch mode");
        self.engine.set_torch(torch)
    }

    /// Apply the output orientation; a no-op until a session is configured
    pub fn apply_orientation(&mut self, orientation: Orientation) -> CameraResult<()> {
        if !self.is_configured() {
            return Ok(());
        }
        debug!(orientation = %orientation, "Applying orientation");
        self.engine.set_orientation(orientation)
    }

    /// Release all hardware resources. Irreversible.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        info!("Closing capture session");
        // Ignore stop errors during teardown
        let _ = self.engine.stop();
        self.engine.close();
        self.outputs = None;
        self.device_id = None;
        self.state = SessionState::Closed;
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("state", &self.state)
            .field("device_id", &self.device_id)
            .field("configured", &self.outputs.is_some())
            .finish()
    }
}
