// SPDX-License-Identifier: GPL-3.0-only

//! Camera preview pipeline core
//!
//! Moves hardware camera frames from the capture-producer cadence into a
//! GPU-resident offscreen target and independently composites the most
//! recent complete frame onto a live display surface at the display's own
//! refresh cadence, together with the declarative reconfiguration state
//! machine that maps a batch of changed configuration properties to the
//! minimal set of re-initialization steps.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`view`]: top-level `CameraView` and the `update()` entry point
//! - [`reconfigure`]: changed-property batch → ordered reconfiguration plan
//! - [`session`]: capture session state machine and engine boundary
//! - [`preview`]: preview surface provider ownership
//! - [`renderer`]: offscreen GPU target and producer/consumer frame hand-off
//! - [`config`]: reconfigurable properties and the last-applied snapshot
//! - [`errors`]: error kinds routed through the `on_error` callback
//!
//! External collaborators (capture engine, capability layer, platform view
//! factory, surface resolution) are traits implemented by the embedding
//! layer.

pub mod config;
pub mod errors;
pub mod preview;
pub mod reconfigure;
pub mod renderer;
pub mod session;
pub mod view;

// Re-export commonly used types
pub use config::{PreviewConfig, PropKey};
pub use errors::{CameraError, CameraResult, RenderError};
pub use reconfigure::{ReconfigurePlan, Scope};
pub use renderer::{PreviewRenderer, Presented, RenderBackend};
pub use session::types::{
    CameraFrame, HardwareBuffer, Orientation, OutputSet, PreviewKind, RenderSurface, Resolution,
    SessionState, Torch,
};
pub use session::{CaptureEngine, SessionCoordinator};
pub use view::{CameraView, CapabilityProvider, ViewCallbacks};
