// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the preview pipeline

use std::fmt;

/// Result type alias using CameraError
pub type CameraResult<T> = Result<T, CameraError>;

/// Main error type surfaced through the `on_error` callback
#[derive(Debug, Clone)]
pub enum CameraError {
    /// Camera permission not granted; non-retryable until the caller
    /// resolves it externally
    Permission,
    /// No camera device matches the requested identifier
    DeviceNotFound(String),
    /// GPU render failure (frame-scoped unless fatal)
    Render(RenderError),
    /// The capture engine rejected the requested output set
    SessionConfig(String),
    /// Unexpected fault, wrapped
    Unknown(String),
}

/// Render-path errors
#[derive(Debug, Clone)]
pub enum RenderError {
    /// Importing a hardware buffer as a GPU texture failed; the frame is
    /// dropped and the pipeline continues
    ImportFailed(String),
    /// Drawing into the offscreen target failed
    DrawFailed(String),
    /// Presenting to the live surface failed
    SurfaceLost(String),
    /// GPU context loss; fatal to the renderer instance, requires full
    /// reinitialization
    ContextLost(String),
    /// No output surface is attached
    NoSurface,
}

impl RenderError {
    /// Whether this error poisons the renderer instance
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::ContextLost(_))
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::Permission => write!(f, "Camera permission not granted"),
            CameraError::DeviceNotFound(id) => write!(f, "No camera device found for \"{}\"", id),
            CameraError::Render(e) => write!(f, "Render error: {}", e),
            CameraError::SessionConfig(msg) => write!(f, "Session configuration rejected: {}", msg),
            CameraError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ImportFailed(msg) => write!(f, "Buffer import failed: {}", msg),
            RenderError::DrawFailed(msg) => write!(f, "Offscreen draw failed: {}", msg),
            RenderError::SurfaceLost(msg) => write!(f, "Output surface lost: {}", msg),
            RenderError::ContextLost(msg) => write!(f, "GPU context lost: {}", msg),
            RenderError::NoSurface => write!(f, "No output surface attached"),
        }
    }
}

impl std::error::Error for CameraError {}
impl std::error::Error for RenderError {}

impl From<RenderError> for CameraError {
    fn from(err: RenderError) -> Self {
        CameraError::Render(err)
    }
}

impl From<String> for CameraError {
    fn from(msg: String) -> Self {
        CameraError::Unknown(msg)
    }
}

impl From<&str> for CameraError {
    fn from(msg: &str) -> Self {
        CameraError::Unknown(msg.to_string())
    }
}

impl CameraError {
    /// Short machine-readable kind string, passed to `on_error` alongside
    /// the display message
    pub fn kind(&self) -> &'static str {
        match self {
            CameraError::Permission => "permission",
            CameraError::DeviceNotFound(_) => "device-not-found",
            CameraError::Render(_) => "render",
            CameraError::SessionConfig(_) => "session-config",
            CameraError::Unknown(_) => "unknown",
        }
    }
}
