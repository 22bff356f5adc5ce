// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the capture session and frame pipeline

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Platform hardware buffer behind a narrow import boundary.
///
/// The capture engine owns the backing memory; the pipeline only borrows it
/// for the duration of one render call. How a buffer becomes a GPU texture
/// is vendor specific, so the render backend talks to this trait and nothing
/// else knows about platform buffer types.
pub trait HardwareBuffer: Send + Sync {
    /// Pixel width of the buffer
    fn width(&self) -> u32;
    /// Pixel height of the buffer
    fn height(&self) -> u32;
    /// Map the buffer for CPU read access (tightly packed RGBA)
    ///
    /// Backends with true zero-copy import paths may never call this.
    fn map_pixels(&self) -> &[u8];
}

/// In-memory RGBA buffer (used by tests and software capture paths)
#[derive(Clone)]
pub struct MemoryBuffer {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl MemoryBuffer {
    /// Create a buffer from pre-copied RGBA bytes
    pub fn new(width: u32, height: u32, data: Arc<[u8]>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Create a zero-filled buffer of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        let data: Arc<[u8]> = vec![0u8; (width * height * 4) as usize].into();
        Self {
            width,
            height,
            data,
        }
    }
}

impl HardwareBuffer for MemoryBuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn map_pixels(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MemoryBuffer({}x{}, {} bytes)",
            self.width,
            self.height,
            self.data.len()
        )
    }
}

/// One decoded camera output unit.
///
/// Transient: the renderer must not retain the buffer handle past a single
/// `attach_frame` call. The recording path receives its own clone through
/// the video output sink, never through the presentation buffer.
#[derive(Clone)]
pub struct CameraFrame {
    /// Backing hardware buffer (external ownership)
    pub buffer: Arc<dyn HardwareBuffer>,
    /// Capture timestamp
    pub timestamp: Instant,
    /// Output orientation for this frame
    pub orientation: Orientation,
    /// Whether the frame should be mirrored horizontally (selfie cameras)
    pub mirrored: bool,
}

impl CameraFrame {
    /// Create a frame captured now with the given metadata
    pub fn new(buffer: Arc<dyn HardwareBuffer>, orientation: Orientation, mirrored: bool) -> Self {
        Self {
            buffer,
            timestamp: Instant::now(),
            orientation,
            mirrored,
        }
    }
}

impl std::fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraFrame")
            .field("size", &(self.buffer.width(), self.buffer.height()))
            .field("orientation", &self.orientation)
            .field("mirrored", &self.mirrored)
            .finish()
    }
}

/// Output orientation in degrees (clockwise)
///
/// Camera sensors may be mounted at various angles relative to the device.
/// The view can override the sensor orientation; either way frames carry the
/// final output rotation so the compositor can correct it on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    /// No rotation
    #[default]
    Deg0,
    /// 90 degrees clockwise
    Deg90,
    /// 180 degrees (upside down)
    Deg180,
    /// 270 degrees clockwise
    Deg270,
}

impl Orientation {
    /// Create an orientation from an integer degree value (normalised to 0-360)
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Orientation::Deg90,
            180 => Orientation::Deg180,
            270 => Orientation::Deg270,
            _ => Orientation::Deg0,
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            Orientation::Deg0 => 0,
            Orientation::Deg90 => 90,
            Orientation::Deg180 => 180,
            Orientation::Deg270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Orientation::Deg90 | Orientation::Deg270)
    }

    /// Rotation code for the composite shader (0=none, 1=90CW, 2=180, 3=270CW)
    pub fn gpu_rotation_code(&self) -> u32 {
        match self {
            Orientation::Deg0 => 0,
            Orientation::Deg90 => 1,
            Orientation::Deg180 => 2,
            Orientation::Deg270 => 3,
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Torch (flashlight) mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Torch {
    /// Torch disabled
    #[default]
    Off,
    /// Torch continuously on
    On,
}

impl std::fmt::Display for Torch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Torch::Off => write!(f, "off"),
            Torch::On => write!(f, "on"),
        }
    }
}

/// Video stabilization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StabilizationMode {
    /// No stabilization
    #[default]
    Off,
    /// Standard sensor-shift or digital stabilization
    Standard,
    /// Cinematic stabilization with wider crop
    Cinematic,
    /// Extended cinematic stabilization
    CinematicExtended,
}

/// Which concrete preview provider is mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreviewKind {
    /// No preview; capture outputs still run
    #[default]
    None,
    /// Platform-native surface view; surface arrives asynchronously
    Native,
    /// GPU-composited preview through the shared renderer
    Gpu,
}

/// A width/height pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Requested format descriptor, resolved by the capability layer
///
/// Carries separate video and photo target sizes; the offscreen render
/// target always follows the video size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub video: Resolution,
    pub photo: Resolution,
}

/// Format negotiation parameters applied on top of a configured session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormatRequest {
    /// Target frames per second (None leaves the device default)
    pub fps: Option<u32>,
    /// Video stabilization mode
    pub stabilization: StabilizationMode,
    /// High dynamic range capture
    pub hdr: bool,
    /// Low-light boost (night mode)
    pub low_light_boost: bool,
}

/// Handle to the live display destination.
///
/// Exists only while a preview is mounted and its surface is realized. The
/// token is opaque to this crate; the platform layer resolves it to an
/// actual window surface inside the render backend boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSurface {
    /// Opaque platform surface token
    pub token: u64,
    /// Surface width in pixels
    pub width: u32,
    /// Surface height in pixels
    pub height: u32,
}

/// Preview output: frames are composited onto this surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewOutput {
    pub surface: RenderSurface,
}

/// Photo output: still captures at the target resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoOutput {
    pub resolution: Option<Resolution>,
}

/// Video output: frames delivered through a bounded channel, independent of
/// the lossy presentation buffer
#[derive(Clone)]
pub struct VideoOutput {
    /// Recording/processing sink; lives outside any pipeline instance so it
    /// survives session restarts
    pub sink: tokio::sync::mpsc::Sender<Arc<CameraFrame>>,
    pub resolution: Option<Resolution>,
}

impl std::fmt::Debug for VideoOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoOutput")
            .field("resolution", &self.resolution)
            .finish()
    }
}

/// The single desired capture configuration, applied atomically.
///
/// Each member is independently optional. Partial application is never
/// observable: the engine either accepts the whole set or the previous
/// configuration stays in effect.
#[derive(Debug, Clone, Default)]
pub struct OutputSet {
    pub preview: Option<PreviewOutput>,
    pub photo: Option<PhotoOutput>,
    pub video: Option<VideoOutput>,
}

// Video sinks are channels and carry no meaningful equality; two output
// sets are the same desired configuration when surfaces and resolutions
// match and the same outputs are enabled.
impl PartialEq for OutputSet {
    fn eq(&self, other: &Self) -> bool {
        self.preview == other.preview
            && self.photo == other.photo
            && match (&self.video, &other.video) {
                (None, None) => true,
                (Some(a), Some(b)) => a.resolution == b.resolution,
                _ => false,
            }
    }
}

impl OutputSet {
    /// Whether no output is requested at all
    pub fn is_empty(&self) -> bool {
        self.preview.is_none() && self.photo.is_none() && self.video.is_none()
    }
}

/// Capture session lifecycle state.
///
/// Transitions are monotonic except `Active ⇄ Suspended`; `Closed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No output set has ever been applied
    #[default]
    Unconfigured,
    /// An output set is being applied to the engine
    Configuring,
    /// The engine is delivering frames
    Active,
    /// Device handle released, output set retained for quick resume
    Suspended,
    /// All resources released; the session cannot be reused
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Unconfigured => "unconfigured",
            SessionState::Configuring => "configuring",
            SessionState::Active => "active",
            SessionState::Suspended => "suspended",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}
