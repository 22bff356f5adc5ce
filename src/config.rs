// SPDX-License-Identifier: GPL-3.0-only

//! Reconfigurable view properties and the last-applied snapshot

use crate::session::types::{
    FormatDescriptor, FormatRequest, Orientation, PreviewKind, StabilizationMode, Torch,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Name of a reconfigurable property, as it appears in an update batch.
///
/// The property-marshaling layer assigns values directly on
/// [`PreviewConfig`] and then reports which keys it touched in one coalesced
/// `update()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropKey {
    /// Camera device identifier
    CameraId,
    /// Preview provider kind (none / native / GPU-composited)
    PreviewKind,
    /// Requested format descriptor
    Format,
    /// Photo capture output enabled
    PhotoEnabled,
    /// Video capture output enabled
    VideoEnabled,
    /// Target frames per second
    Fps,
    /// Video stabilization mode
    Stabilization,
    /// HDR capture
    Hdr,
    /// Low-light boost
    LowLightBoost,
    /// Zoom factor
    Zoom,
    /// Torch mode
    Torch,
    /// Orientation override
    Orientation,
    /// Preview mirroring
    MirrorPreview,
    /// Active flag
    IsActive,
}

/// Current values of all reconfigurable properties.
///
/// The marshaling layer writes these fields, then calls
/// `CameraView::update()` once per batch with the changed keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Selected camera device identifier (enumeration is external)
    pub camera_id: Option<String>,
    /// Which preview provider to mount
    pub preview_kind: PreviewKind,
    /// Requested format descriptor (video + photo target sizes)
    pub format: Option<FormatDescriptor>,
    /// Enable the photo capture output
    pub photo: bool,
    /// Enable the video capture output
    pub video: bool,
    /// Target frames per second
    pub fps: Option<u32>,
    /// Video stabilization mode
    pub stabilization: StabilizationMode,
    /// HDR capture
    pub hdr: bool,
    /// Low-light boost (night mode)
    pub low_light_boost: bool,
    /// Zoom factor; clamped to the current device's range when applied
    pub zoom: f32,
    /// Torch mode
    pub torch: Torch,
    /// Orientation override; None follows the sensor orientation
    pub orientation: Option<Orientation>,
    /// Whether the session should be running
    pub is_active: bool,
    /// Mirror the preview horizontally (selfie cameras)
    pub mirror_preview: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            camera_id: None,
            preview_kind: PreviewKind::default(),
            format: None,
            photo: false,
            video: false,
            fps: None,
            stabilization: StabilizationMode::default(),
            hdr: false,
            low_light_boost: false,
            zoom: 1.0,
            torch: Torch::default(),
            orientation: None,
            is_active: false,
            mirror_preview: false,
        }
    }
}

impl PreviewConfig {
    /// Format negotiation parameters derived from the current values
    pub fn format_request(&self) -> FormatRequest {
        FormatRequest {
            fps: self.fps,
            stabilization: self.stabilization,
            hdr: self.hdr,
            low_light_boost: self.low_light_boost,
        }
    }
}

/// Last-applied property values.
///
/// Used only to detect that an update batch actually changed something
/// observable; a batch whose values all match the snapshot is skipped
/// without touching the session.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    last: Option<PreviewConfig>,
}

impl ConfigSnapshot {
    /// Filter a changed-key batch down to keys whose values differ from the
    /// last applied configuration.
    ///
    /// Before anything has been applied, every reported key counts as
    /// changed.
    pub fn observable_changes(
        &self,
        config: &PreviewConfig,
        batch: &BTreeSet<PropKey>,
    ) -> BTreeSet<PropKey> {
        let Some(last) = &self.last else {
            return batch.clone();
        };

        batch
            .iter()
            .copied()
            .filter(|key| Self::differs(last, config, *key))
            .collect()
    }

    /// Record the configuration that was just applied
    pub fn record(&mut self, config: &PreviewConfig) {
        self.last = Some(config.clone());
    }

    fn differs(last: &PreviewConfig, now: &PreviewConfig, key: PropKey) -> bool {
        match key {
            PropKey::CameraId => last.camera_id != now.camera_id,
            PropKey::PreviewKind => last.preview_kind != now.preview_kind,
            PropKey::Format => last.format != now.format,
            PropKey::PhotoEnabled => last.photo != now.photo,
            PropKey::VideoEnabled => last.video != now.video,
            PropKey::Fps => last.fps != now.fps,
            PropKey::Stabilization => last.stabilization != now.stabilization,
            PropKey::Hdr => last.hdr != now.hdr,
            PropKey::LowLightBoost => last.low_light_boost != now.low_light_boost,
            PropKey::Zoom => last.zoom != now.zoom,
            PropKey::Torch => last.torch != now.torch,
            PropKey::Orientation => last.orientation != now.orientation,
            PropKey::MirrorPreview => last.mirror_preview != now.mirror_preview,
            PropKey::IsActive => last.is_active != now.is_active,
        }
    }
}
