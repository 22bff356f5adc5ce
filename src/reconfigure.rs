// SPDX-License-Identifier: GPL-3.0-only

//! Declarative reconfiguration planning
//!
//! Maps a batch of changed property keys to the minimal ordered set of
//! re-initialization scopes. Scopes are hierarchical: invalidating a narrow
//! assumption (device identity) invalidates everything built on top of it
//! (the format negotiated for that device, the session outputs bound to it),
//! so `Preview ⊇ Session ⊇ Format`, and any triggered scope implies a
//! lifecycle recheck.

use crate::config::PropKey;
use std::collections::BTreeSet;

/// A named subset of initialization work to redo for a property change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    /// Tear down and rebuild the mounted preview provider
    Preview,
    /// Reapply the full desired output set to the capture engine
    Session,
    /// Renegotiate fps / stabilization / HDR / low-light boost
    Format,
    /// Recheck whether the session should be active or suspended
    Lifecycle,
    /// Reapply the zoom factor, clamped to the current device range
    Zoom,
    /// Reapply the torch mode
    Torch,
    /// Reapply the frame transform (orientation override and preview
    /// mirroring)
    Orientation,
}

const PREVIEW_KEYS: &[PropKey] = &[PropKey::CameraId, PropKey::PreviewKind];
const SESSION_KEYS: &[PropKey] = &[
    PropKey::Format,
    PropKey::PhotoEnabled,
    PropKey::VideoEnabled,
];
const FORMAT_KEYS: &[PropKey] = &[
    PropKey::Fps,
    PropKey::Stabilization,
    PropKey::Hdr,
    PropKey::LowLightBoost,
];

/// Ordered reconfiguration scopes for one update batch.
///
/// Computed once per batch; execution walks the scopes in the order they
/// appear. Replaces the legacy per-flag OR-escalation with one auditable
/// plan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconfigurePlan {
    scopes: Vec<Scope>,
}

impl ReconfigurePlan {
    /// Compute the plan for a batch of changed property keys.
    ///
    /// An empty batch produces an empty plan.
    pub fn from_changed(changed: &BTreeSet<PropKey>) -> Self {
        let contains_any = |keys: &[PropKey]| keys.iter().any(|k| changed.contains(k));

        let preview = contains_any(PREVIEW_KEYS);
        let session = preview || contains_any(SESSION_KEYS);
        let format = session || contains_any(FORMAT_KEYS);

        // A reconfigured session invalidates previously applied zoom, torch
        // and orientation along with everything else bound to the device.
        let zoom = session || changed.contains(&PropKey::Zoom);
        let torch = session || changed.contains(&PropKey::Torch);
        let orientation = session
            || changed.contains(&PropKey::Orientation)
            || changed.contains(&PropKey::MirrorPreview);

        let any = format || zoom || torch || orientation;
        let lifecycle = any || changed.contains(&PropKey::IsActive);

        let mut scopes = Vec::new();
        if preview {
            scopes.push(Scope::Preview);
        }
        if session {
            scopes.push(Scope::Session);
        }
        if format {
            scopes.push(Scope::Format);
        }
        if lifecycle {
            scopes.push(Scope::Lifecycle);
        }
        if zoom {
            scopes.push(Scope::Zoom);
        }
        if torch {
            scopes.push(Scope::Torch);
        }
        if orientation {
            scopes.push(Scope::Orientation);
        }

        Self { scopes }
    }

    /// Whether the batch requires no work at all
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Whether the plan includes the given scope
    pub fn contains(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    /// The scopes in execution order
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }
}
