//! Versioned in-memory mirror of the remote canvas
//!
//! All reads and writes go through one reader-writer lock. Keyframes are
//! classified outside the lock and swapped in wholesale, so readers see
//! either the previous map or the new one, never a mix.
//!
//! Version 0 means "no data yet". Consumers must not dispatch writes until a
//! keyframe or patch has advanced it.

use std::collections::HashMap;

use image::RgbaImage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::color::{ClassifyReport, Color, ColorCodec};
use crate::error::{PainterError, PainterResult};

/// Pack a coordinate into a single map key
///
/// Opaque outside this crate; only used for map lookups.
#[inline]
#[must_use]
pub fn coord_key(x: u16, y: u16) -> u32 {
    u32::from(x) | (u32::from(y) << 16)
}

/// Fixed size of the canvas grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasDims {
    /// Width in pixels
    pub width: u16,
    /// Height in pixels
    pub height: u16,
}

impl Default for CanvasDims {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1000,
        }
    }
}

impl CanvasDims {
    /// Create dimensions
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Whether `(x, y)` lies inside the grid
    #[must_use]
    pub fn contains(&self, x: u16, y: u16) -> bool {
        x < self.width && y < self.height
    }
}

/// A single-pixel update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Patch {
    /// Column
    pub x: u16,
    /// Row
    pub y: u16,
    /// New color
    pub color: Color,
}

impl Patch {
    /// Create a patch
    #[must_use]
    pub fn new(x: u16, y: u16, color: Color) -> Self {
        Self { x, y, color }
    }
}

/// Result of the version-staleness check on a mutation
///
/// Stale updates are still applied (last write wins); this only reports it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// Incoming version was strictly greater than the current one
    Advanced,
    /// Incoming version was not greater than the current one
    Stale {
        /// Version held before the update
        current: u32,
    },
}

impl Freshness {
    /// Whether the staleness warning fired
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

/// Outcome of a keyframe ingestion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyframeReport {
    /// Version now held by the canvas
    pub version: u32,
    /// Staleness of the keyframe relative to the previous state
    pub freshness: Freshness,
    /// Samples that did not match the palette
    pub classify: ClassifyReport,
}

#[derive(Debug, Default)]
struct CanvasInner {
    version: u32,
    colors: HashMap<u32, Color>,
}

/// Concurrency-safe canvas mirror
#[derive(Debug)]
pub struct CanvasState {
    dims: CanvasDims,
    codec: ColorCodec,
    inner: RwLock<CanvasInner>,
}

impl Default for CanvasState {
    fn default() -> Self {
        Self::new(CanvasDims::default())
    }
}

impl CanvasState {
    /// Create an empty canvas (version 0)
    #[must_use]
    pub fn new(dims: CanvasDims) -> Self {
        Self {
            dims,
            codec: ColorCodec::canvas(),
            inner: RwLock::new(CanvasInner::default()),
        }
    }

    /// Canvas dimensions
    #[must_use]
    pub fn dims(&self) -> CanvasDims {
        self.dims
    }

    /// Current version
    #[must_use]
    pub fn version(&self) -> u32 {
        self.inner.read().version
    }

    /// Color at `(x, y)`
    ///
    /// Never-observed and out-of-bounds coordinates read as [`Color::Unknown`].
    #[must_use]
    pub fn at(&self, x: u16, y: u16) -> Color {
        if !self.dims.contains(x, y) {
            return Color::Unknown;
        }
        self.inner
            .read()
            .colors
            .get(&coord_key(x, y))
            .copied()
            .unwrap_or(Color::Unknown)
    }

    /// Replace the whole canvas from a decoded snapshot
    ///
    /// # Errors
    ///
    /// Returns `PainterError::Format` if the grid size differs from the
    /// canvas dimensions. The canvas is left untouched in that case.
    pub fn apply_keyframe(&self, version: u32, grid: &RgbaImage) -> PainterResult<KeyframeReport> {
        let (width, height) = grid.dimensions();
        if width != u32::from(self.dims.width) || height != u32::from(self.dims.height) {
            return Err(PainterError::Format(format!(
                "Unexpected keyframe bounds {width}x{height} (expected {}x{})",
                self.dims.width, self.dims.height
            )));
        }

        let mut classify = ClassifyReport::default();
        let mut colors = HashMap::with_capacity(grid.len() / 4);
        for (x, y, sample) in grid.enumerate_pixels() {
            match self.codec.classify(*sample) {
                Color::Unknown | Color::Transparent => classify.record_unknown(x, y),
                // Bounds were checked against u16 dimensions above
                color => {
                    colors.insert(coord_key(x as u16, y as u16), color);
                }
            }
        }

        let freshness = {
            let mut inner = self.inner.write();
            let freshness = check_version(inner.version, version);
            inner.colors = colors;
            inner.version = version;
            freshness
        };

        if let Freshness::Stale { current } = freshness {
            tracing::warn!(current, incoming = version, "Applying stale keyframe");
        }
        if !classify.is_clean() {
            tracing::warn!(
                unknown = classify.unknown,
                first = ?classify.first_unknown,
                "Keyframe contains colors outside the palette"
            );
        }

        Ok(KeyframeReport {
            version,
            freshness,
            classify,
        })
    }

    /// Set a single coordinate and advance the version
    pub fn apply_patch(&self, x: u16, y: u16, color: Color, version: u32) -> Freshness {
        self.apply_patches(version, &[Patch::new(x, y, color)])
    }

    /// Apply every patch of one realtime message under a single lock
    ///
    /// Equivalent to calling [`Self::apply_patch`] for each entry in order,
    /// with one staleness check for the whole batch.
    pub fn apply_patches(&self, version: u32, patches: &[Patch]) -> Freshness {
        let freshness = {
            let mut inner = self.inner.write();
            let freshness = check_version(inner.version, version);
            for patch in patches {
                inner.colors.insert(coord_key(patch.x, patch.y), patch.color);
            }
            inner.version = version;
            freshness
        };

        if let Freshness::Stale { current } = freshness {
            tracing::warn!(
                current,
                incoming = version,
                patches = patches.len(),
                "Applying stale patch"
            );
        }
        freshness
    }
}

fn check_version(current: u32, incoming: u32) -> Freshness {
    if incoming <= current {
        Freshness::Stale { current }
    } else {
        Freshness::Advanced
    }
}
