//! Finding the next pixel that needs correcting
//!
//! The reconciler walks each pattern's rectangle in a fixed order and returns
//! the first coordinate where the canvas disagrees with the pattern. It is a
//! plain linear scan: corrections are rate-limited to a handful per window,
//! so scan cost never dominates.

use std::collections::HashSet;
use std::fmt;

use parking_lot::{Mutex, MutexGuard};

use crate::canvas::{coord_key, CanvasState};
use crate::color::Color;
use crate::pattern::PatternSource;

/// A corrective write: paint `(x, y)` with `color`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pixel {
    /// Column
    pub x: u16,
    /// Row
    pub y: u16,
    /// Desired color
    pub color: Color,
}

impl Pixel {
    /// Create a pixel
    #[must_use]
    pub fn new(x: u16, y: u16, color: Color) -> Self {
        Self { x, y, color }
    }

    /// Packed coordinate key
    #[must_use]
    pub fn key(&self) -> u32 {
        coord_key(self.x, self.y)
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}", self.x, self.y, self.color)
    }
}

// =============================================================================
// In-flight set
// =============================================================================

/// Coordinates with a write issued but not yet settled
///
/// Guarded by its own lock, independent of the canvas and the scheduler.
#[derive(Debug, Default)]
pub struct InFlightSet {
    keys: Mutex<HashSet<u32>>,
}

impl InFlightSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the set for a scan-and-claim sequence
    pub fn lock(&self) -> InFlightGuard<'_> {
        InFlightGuard {
            keys: self.keys.lock(),
        }
    }

    /// Release a coordinate once its write has settled
    pub fn release(&self, x: u16, y: u16) -> bool {
        self.keys.lock().remove(&coord_key(x, y))
    }

    /// Whether `(x, y)` is in flight
    #[must_use]
    pub fn contains(&self, x: u16, y: u16) -> bool {
        self.keys.lock().contains(&coord_key(x, y))
    }

    /// Number of in-flight coordinates
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether nothing is in flight
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive view of the in-flight set
///
/// Holding the guard across [`Reconciler::next_correction`] and
/// [`InFlightGuard::claim`] keeps the scan and the insert atomic.
pub struct InFlightGuard<'a> {
    keys: MutexGuard<'a, HashSet<u32>>,
}

impl InFlightGuard<'_> {
    /// Whether `(x, y)` is in flight
    #[must_use]
    pub fn contains(&self, x: u16, y: u16) -> bool {
        self.keys.contains(&coord_key(x, y))
    }

    /// Mark a pixel as in flight; returns false if it already was
    pub fn claim(&mut self, pixel: &Pixel) -> bool {
        self.keys.insert(pixel.key())
    }
}

/// Read-only membership test used by the scan
pub trait InFlightView {
    /// Whether `(x, y)` must be skipped
    fn is_in_flight(&self, x: u16, y: u16) -> bool;
}

impl InFlightView for InFlightGuard<'_> {
    fn is_in_flight(&self, x: u16, y: u16) -> bool {
        self.contains(x, y)
    }
}

impl InFlightView for HashSet<u32> {
    fn is_in_flight(&self, x: u16, y: u16) -> bool {
        self.contains(&coord_key(x, y))
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Scans patterns in priority order against the canvas
#[derive(Clone, Debug, Default)]
pub struct Reconciler {
    sources: Vec<PatternSource>,
}

impl Reconciler {
    /// Create a reconciler; earlier sources take priority
    #[must_use]
    pub fn new(sources: Vec<PatternSource>) -> Self {
        Self { sources }
    }

    /// Patterns in priority order
    #[must_use]
    pub fn sources(&self) -> &[PatternSource] {
        &self.sources
    }

    /// First coordinate that needs correcting, if any
    ///
    /// Each source is scanned column by column, top to bottom within a
    /// column. In-flight and transparent coordinates are skipped. `None`
    /// means every source is satisfied or blocked, which is the normal idle
    /// state.
    pub fn next_correction(
        &self,
        canvas: &CanvasState,
        in_flight: &impl InFlightView,
    ) -> Option<Pixel> {
        self.sources
            .iter()
            .find_map(|source| scan_source(source, canvas, in_flight))
    }
}

fn scan_source(
    source: &PatternSource,
    canvas: &CanvasState,
    in_flight: &impl InFlightView,
) -> Option<Pixel> {
    let bounds = source.bounds();
    for x in bounds.x0..=bounds.x1 {
        for y in bounds.y0..=bounds.y1 {
            if in_flight.is_in_flight(x, y) {
                continue;
            }
            let want = source.color_at(x, y);
            if want == Color::Transparent {
                continue;
            }
            if canvas.at(x, y) != want {
                tracing::debug!(pattern = source.name(), x, y, color = %want, "Found correction");
                return Some(Pixel::new(x, y, want));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::CanvasDims;
    use crate::pattern::PaletteGrid;

    fn solid(name: &str, x0: u16, y0: u16, w: u16, h: u16, color: Color) -> PatternSource {
        let grid = PaletteGrid::from_cells(w, h, vec![color; usize::from(w) * usize::from(h)])
            .unwrap();
        PatternSource::new(name, x0, y0, grid, CanvasDims::new(64, 64)).unwrap()
    }

    #[test]
    fn test_empty_canvas_needs_everything() {
        let canvas = CanvasState::new(CanvasDims::new(64, 64));
        let reconciler = Reconciler::new(vec![solid("a", 5, 5, 1, 1, Color::Black)]);
        let next = reconciler.next_correction(&canvas, &HashSet::new());
        assert_eq!(next, Some(Pixel::new(5, 5, Color::Black)));
    }

    #[test]
    fn test_satisfied_pattern_is_idle() {
        let canvas = CanvasState::new(CanvasDims::new(64, 64));
        canvas.apply_patch(5, 5, Color::Black, 1);
        let reconciler = Reconciler::new(vec![solid("a", 5, 5, 1, 1, Color::Black)]);
        assert_eq!(reconciler.next_correction(&canvas, &HashSet::new()), None);
    }

    #[test]
    fn test_column_major_scan_order() {
        let canvas = CanvasState::new(CanvasDims::new(64, 64));
        let reconciler = Reconciler::new(vec![solid("a", 0, 0, 2, 2, Color::Red)]);
        let mut in_flight = HashSet::new();

        let mut order = Vec::new();
        while let Some(p) = reconciler.next_correction(&canvas, &in_flight) {
            order.push((p.x, p.y));
            in_flight.insert(p.key());
        }
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_priority_order() {
        let canvas = CanvasState::new(CanvasDims::new(64, 64));
        let reconciler = Reconciler::new(vec![
            solid("first", 30, 30, 1, 1, Color::Green),
            solid("second", 0, 0, 1, 1, Color::Red),
        ]);
        let next = reconciler.next_correction(&canvas, &HashSet::new());
        assert_eq!(next, Some(Pixel::new(30, 30, Color::Green)));

        canvas.apply_patch(30, 30, Color::Green, 1);
        let next = reconciler.next_correction(&canvas, &HashSet::new());
        assert_eq!(next, Some(Pixel::new(0, 0, Color::Red)));
    }

    #[test]
    fn test_skips_in_flight_and_transparent() {
        let canvas = CanvasState::new(CanvasDims::new(64, 64));
        let grid =
            PaletteGrid::from_cells(3, 1, vec![Color::Transparent, Color::Red, Color::Pink])
                .unwrap();
        let pattern = PatternSource::new("p", 0, 0, grid, CanvasDims::new(64, 64)).unwrap();
        let reconciler = Reconciler::new(vec![pattern]);

        let in_flight = InFlightSet::new();
        {
            let mut guard = in_flight.lock();
            let first = reconciler.next_correction(&canvas, &guard).unwrap();
            assert_eq!(first, Pixel::new(1, 0, Color::Red));
            assert!(guard.claim(&first));
            assert!(!guard.claim(&first));

            let second = reconciler.next_correction(&canvas, &guard).unwrap();
            assert_eq!(second, Pixel::new(2, 0, Color::Pink));
            guard.claim(&second);

            assert_eq!(reconciler.next_correction(&canvas, &guard), None);
        }

        assert_eq!(in_flight.len(), 2);
        assert!(in_flight.release(1, 0));
        assert!(!in_flight.release(1, 0));
        assert!(!in_flight.contains(1, 0));
        assert!(in_flight.contains(2, 0));
    }

    #[test]
    fn test_no_sources_is_idle() {
        let canvas = CanvasState::new(CanvasDims::new(8, 8));
        let reconciler = Reconciler::default();
        assert_eq!(reconciler.next_correction(&canvas, &HashSet::new()), None);
    }
}
