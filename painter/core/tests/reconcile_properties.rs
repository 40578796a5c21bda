//! Randomized checks of the correction search
//!
//! Fixtures are generated from fixed seeds so failures reproduce.

use std::collections::{BTreeSet, HashSet};

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use painter_core::canvas::coord_key;
use painter_core::{
    CanvasDims, CanvasState, Color, InFlightSet, PaletteGrid, PatternSource, Reconciler, PALETTE,
};

const DIMS: CanvasDims = CanvasDims {
    width: 48,
    height: 32,
};

fn random_color(rng: &mut StdRng, transparent_ratio: f64) -> Color {
    if rng.gen_bool(transparent_ratio) {
        Color::Transparent
    } else {
        PALETTE[rng.gen_range(0..PALETTE.len())]
    }
}

fn random_pattern(rng: &mut StdRng, name: &str) -> PatternSource {
    let w = rng.gen_range(1..=12u16);
    let h = rng.gen_range(1..=12u16);
    let x0 = rng.gen_range(0..=DIMS.width - w);
    let y0 = rng.gen_range(0..=DIMS.height - h);
    let cells = (0..usize::from(w) * usize::from(h))
        .map(|_| random_color(rng, 0.2))
        .collect();
    let grid = PaletteGrid::from_cells(w, h, cells).unwrap();
    PatternSource::new(name, x0, y0, grid, DIMS).unwrap()
}

fn random_canvas(rng: &mut StdRng) -> CanvasState {
    let canvas = CanvasState::new(DIMS);
    let mut version = 0;
    for x in 0..DIMS.width {
        for y in 0..DIMS.height {
            // Leave some coordinates never observed
            if rng.gen_bool(0.9) {
                version += 1;
                canvas.apply_patch(x, y, PALETTE[rng.gen_range(0..4)], version);
            }
        }
    }
    canvas
}

/// Coordinates whose effective desired color differs from the canvas
///
/// Union over all sources; overlapping coordinates are listed once.
fn expected_mismatches(sources: &[PatternSource], canvas: &CanvasState) -> BTreeSet<(u16, u16)> {
    let mut out = BTreeSet::new();
    for source in sources {
        let b = source.bounds();
        for x in b.x0..=b.x1 {
            for y in b.y0..=b.y1 {
                let want = source.color_at(x, y);
                if want != Color::Transparent && canvas.at(x, y) != want {
                    out.insert((x, y));
                }
            }
        }
    }
    out
}

#[test]
fn test_draining_corrections_visits_each_mismatch_once() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let sources: Vec<_> = (0..rng.gen_range(1..4))
            .map(|i| random_pattern(&mut rng, &format!("p{i}")))
            .collect();
        let canvas = random_canvas(&mut rng);
        let reconciler = Reconciler::new(sources.clone());

        let in_flight = InFlightSet::new();
        let mut seen = BTreeSet::new();
        loop {
            let mut guard = in_flight.lock();
            let Some(pixel) = reconciler.next_correction(&canvas, &guard) else {
                break;
            };
            assert_ne!(pixel.color, Color::Transparent, "seed {seed}");
            assert_ne!(canvas.at(pixel.x, pixel.y), pixel.color, "seed {seed}");
            assert!(guard.claim(&pixel), "seed {seed}: {pixel} proposed twice");
            assert!(seen.insert((pixel.x, pixel.y)));
        }

        assert_eq!(seen, expected_mismatches(&sources, &canvas), "seed {seed}");
        assert_eq!(in_flight.len(), seen.len());
    }
}

#[test]
fn test_higher_priority_source_wins() {
    for seed in 100..120u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let first = random_pattern(&mut rng, "first");
        let second = random_pattern(&mut rng, "second");
        let canvas = random_canvas(&mut rng);
        let reconciler = Reconciler::new(vec![first.clone(), second]);

        let first_only = Reconciler::new(vec![first]);
        let blocked: HashSet<u32> = HashSet::new();
        if let Some(expected) = first_only.next_correction(&canvas, &blocked) {
            assert_eq!(
                reconciler.next_correction(&canvas, &blocked),
                Some(expected),
                "seed {seed}"
            );
        }
    }
}

#[test]
fn test_satisfied_canvas_is_idle() {
    for seed in 200..210u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let source = random_pattern(&mut rng, "p");
        let canvas = random_canvas(&mut rng);

        // Paint the pattern in, then nothing remains to do
        let b = source.bounds();
        let mut version = canvas.version();
        for x in b.x0..=b.x1 {
            for y in b.y0..=b.y1 {
                let want = source.color_at(x, y);
                if want != Color::Transparent {
                    version += 1;
                    canvas.apply_patch(x, y, want, version);
                }
            }
        }

        let reconciler = Reconciler::new(vec![source]);
        assert_eq!(
            reconciler.next_correction(&canvas, &HashSet::<u32>::new()),
            None,
            "seed {seed}"
        );
    }
}

#[test]
fn test_in_flight_coordinates_are_skipped() {
    let mut rng = StdRng::seed_from_u64(7);
    let source = random_pattern(&mut rng, "p");
    let canvas = CanvasState::new(DIMS);
    let reconciler = Reconciler::new(vec![source.clone()]);

    // Block everything but the last opaque coordinate of the scan
    let b = source.bounds();
    let mut opaque = Vec::new();
    for x in b.x0..=b.x1 {
        for y in b.y0..=b.y1 {
            if source.color_at(x, y) != Color::Transparent {
                opaque.push((x, y));
            }
        }
    }
    let Some(&(lx, ly)) = opaque.last() else {
        return;
    };
    let blocked: HashSet<u32> = opaque[..opaque.len() - 1]
        .iter()
        .map(|&(x, y)| coord_key(x, y))
        .collect();

    let next = reconciler.next_correction(&canvas, &blocked).unwrap();
    assert_eq!((next.x, next.y), (lx, ly));
}
