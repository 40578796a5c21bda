//! Target images anchored on the canvas
//!
//! A [`PatternSource`] is loaded once at startup and never changes. It answers
//! "what color should this canvas coordinate be", returning
//! [`Color::Transparent`] wherever it has no opinion.

use std::path::Path;

use image::RgbaImage;

use crate::canvas::CanvasDims;
use crate::color::{ClassifyReport, Color, ColorCodec};
use crate::error::{PainterError, PainterResult};

/// Dense read-only grid of palette colors
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaletteGrid {
    width: u16,
    height: u16,
    cells: Vec<Color>,
}

impl PaletteGrid {
    /// Classify a decoded image with the pattern codec
    ///
    /// Samples that are neither palette colors nor fully transparent are
    /// recorded in the returned report and stored as transparent.
    ///
    /// # Errors
    ///
    /// Returns `PainterError::Format` if the image is empty or larger than
    /// a canvas coordinate can address.
    pub fn classify(image: &RgbaImage) -> PainterResult<(Self, ClassifyReport)> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PainterError::Format("Pattern image is empty".into()));
        }
        let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(PainterError::Format(format!(
                "Pattern image too large: {width}x{height}"
            )));
        };

        let codec = ColorCodec::pattern();
        let mut report = ClassifyReport::default();
        let mut cells = Vec::with_capacity(usize::from(w) * usize::from(h));
        for (x, y, sample) in image.enumerate_pixels() {
            let color = match codec.classify(*sample) {
                Color::Unknown => {
                    report.record_unknown(x, y);
                    Color::Transparent
                }
                color => color,
            };
            cells.push(color);
        }

        Ok((
            Self {
                width: w,
                height: h,
                cells,
            },
            report,
        ))
    }

    /// Build a grid from explicit cells in row-major order
    ///
    /// # Errors
    ///
    /// Returns `PainterError::Format` if `cells` does not hold exactly
    /// `width * height` entries.
    pub fn from_cells(width: u16, height: u16, cells: Vec<Color>) -> PainterResult<Self> {
        if width == 0 || height == 0 || cells.len() != usize::from(width) * usize::from(height) {
            return Err(PainterError::Format(format!(
                "Grid of {} cells does not match {width}x{height}",
                cells.len()
            )));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Width in pixels
    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Height in pixels
    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Color at a grid-local coordinate, transparent outside the grid
    #[must_use]
    pub fn at(&self, x: u16, y: u16) -> Color {
        if x >= self.width || y >= self.height {
            return Color::Transparent;
        }
        self.cells[usize::from(y) * usize::from(self.width) + usize::from(x)]
    }
}

/// Inclusive canvas rectangle covered by a pattern
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    /// Left edge
    pub x0: u16,
    /// Top edge
    pub y0: u16,
    /// Right edge (inclusive)
    pub x1: u16,
    /// Bottom edge (inclusive)
    pub y1: u16,
}

impl Bounds {
    /// Whether the canvas coordinate falls inside
    #[must_use]
    pub fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

/// An immutable target image anchored at a canvas offset
#[derive(Clone, Debug)]
pub struct PatternSource {
    name: String,
    grid: PaletteGrid,
    bounds: Bounds,
}

impl PatternSource {
    /// Anchor a grid at `(x0, y0)`
    ///
    /// # Errors
    ///
    /// Returns `PainterError::Format` if the pattern does not fit inside the
    /// canvas at that anchor.
    pub fn new(
        name: impl Into<String>,
        x0: u16,
        y0: u16,
        grid: PaletteGrid,
        canvas: CanvasDims,
    ) -> PainterResult<Self> {
        let name = name.into();
        let x_end = u32::from(x0) + u32::from(grid.width());
        let y_end = u32::from(y0) + u32::from(grid.height());
        if x_end > u32::from(canvas.width) || y_end > u32::from(canvas.height) {
            return Err(PainterError::Format(format!(
                "Pattern '{name}' ({}x{} at {x0},{y0}) does not fit the {}x{} canvas",
                grid.width(),
                grid.height(),
                canvas.width,
                canvas.height
            )));
        }
        let bounds = Bounds {
            x0,
            y0,
            x1: x0 + grid.width() - 1,
            y1: y0 + grid.height() - 1,
        };
        Ok(Self { name, grid, bounds })
    }

    /// Decode a PNG asset and anchor it
    ///
    /// `expected` pins the asset size when the caller knows it.
    ///
    /// # Errors
    ///
    /// Returns `PainterError::Format` if the bytes are not a decodable image,
    /// if the size differs from `expected`, or if the pattern does not fit.
    pub fn from_png_bytes(
        name: impl Into<String>,
        x0: u16,
        y0: u16,
        bytes: &[u8],
        expected: Option<(u16, u16)>,
        canvas: CanvasDims,
    ) -> PainterResult<Self> {
        let name = name.into();
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (grid, report) = PaletteGrid::classify(&image)?;

        if let Some((w, h)) = expected {
            if (grid.width(), grid.height()) != (w, h) {
                return Err(PainterError::Format(format!(
                    "Pattern '{name}' is {}x{}, expected {w}x{h}",
                    grid.width(),
                    grid.height()
                )));
            }
        }
        if !report.is_clean() {
            tracing::warn!(
                pattern = %name,
                unknown = report.unknown,
                first = ?report.first_unknown,
                "Pattern has colors outside the palette; treating them as transparent"
            );
        }

        Self::new(name, x0, y0, grid, canvas)
    }

    /// Load a PNG asset from disk
    ///
    /// # Errors
    ///
    /// Returns `PainterError::Format` if the file cannot be read or decoded.
    pub fn load(
        path: &Path,
        x0: u16,
        y0: u16,
        expected: Option<(u16, u16)>,
        canvas: CanvasDims,
    ) -> PainterResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            PainterError::Format(format!("Failed to read pattern {}: {e}", path.display()))
        })?;
        let name = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        let pattern = Self::from_png_bytes(name, x0, y0, &bytes, expected, canvas)?;
        tracing::info!(
            pattern = %pattern.name,
            x0,
            y0,
            width = pattern.grid.width(),
            height = pattern.grid.height(),
            "Loaded pattern"
        );
        Ok(pattern)
    }

    /// Pattern name (for logs)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canvas rectangle covered by this pattern
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Desired color at a canvas coordinate
    ///
    /// Transparent outside the pattern bounds.
    #[must_use]
    pub fn color_at(&self, x: u16, y: u16) -> Color {
        if !self.bounds.contains(x, y) {
            return Color::Transparent;
        }
        self.grid.at(x - self.bounds.x0, y - self.bounds.y0)
    }
}
