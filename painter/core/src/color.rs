//! Palette colors and raw sample classification
//!
//! The remote canvas only ever stores one of sixteen palette entries. Raw
//! RGBA samples coming out of a decoded snapshot or pattern asset are mapped
//! back onto that palette with an exact-match table scan; anything that does
//! not match is reported as [`Color::Unknown`].
//!
//! [`Color::Transparent`] is never a canvas value. It only appears in pattern
//! assets, where it means "no opinion about this coordinate".

use std::fmt;

use image::Rgba;

/// A palette color, or one of the two sentinels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    /// `#FFFFFF`
    White = 0,
    /// `#E4E4E4`
    LightGray = 1,
    /// `#888888`
    Gray = 2,
    /// `#222222`
    Black = 3,
    /// `#FFA7D1`
    Pink = 4,
    /// `#E50000`
    Red = 5,
    /// `#E59500`
    Orange = 6,
    /// `#A06A42`
    Brown = 7,
    /// `#E5D900`
    Yellow = 8,
    /// `#94E044`
    LightGreen = 9,
    /// `#02BE01`
    Green = 10,
    /// `#00D3DD`
    Cyan = 11,
    /// `#0083C7`
    MediumBlue = 12,
    /// `#0000EA`
    DarkBlue = 13,
    /// `#CF6EE4`
    LightPurple = 14,
    /// `#820080`
    DarkPurple = 15,
    /// Classification failed, or the coordinate was never observed
    Unknown = 0xFE,
    /// Pattern has no opinion about this coordinate
    Transparent = 0xFF,
}

/// Number of real palette entries
pub const PALETTE_SIZE: usize = 16;

/// Palette entries in wire-index order
pub const PALETTE: [Color; PALETTE_SIZE] = [
    Color::White,
    Color::LightGray,
    Color::Gray,
    Color::Black,
    Color::Pink,
    Color::Red,
    Color::Orange,
    Color::Brown,
    Color::Yellow,
    Color::LightGreen,
    Color::Green,
    Color::Cyan,
    Color::MediumBlue,
    Color::DarkBlue,
    Color::LightPurple,
    Color::DarkPurple,
];

/// Reference RGB values, indexed like [`PALETTE`]
const REFERENCE_RGB: [[u8; 3]; PALETTE_SIZE] = [
    [0xFF, 0xFF, 0xFF],
    [0xE4, 0xE4, 0xE4],
    [0x88, 0x88, 0x88],
    [0x22, 0x22, 0x22],
    [0xFF, 0xA7, 0xD1],
    [0xE5, 0x00, 0x00],
    [0xE5, 0x95, 0x00],
    [0xA0, 0x6A, 0x42],
    [0xE5, 0xD9, 0x00],
    [0x94, 0xE0, 0x44],
    [0x02, 0xBE, 0x01],
    [0x00, 0xD3, 0xDD],
    [0x00, 0x83, 0xC7],
    [0x00, 0x00, 0xEA],
    [0xCF, 0x6E, 0xE4],
    [0x82, 0x00, 0x80],
];

impl Color {
    /// Look up a palette entry by its wire index
    ///
    /// Returns `None` for indices outside the palette.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        PALETTE.get(usize::from(index)).copied()
    }

    /// Wire index of a palette entry; `None` for the sentinels
    #[must_use]
    pub fn index(self) -> Option<u8> {
        if self.is_palette() {
            Some(self as u8)
        } else {
            None
        }
    }

    /// Whether this is a real palette color (not a sentinel)
    #[must_use]
    pub fn is_palette(self) -> bool {
        !matches!(self, Self::Unknown | Self::Transparent)
    }

    /// Reference RGB value of a palette entry
    #[must_use]
    pub fn rgb(self) -> Option<[u8; 3]> {
        self.index().map(|i| REFERENCE_RGB[usize::from(i)])
    }

    /// Opaque RGBA sample for a palette entry
    ///
    /// Sentinels map to a fully transparent sample.
    #[must_use]
    pub fn to_rgba(self) -> Rgba<u8> {
        match self.rgb() {
            Some([r, g, b]) => Rgba([r, g, b, 0xFF]),
            None => Rgba([0, 0, 0, 0]),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::White => "white",
            Self::LightGray => "light-gray",
            Self::Gray => "gray",
            Self::Black => "black",
            Self::Pink => "pink",
            Self::Red => "red",
            Self::Orange => "orange",
            Self::Brown => "brown",
            Self::Yellow => "yellow",
            Self::LightGreen => "light-green",
            Self::Green => "green",
            Self::Cyan => "cyan",
            Self::MediumBlue => "medium-blue",
            Self::DarkBlue => "dark-blue",
            Self::LightPurple => "light-purple",
            Self::DarkPurple => "dark-purple",
            Self::Unknown => "unknown",
            Self::Transparent => "transparent",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Maps raw RGBA samples onto the palette
///
/// Matching is exact: the remote service emits identical byte values for
/// every palette color, so there is no nearest-neighbour fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct ColorCodec {
    allow_transparent: bool,
}

impl ColorCodec {
    /// Codec for canvas snapshots: transparent samples are unknown
    #[must_use]
    pub fn canvas() -> Self {
        Self {
            allow_transparent: false,
        }
    }

    /// Codec for pattern assets: alpha 0 means [`Color::Transparent`]
    #[must_use]
    pub fn pattern() -> Self {
        Self {
            allow_transparent: true,
        }
    }

    /// Classify a single sample
    #[must_use]
    pub fn classify(&self, sample: Rgba<u8>) -> Color {
        let [r, g, b, a] = sample.0;
        if a == 0 && self.allow_transparent {
            return Color::Transparent;
        }
        if a != 0xFF {
            return Color::Unknown;
        }
        REFERENCE_RGB
            .iter()
            .position(|rgb| *rgb == [r, g, b])
            .map_or(Color::Unknown, |i| PALETTE[i])
    }
}

/// Tally of samples that failed classification
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassifyReport {
    /// Number of samples that classified as [`Color::Unknown`]
    pub unknown: usize,
    /// First offending coordinate, in scan order
    pub first_unknown: Option<(u32, u32)>,
}

impl ClassifyReport {
    /// Record an unknown sample at `(x, y)`
    pub fn record_unknown(&mut self, x: u32, y: u32) {
        self.unknown += 1;
        if self.first_unknown.is_none() {
            self.first_unknown = Some((x, y));
        }
    }

    /// Whether every sample matched
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unknown == 0
    }
}
