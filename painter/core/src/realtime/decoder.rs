//! Realtime diff frame decoding
//!
//! # Frame Format
//!
//! ```text
//! "reload" | "refresh"                 -> tear down and resync
//!
//! +----------------+--------+--------+-----
//! | Version (4)    | Edit 0 | Edit 1 | ...
//! | little-endian  | 3 bytes| 3 bytes|
//! +----------------+--------+--------+-----
//! ```
//!
//! Each edit packs a 10-bit x, a 10-bit y and a 4-bit palette index:
//!
//! ```text
//! byte0: x[0..8]
//! byte1: x[8..10] in bits 0-1, y[0..6] in bits 2-7
//! byte2: y[6..10] in bits 0-3, color in bits 4-7
//! ```
//!
//! Malformed input never escalates past a [`PainterError::Protocol`]; complete
//! edits in front of a short trailing group are still delivered.

use crate::canvas::{CanvasDims, Patch};
use crate::color::PALETTE;
use crate::error::{PainterError, PainterResult};

/// Shortest valid edit frame: a version and one edit
pub const MIN_FRAME_LEN: usize = 7;

/// Size of the version header
const VERSION_LEN: usize = 4;

/// Size of one packed edit
const EDIT_LEN: usize = 3;

const RELOAD: &[u8] = b"reload";
const REFRESH: &[u8] = b"refresh";

/// A decoded realtime message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Remote asks for a full resync
    Reload,
    /// Remote asks for a full resync
    Refresh,
    /// Pixel edits at a version
    Edits(EditBatch),
}

impl Frame {
    /// Whether the stream must be torn down and reconnected
    #[must_use]
    pub fn requires_resync(&self) -> bool {
        matches!(self, Self::Reload | Self::Refresh)
    }
}

/// Edits carried by one message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditBatch {
    /// Server-assigned version of the message
    pub version: u32,
    /// Decoded edits, in wire order
    pub patches: Vec<Patch>,
    /// Bytes of an incomplete trailing group, if any
    pub malformed_tail: Option<Vec<u8>>,
}

impl EditBatch {
    /// Drop edits outside the canvas; returns how many were dropped
    pub fn retain_within(&mut self, dims: CanvasDims) -> usize {
        let before = self.patches.len();
        self.patches.retain(|p| dims.contains(p.x, p.y));
        before - self.patches.len()
    }
}

/// Decode one packed edit
#[inline]
#[must_use]
pub fn decode_edit(group: [u8; 3]) -> Patch {
    let [b0, b1, b2] = group;
    let x = u16::from(b0) | (u16::from(b1 & 0x3) << 8);
    let y = u16::from(b1 >> 2) | (u16::from(b2 & 0xF) << 6);
    // High nibble is always a valid palette index
    let color = PALETTE[usize::from(b2 >> 4)];
    Patch::new(x, y, color)
}

/// Decode one realtime message
///
/// # Errors
///
/// Returns `PainterError::Protocol` for messages shorter than
/// [`MIN_FRAME_LEN`] that are not a resync command.
pub fn decode_frame(message: &[u8]) -> PainterResult<Frame> {
    if message == RELOAD {
        return Ok(Frame::Reload);
    }
    if message == REFRESH {
        return Ok(Frame::Refresh);
    }
    if message.len() < MIN_FRAME_LEN {
        return Err(PainterError::Protocol(format!(
            "Frame too short ({} bytes): {message:?}",
            message.len()
        )));
    }

    let (header, body) = message.split_at(VERSION_LEN);
    let version = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);

    let chunks = body.chunks_exact(EDIT_LEN);
    let tail = chunks.remainder();
    let patches = chunks
        .map(|c| decode_edit([c[0], c[1], c[2]]))
        .collect();

    Ok(Frame::Edits(EditBatch {
        version,
        patches,
        malformed_tail: (!tail.is_empty()).then(|| tail.to_vec()),
    }))
}
