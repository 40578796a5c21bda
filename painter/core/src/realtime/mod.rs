//! Realtime diff stream
//!
//! The remote pushes pixel edits over a WebSocket as they happen. This module
//! splits the concern in two:
//!
//! - [`decoder`]: pure decoding of wire frames into [`Patch`](crate::canvas::Patch)es
//! - [`sync`]: the connection lifecycle that feeds decoded edits into the canvas

pub mod decoder;
pub mod sync;

pub use decoder::{decode_edit, decode_frame, EditBatch, Frame, MIN_FRAME_LEN};
pub use sync::{ConnectionState, RealtimeConfig, RealtimeSync, ResyncReason, SyncExit, SyncStats};
