//! Painter Core - Keeps pixel-art patterns painted on a shared canvas
//!
//! This crate mirrors a remote shared pixel canvas, compares it against one
//! or more target patterns and issues corrective single-pixel writes while
//! staying under the server's cost budget.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!   GET /current ─►│         CanvasState          │◄─ realtime edits (WebSocket)
//!   (keyframe)     │  version + coordinate→color  │
//!                  └──────────────┬───────────────┘
//!                                 │ At(x, y)
//!                  ┌──────────────┴───────────────┐
//!                  │  Reconciler (patterns, scan) │──► next Pixel
//!                  └──────────────┬───────────────┘
//!                                 │
//!   ┌──────────────────┐   ┌──────┴───────┐   ┌────────────────────┐
//!   │ AdmissionScheduler│◄─│ dispatch loop │──►│ POST /edit (remote)│
//!   │ cost window       │  │ + in-flight   │   └────────────────────┘
//!   └──────────────────┘   └──────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`CanvasState`]: versioned, lock-protected canvas mirror
//! - [`Reconciler`]: finds the next coordinate that disagrees with a pattern
//! - [`AdmissionScheduler`]: sliding-window cost limiter with draw-call handles
//! - [`RealtimeSync`]: applies the WebSocket diff stream to the canvas
//! - [`HttpCanvasClient`]: snapshot fetches and pixel writes
//! - [`Engine`]: wires everything together; [`EngineHandle::stop`] shuts down
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use painter_core::{
//!     config::load_config, CanvasState, Engine, HttpCanvasClient, Reconciler,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let reconciler = Reconciler::new(config.load_patterns()?);
//!     let remote = Arc::new(HttpCanvasClient::new(config.remote.clone())?);
//!     let canvas = Arc::new(CanvasState::new(config.canvas));
//!
//!     let handle = Engine::new(config, remote, reconciler).start(canvas);
//!     tokio::signal::ctrl_c().await?;
//!     let stats = handle.stop().await;
//!     println!("{stats:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`color`]: palette and RGBA classification
//! - [`canvas`]: the canvas mirror
//! - [`pattern`]: target patterns loaded from PNG assets
//! - [`reconcile`]: correction search and the in-flight set
//! - [`scheduler`]: admission control
//! - [`realtime`]: diff frame decoding and the WebSocket session
//! - [`remote`]: remote canvas access over HTTP
//! - [`painter`]: the dispatch loop
//! - [`engine`]: driver loop and Start/Stop
//! - [`config`]: TOML/env/CLI configuration
//! - [`error`]: error taxonomy

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod canvas;
pub mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod painter;
pub mod pattern;
pub mod realtime;
pub mod reconcile;
pub mod remote;
pub mod scheduler;

/// User-Agent sent with every remote request unless configured otherwise
pub const DEFAULT_USER_AGENT: &str = concat!("canvas-painter/", env!("CARGO_PKG_VERSION"));

// Re-exports for convenience
pub use canvas::{CanvasDims, CanvasState, Freshness, KeyframeReport, Patch};
pub use color::{ClassifyReport, Color, ColorCodec, PALETTE};
pub use config::{ConfigError, ConfigOverrides, PainterConfig, PatternEntry};
pub use engine::{Engine, EngineHandle, EngineStats};
pub use error::{PainterError, PainterResult};
pub use painter::{PaintStats, Painter, PainterSettings};
pub use pattern::{PaletteGrid, PatternSource};
pub use realtime::{ConnectionState, RealtimeConfig, RealtimeSync, SyncExit};
pub use reconcile::{InFlightSet, Pixel, Reconciler};
pub use remote::{HttpCanvasClient, RemoteCanvas, RemoteConfig, Snapshot};
pub use scheduler::{AdmissionScheduler, DrawCallHandle, SchedulerConfig};

#[cfg(test)]
mod testing;
