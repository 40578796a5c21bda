//! In-memory [`RemoteCanvas`] for unit tests

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::canvas::CanvasState;
use crate::color::Color;
use crate::error::{PainterError, PainterResult};
use crate::reconcile::Pixel;
use crate::remote::{RemoteCanvas, Snapshot};

/// Scripted write outcome
#[derive(Clone, Debug)]
pub enum WriteOutcome {
    Ok,
    RateLimited,
    Rejected,
}

/// Records writes and serves a fixed snapshot
#[derive(Debug, Default)]
pub struct FakeRemote {
    pub writes: Mutex<Vec<Pixel>>,
    pub outcomes: Mutex<VecDeque<WriteOutcome>>,
    pub snapshot: Mutex<Option<Snapshot>>,
    pub snapshot_fetches: AtomicUsize,
    /// Successful writes are mirrored here, like the realtime echo
    pub echo: Mutex<Option<(Arc<CanvasState>, u32)>>,
    /// Writes are recorded, then park until this flips to true
    pub gate: Mutex<Option<watch::Receiver<bool>>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = WriteOutcome>) {
        self.outcomes.lock().extend(outcomes);
    }

    pub fn serve(&self, image: &RgbaImage, version: Option<u32>) {
        *self.snapshot.lock() = Some(Snapshot {
            bytes: png_bytes(image),
            version,
        });
    }

    pub fn echo_into(&self, canvas: Arc<CanvasState>) {
        let version = canvas.version();
        *self.echo.lock() = Some((canvas, version));
    }

    /// Park every write until the returned sender sends `true`
    pub fn hold_writes(&self) -> watch::Sender<bool> {
        let (open, gate) = watch::channel(false);
        *self.gate.lock() = Some(gate);
        open
    }

    pub fn written(&self) -> Vec<Pixel> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl RemoteCanvas for FakeRemote {
    async fn fetch_snapshot(&self) -> PainterResult<Snapshot> {
        self.snapshot_fetches.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .lock()
            .clone()
            .ok_or_else(|| PainterError::Transport("no snapshot".to_string()))
    }

    async fn write_pixel(&self, pixel: Pixel) -> PainterResult<()> {
        self.writes.lock().push(pixel);
        let gate = self.gate.lock().clone();
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }
        let outcome = self.outcomes.lock().pop_front().unwrap_or(WriteOutcome::Ok);
        match outcome {
            WriteOutcome::Ok => {
                if let Some((canvas, version)) = self.echo.lock().as_mut() {
                    *version += 1;
                    canvas.apply_patch(pixel.x, pixel.y, pixel.color, *version);
                }
                Ok(())
            }
            WriteOutcome::RateLimited => Err(PainterError::RateLimited { status: 403 }),
            WriteOutcome::Rejected => Err(PainterError::RejectedOther {
                status: Some(400),
                reason: "nope".to_string(),
            }),
        }
    }
}

/// Solid image of `color`
pub fn solid_image(width: u32, height: u32, color: Color) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color.to_rgba())
}

/// PNG-encode an image
pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
