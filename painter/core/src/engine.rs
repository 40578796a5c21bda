//! Engine lifecycle
//!
//! The engine owns the two long-running tasks:
//!
//! ```text
//! driver:   fetch snapshot ─► apply keyframe ─► stream realtime edits ─┐
//!              ▲                                                        │
//!              └────────────── stream dropped / reload ◄────────────────┘
//!
//! dispatch: Painter::run (see the painter module)
//! ```
//!
//! [`EngineHandle::stop`] flips a shared shutdown signal, runs the realtime
//! close handshake and joins both tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::canvas::{CanvasState, KeyframeReport};
use crate::config::PainterConfig;
use crate::error::PainterResult;
use crate::painter::{PaintStats, Painter};
use crate::realtime::{ConnectionState, RealtimeSync, SyncExit, SyncStats};
use crate::reconcile::Reconciler;
use crate::remote::{RemoteCanvas, Snapshot};
use crate::scheduler::{AdmissionScheduler, Clock, SchedulerMetrics, SystemClock};

/// Combined counters of a running engine
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Canvas version when the counters were read
    pub canvas_version: u32,
    /// Dispatch outcomes
    pub paint: PaintStats,
    /// Realtime stream counters
    pub realtime: SyncStats,
    /// Admission ledger
    pub scheduler: SchedulerMetrics,
}

/// Wires configuration, remote and patterns into running tasks
pub struct Engine {
    config: PainterConfig,
    remote: Arc<dyn RemoteCanvas>,
    reconciler: Arc<Reconciler>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Create an engine
    #[must_use]
    pub fn new(config: PainterConfig, remote: Arc<dyn RemoteCanvas>, reconciler: Reconciler) -> Self {
        Self {
            config,
            remote,
            reconciler: Arc::new(reconciler),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different clock for the admission scheduler
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the driver and dispatch tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, canvas: Arc<CanvasState>) -> EngineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let patterns = self.reconciler.sources().len();

        let realtime = Arc::new(RealtimeSync::new(
            self.config.realtime.clone(),
            Arc::clone(&canvas),
        ));
        let scheduler = AdmissionScheduler::with_clock(self.config.scheduler.clone(), self.clock);
        let painter = Arc::new(Painter::new(
            self.config.painter.clone(),
            Arc::clone(&canvas),
            self.reconciler,
            scheduler,
            Arc::clone(&self.remote),
        ));

        let driver = tokio::spawn(drive(
            Arc::clone(&self.remote),
            Arc::clone(&canvas),
            Arc::clone(&realtime),
            self.config.snapshot_retry_delay,
            shutdown_rx.clone(),
        ));
        let dispatch = tokio::spawn({
            let painter = Arc::clone(&painter);
            async move { painter.run(shutdown_rx).await }
        });

        info!(
            patterns,
            budget = self.config.scheduler.budget_per_window,
            "Engine started"
        );

        EngineHandle {
            shutdown_tx,
            canvas,
            realtime,
            painter,
            driver,
            dispatch,
        }
    }
}

/// Control handle for a started engine
pub struct EngineHandle {
    shutdown_tx: watch::Sender<bool>,
    canvas: Arc<CanvasState>,
    realtime: Arc<RealtimeSync>,
    painter: Arc<Painter>,
    driver: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

impl EngineHandle {
    /// Current counters
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            canvas_version: self.canvas.version(),
            paint: self.painter.stats(),
            realtime: self.realtime.stats(),
            scheduler: self.painter.scheduler().metrics(),
        }
    }

    /// Realtime connection state
    #[must_use]
    pub fn realtime_state(&self) -> ConnectionState {
        self.realtime.state()
    }

    /// Canvas being maintained
    #[must_use]
    pub fn canvas(&self) -> &Arc<CanvasState> {
        &self.canvas
    }

    /// Stop both tasks and return the final counters
    ///
    /// Write tasks already issued keep running until their settle delay
    /// elapses.
    pub async fn stop(self) -> EngineStats {
        info!("Stopping engine");
        self.shutdown_tx.send_replace(true);
        self.realtime.shutdown().await;

        if let Err(e) = self.driver.await {
            warn!(error = %e, "Driver task failed");
        }
        if let Err(e) = self.dispatch.await {
            warn!(error = %e, "Dispatch task failed");
        }

        let stats = EngineStats {
            canvas_version: self.canvas.version(),
            paint: self.painter.stats(),
            realtime: self.realtime.stats(),
            scheduler: self.painter.scheduler().metrics(),
        };
        info!(stats = ?stats, "Engine stopped");
        stats
    }
}

// =============================================================================
// Driver loop
// =============================================================================

/// Apply a fetched snapshot
///
/// Returns `Ok(None)` when the snapshot carries no version; it is not applied
/// because nothing could be resumed from it.
///
/// # Errors
///
/// Returns `PainterError::Format` if the image cannot be decoded or does not
/// match the canvas size.
pub fn refresh_canvas(
    canvas: &CanvasState,
    snapshot: &Snapshot,
) -> PainterResult<Option<KeyframeReport>> {
    let Some(version) = snapshot.version else {
        return Ok(None);
    };
    let image = snapshot.decode()?;
    let report = canvas.apply_keyframe(version, &image)?;
    info!(version, unknown = report.classify.unknown, "Applied keyframe");
    Ok(Some(report))
}

async fn drive(
    remote: Arc<dyn RemoteCanvas>,
    canvas: Arc<CanvasState>,
    realtime: Arc<RealtimeSync>,
    retry_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let fetched = tokio::select! {
            result = remote.fetch_snapshot() => result,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };
        let applied = match fetched.and_then(|snapshot| refresh_canvas(&canvas, &snapshot)) {
            Ok(Some(_)) => true,
            Ok(None) => {
                warn!("Snapshot arrived without a version; retrying");
                false
            }
            Err(e) => {
                warn!(error = %e, "Snapshot refresh failed; retrying");
                false
            }
        };
        if !applied {
            tokio::select! {
                () = tokio::time::sleep(retry_delay) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
            continue;
        }

        match realtime.run().await {
            SyncExit::Shutdown => break,
            SyncExit::Resync(reason) => info!(reason = ?reason, "Resyncing from snapshot"),
        }
    }
    info!("Driver loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::CanvasDims;
    use crate::color::Color;
    use crate::error::PainterError;
    use crate::pattern::{PaletteGrid, PatternSource};
    use crate::scheduler::ManualClock;
    use crate::testing::{png_bytes, solid_image, FakeRemote};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_refresh_canvas_requires_version() {
        let canvas = CanvasState::new(CanvasDims::new(4, 4));
        let snapshot = Snapshot {
            bytes: png_bytes(&solid_image(4, 4, Color::White)),
            version: None,
        };
        assert_eq!(refresh_canvas(&canvas, &snapshot).unwrap(), None);
        assert_eq!(canvas.version(), 0);
        assert_eq!(canvas.at(0, 0), Color::Unknown);

        let snapshot = Snapshot {
            version: Some(17),
            ..snapshot
        };
        let report = refresh_canvas(&canvas, &snapshot).unwrap().unwrap();
        assert_eq!(report.version, 17);
        assert_eq!(canvas.at(3, 3), Color::White);
    }

    #[test]
    fn test_refresh_canvas_size_mismatch() {
        let canvas = CanvasState::new(CanvasDims::new(4, 4));
        let snapshot = Snapshot {
            bytes: png_bytes(&solid_image(5, 4, Color::White)),
            version: Some(1),
        };
        assert!(matches!(
            refresh_canvas(&canvas, &snapshot),
            Err(PainterError::Format(_))
        ));
        assert_eq!(canvas.version(), 0);
    }

    fn quiet_config() -> PainterConfig {
        let mut config = PainterConfig::default();
        config.canvas = CanvasDims::new(4, 4);
        // Nothing listens on the discard port
        config.realtime.url = "ws://127.0.0.1:9/ws".to_string();
        config.realtime.reconnect_delay = Duration::from_millis(20);
        config.snapshot_retry_delay = Duration::from_millis(20);
        config
    }

    #[tokio::test]
    async fn test_unversioned_snapshot_is_retried() {
        let remote = FakeRemote::new();
        remote.serve(&solid_image(4, 4, Color::White), None);
        let canvas = Arc::new(CanvasState::new(CanvasDims::new(4, 4)));

        let handle = Engine::new(quiet_config(), remote.clone(), Reconciler::default())
            .start(Arc::clone(&canvas));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(remote.snapshot_fetches.load(Ordering::SeqCst) >= 2);
        assert_eq!(canvas.version(), 0);

        let stats = handle.stop().await;
        assert_eq!(stats.canvas_version, 0);
        assert_eq!(stats.paint.issued, 0);
    }

    #[tokio::test]
    async fn test_stop_while_realtime_unreachable() {
        let remote = FakeRemote::new();
        remote.serve(&solid_image(4, 4, Color::White), Some(3));
        let canvas = Arc::new(CanvasState::new(CanvasDims::new(4, 4)));

        let handle = Engine::new(quiet_config(), remote.clone(), Reconciler::default())
            .start(Arc::clone(&canvas));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.canvas().version(), 3);

        let stopped = tokio::time::timeout(Duration::from_secs(5), handle.stop()).await;
        let stats = stopped.expect("stop should not hang");
        assert_eq!(stats.realtime.connects, 0);
    }

    #[tokio::test]
    async fn test_engine_budget_follows_injected_clock() {
        let remote = FakeRemote::new();
        remote.serve(&solid_image(4, 4, Color::White), Some(3));
        let canvas = Arc::new(CanvasState::new(CanvasDims::new(4, 4)));
        let grid = PaletteGrid::from_cells(4, 4, vec![Color::Black; 16]).unwrap();
        let source = PatternSource::new("black", 0, 0, grid, CanvasDims::new(4, 4)).unwrap();

        let mut config = quiet_config();
        config.scheduler.budget_per_window = 10;
        let clock = Arc::new(ManualClock::new());
        let handle = Engine::new(config, remote.clone(), Reconciler::new(vec![source]))
            .with_clock(clock.clone())
            .start(Arc::clone(&canvas));
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Writes over white cost 2; a fourth would leave no room for a
        // worst-case write of 5
        assert_eq!(remote.written().len(), 3);
        assert_eq!(handle.stats().scheduler.outstanding_cost, 6);

        // Only the injected clock ages the ledger
        clock.advance(Duration::from_secs(10));
        assert_eq!(handle.stats().scheduler.outstanding_cost, 0);

        let stats = handle.stop().await;
        assert_eq!(stats.paint.committed, 3);
    }
}
