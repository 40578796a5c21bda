//! Dispatch loop
//!
//! Repeatedly asks the scheduler whether a write may be issued, asks the
//! reconciler for the next correction, and issues the write in a background
//! task. Each write task settles its reservation, waits out the settle delay
//! and only then releases the coordinate from the in-flight set.
//!
//! ```text
//! wait for canvas (version > 0)
//! loop:
//!     wait until the scheduler has room for a worst-case write
//!     lock in-flight, find correction, claim it
//!     allocate cost, spawn write ──► commit | cancel ──► settle ──► release
//!     nothing to do? sleep idle interval
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::canvas::CanvasState;
use crate::reconcile::{InFlightSet, Pixel, Reconciler};
use crate::remote::RemoteCanvas;
use crate::scheduler::{AdmissionScheduler, DrawCallHandle};

/// Dispatch loop timing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PainterSettings {
    /// Time a coordinate stays in flight after its write resolves
    pub settle_delay: Duration,

    /// Sleep when nothing needs correcting
    pub idle_interval: Duration,

    /// Poll interval while waiting for the first snapshot
    pub warmup_poll: Duration,
}

impl Default for PainterSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            idle_interval: Duration::from_secs(1),
            warmup_poll: Duration::from_millis(100),
        }
    }
}

/// Write outcome counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaintStats {
    /// Writes issued
    pub issued: u64,
    /// Writes accepted by the remote
    pub committed: u64,
    /// Writes rejected for budget reasons
    pub rate_limited: u64,
    /// Writes rejected for any other reason
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct PaintCounters {
    issued: AtomicU64,
    committed: AtomicU64,
    rate_limited: AtomicU64,
    rejected: AtomicU64,
}

/// Issues corrective writes under the admission budget
pub struct Painter {
    settings: PainterSettings,
    canvas: Arc<CanvasState>,
    reconciler: Arc<Reconciler>,
    scheduler: AdmissionScheduler,
    remote: Arc<dyn RemoteCanvas>,
    in_flight: Arc<InFlightSet>,
    counters: Arc<PaintCounters>,
}

impl Painter {
    /// Create a painter
    #[must_use]
    pub fn new(
        settings: PainterSettings,
        canvas: Arc<CanvasState>,
        reconciler: Arc<Reconciler>,
        scheduler: AdmissionScheduler,
        remote: Arc<dyn RemoteCanvas>,
    ) -> Self {
        Self {
            settings,
            canvas,
            reconciler,
            scheduler,
            remote,
            in_flight: Arc::new(InFlightSet::new()),
            counters: Arc::new(PaintCounters::default()),
        }
    }

    /// Write outcome counters
    #[must_use]
    pub fn stats(&self) -> PaintStats {
        PaintStats {
            issued: self.counters.issued.load(Ordering::Relaxed),
            committed: self.counters.committed.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Coordinates with unsettled writes
    #[must_use]
    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Scheduler shared with the write tasks
    #[must_use]
    pub fn scheduler(&self) -> &AdmissionScheduler {
        &self.scheduler
    }

    /// Run until `shutdown` flips to true
    ///
    /// Write tasks still running on exit are detached and finish their
    /// settle delay on their own.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        while self.canvas.version() == 0 {
            tokio::select! {
                () = tokio::time::sleep(self.settings.warmup_poll) => {}
                _ = shutdown.wait_for(|stop| *stop) => return,
            }
        }
        info!(version = self.canvas.version(), "Canvas ready, starting dispatch");

        let mut writes = JoinSet::new();
        loop {
            if *shutdown.borrow() {
                break;
            }
            while let Some(joined) = writes.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "Write task failed");
                }
            }

            let wait = self.scheduler.time_until_next_slot();
            let pause = if wait.is_zero() {
                match self.dispatch_one() {
                    Some(task) => {
                        writes.spawn(task);
                        continue;
                    }
                    None => self.settings.idle_interval,
                }
            } else {
                debug!(wait_ms = wait.as_millis() as u64, "Waiting for budget");
                wait
            };

            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }

        if !writes.is_empty() {
            info!(outstanding = writes.len(), "Leaving outstanding writes to settle");
        }
        writes.detach_all();
        info!(stats = ?self.stats(), "Dispatch loop stopped");
    }

    /// Claim the next correction and build its write task
    ///
    /// The coordinate is in the in-flight set before this returns, so the
    /// next scan cannot pick it again.
    fn dispatch_one(&self) -> Option<impl Future<Output = ()> + Send + 'static> {
        let pixel = {
            let mut guard = self.in_flight.lock();
            let pixel = self.reconciler.next_correction(&self.canvas, &guard)?;
            guard.claim(&pixel);
            pixel
        };

        let previous = self.canvas.at(pixel.x, pixel.y);
        let handle = self
            .scheduler
            .allocate(self.scheduler.config().cost_for(previous));
        self.counters.issued.fetch_add(1, Ordering::Relaxed);
        info!(%pixel, previous = %previous, cost = handle.cost(), "Painting");

        let task = WriteTask {
            pixel,
            handle,
            remote: Arc::clone(&self.remote),
            in_flight: Arc::clone(&self.in_flight),
            counters: Arc::clone(&self.counters),
            settle_delay: self.settings.settle_delay,
        };
        Some(task.run())
    }
}

struct WriteTask {
    pixel: Pixel,
    handle: DrawCallHandle,
    remote: Arc<dyn RemoteCanvas>,
    in_flight: Arc<InFlightSet>,
    counters: Arc<PaintCounters>,
    settle_delay: Duration,
}

impl WriteTask {
    async fn run(self) {
        let Self {
            pixel,
            handle,
            remote,
            in_flight,
            counters,
            settle_delay,
        } = self;

        match remote.write_pixel(pixel).await {
            Ok(()) => {
                handle.commit();
                counters.committed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.retains_cost() => {
                handle.commit();
                counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                warn!(%pixel, error = %e, "Write rate limited");
            }
            Err(e) => {
                handle.cancel();
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%pixel, error = %e, "Write rejected");
            }
        }

        tokio::time::sleep(settle_delay).await;
        in_flight.release(pixel.x, pixel.y);
    }
}
