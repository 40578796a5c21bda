//! Cost-window admission control for pixel writes
//!
//! Every write reserves its cost in a shared ledger before it is issued. The
//! reservation then either commits (the write reached the remote and counts
//! against the budget until it ages out of the window) or is cancelled (the
//! write was rejected for a reason that did not consume server budget).
//!
//! ```text
//!             allocate(cost)
//!                   │
//!                   ▼
//!               Pending ──cancel()──► removed immediately
//!                   │
//!               commit()
//!                   │
//!                   ▼
//!              Committed ──(now - stamp >= window)──► purged
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::clock::{Clock, SystemClock};
use crate::color::Color;

// =============================================================================
// Configuration
// =============================================================================

/// Budget and cost settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Total cost allowed inside one window
    pub budget_per_window: u32,

    /// Length of the sliding window
    pub window: Duration,

    /// Cost of painting over a white pixel
    pub paint_over_white_cost: u32,

    /// Cost of painting over any other color
    pub paint_over_other_cost: u32,

    /// Fallback re-check interval when only pending records hold the budget
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            budget_per_window: 30,
            window: Duration::from_secs(10),
            paint_over_white_cost: 2,
            paint_over_other_cost: 5,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the budget per window
    #[must_use]
    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget_per_window = budget;
        self
    }

    /// Set the window length
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set both write costs
    #[must_use]
    pub fn with_costs(mut self, over_white: u32, over_other: u32) -> Self {
        self.paint_over_white_cost = over_white;
        self.paint_over_other_cost = over_other;
        self
    }

    /// Set the fallback poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Cost of overwriting a pixel that currently holds `previous`
    #[must_use]
    pub fn cost_for(&self, previous: Color) -> u32 {
        if previous == Color::White {
            self.paint_over_white_cost
        } else {
            self.paint_over_other_cost
        }
    }

    /// Most expensive single write
    #[must_use]
    pub fn worst_case_cost(&self) -> u32 {
        self.paint_over_white_cost.max(self.paint_over_other_cost)
    }

    /// Cheapest single write
    #[must_use]
    pub fn cheapest_cost(&self) -> u32 {
        self.paint_over_white_cost.min(self.paint_over_other_cost)
    }
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Clone, Copy, Debug)]
struct DrawCall {
    cost: u32,
    committed_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: u64,
    calls: HashMap<u64, DrawCall>,
}

impl Ledger {
    fn purge(&mut self, now: Instant, window: Duration) {
        self.calls.retain(|_, call| match call.committed_at {
            Some(stamp) => now.saturating_duration_since(stamp) < window,
            None => true,
        });
    }

    fn outstanding(&self) -> u32 {
        self.calls.values().map(|c| c.cost).sum()
    }
}

/// Point-in-time view of the ledger
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerMetrics {
    /// Budget per window
    pub budget: u32,
    /// Cost currently counted against the window
    pub outstanding_cost: u32,
    /// Reservations not yet committed or cancelled
    pub pending: usize,
    /// Committed reservations still inside the window
    pub committed: usize,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Sliding-window cost limiter
///
/// Cheap to clone; clones share the same ledger.
#[derive(Clone, Debug)]
pub struct AdmissionScheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    ledger: Arc<Mutex<Ledger>>,
}

impl AdmissionScheduler {
    /// Create a scheduler on the system clock
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a scheduler on an injected clock
    #[must_use]
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Reserve `cost` for a write about to be issued
    ///
    /// Always succeeds; admission is decided by
    /// [`Self::time_until_next_slot`], not here.
    pub fn allocate(&self, cost: u32) -> DrawCallHandle {
        let id = {
            let mut ledger = self.ledger.lock();
            let id = ledger.next_id;
            ledger.next_id += 1;
            ledger.calls.insert(
                id,
                DrawCall {
                    cost,
                    committed_at: None,
                },
            );
            id
        };
        DrawCallHandle {
            id,
            cost,
            ledger: Arc::clone(&self.ledger),
            clock: Arc::clone(&self.clock),
            resolved: false,
        }
    }

    /// How long until the next write may be issued
    ///
    /// Zero means a worst-case write fits the budget now. Otherwise this is
    /// the earliest moment enough committed records age out for the
    /// cheapest write to fit; the caller re-asks then, since the ledger may
    /// have changed in between.
    #[must_use]
    pub fn time_until_next_slot(&self) -> Duration {
        self.wait_until_free(self.config.worst_case_cost(), self.config.cheapest_cost())
    }

    /// How long to wait before a write of `cost` fits the budget
    ///
    /// Walks committed records in expiry order and returns the first moment
    /// enough of them have aged out. When only pending records stand in the
    /// way there is no known expiry, so the poll interval is returned and the
    /// caller re-asks.
    #[must_use]
    pub fn time_until_slot_for(&self, cost: u32) -> Duration {
        self.wait_until_free(cost, cost)
    }

    /// Zero if `admit` fits now, else the wait until `target` fits
    fn wait_until_free(&self, admit: u32, target: u32) -> Duration {
        let now = self.clock.now();
        let window = self.config.window;

        let mut ledger = self.ledger.lock();
        ledger.purge(now, window);

        let outstanding = ledger.outstanding();
        let available = self.config.budget_per_window.saturating_sub(outstanding);
        if available >= admit {
            return Duration::ZERO;
        }
        // Room for `target` already: wait for the next expiry of any size
        let needed = target.saturating_sub(available).max(1);

        let mut expiries: Vec<(Duration, u32)> = ledger
            .calls
            .values()
            .filter_map(|call| {
                let stamp = call.committed_at?;
                let age = now.saturating_duration_since(stamp);
                Some((window.saturating_sub(age), call.cost))
            })
            .collect();
        drop(ledger);

        expiries.sort_by_key(|(remaining, _)| *remaining);

        let mut freed = 0u32;
        for (remaining, cost) in expiries {
            freed += cost;
            if freed >= needed {
                return remaining;
            }
        }
        self.config.poll_interval
    }

    /// Cost currently counted against the window
    #[must_use]
    pub fn outstanding_cost(&self) -> u32 {
        let now = self.clock.now();
        let mut ledger = self.ledger.lock();
        ledger.purge(now, self.config.window);
        ledger.outstanding()
    }

    /// Snapshot of ledger state
    #[must_use]
    pub fn metrics(&self) -> SchedulerMetrics {
        let now = self.clock.now();
        let mut ledger = self.ledger.lock();
        ledger.purge(now, self.config.window);
        let committed = ledger
            .calls
            .values()
            .filter(|c| c.committed_at.is_some())
            .count();
        SchedulerMetrics {
            budget: self.config.budget_per_window,
            outstanding_cost: ledger.outstanding(),
            pending: ledger.calls.len() - committed,
            committed,
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Owned reservation for one write
///
/// Consumed by [`Self::commit`] or [`Self::cancel`]. A handle dropped while
/// still pending is committed, so a lost task can only over-count the budget.
#[derive(Debug)]
pub struct DrawCallHandle {
    id: u64,
    cost: u32,
    ledger: Arc<Mutex<Ledger>>,
    clock: Arc<dyn Clock>,
    resolved: bool,
}

impl DrawCallHandle {
    /// Reserved cost
    #[must_use]
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Stamp the reservation; it now ages out after one window
    pub fn commit(mut self) {
        self.stamp();
    }

    /// Drop the reservation from accounting immediately
    pub fn cancel(mut self) {
        self.ledger.lock().calls.remove(&self.id);
        self.resolved = true;
    }

    fn stamp(&mut self) {
        let now = self.clock.now();
        if let Some(call) = self.ledger.lock().calls.get_mut(&self.id) {
            call.committed_at = Some(now);
        }
        self.resolved = true;
    }
}

impl Drop for DrawCallHandle {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!(cost = self.cost, "Draw call dropped while pending; committing");
            self.stamp();
        }
    }
}
