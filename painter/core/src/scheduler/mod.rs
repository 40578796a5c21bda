//! Write admission: when may the next pixel be painted
//!
//! The remote service charges each write against a budget that refills over
//! a sliding window. [`AdmissionScheduler`] mirrors that budget locally so the
//! painter paces itself instead of relying on rejections.
//!
//! # Usage
//!
//! ```
//! use painter_core::scheduler::{AdmissionScheduler, SchedulerConfig};
//! use std::time::Duration;
//!
//! let scheduler = AdmissionScheduler::new(SchedulerConfig::default());
//! assert_eq!(scheduler.time_until_next_slot(), Duration::ZERO);
//!
//! let handle = scheduler.allocate(5);
//! // ... issue the write ...
//! handle.commit();
//! assert_eq!(scheduler.outstanding_cost(), 5);
//! ```

mod admission;
mod clock;

pub use admission::{AdmissionScheduler, DrawCallHandle, SchedulerConfig, SchedulerMetrics};
pub use clock::{Clock, ManualClock, SystemClock};
