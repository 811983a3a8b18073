//! belltower — an in-process job scheduler with six-field cron triggers.
//!
//! Jobs are registered with caller-owned data (which doubles as the job's
//! identity), a sync or async callback, and one or more triggers. Each job
//! owns a single-shot timer: the scheduler arms it for the earliest
//! upcoming occurrence across the job's triggers, dispatches the callback
//! when it elapses, and re-arms after completion. Jobs can be paused and
//! resumed, and their trigger lists mutated, while the scheduler runs.
//!
//! Split into modules:
//! - [`clock`] — injectable time source
//! - [`trigger`] — the [`Trigger`] trait, `now`/`manual` triggers, and
//!   [`CronTrigger`] with ordinal (`F`/`L`) and week-parity (`O`/`E`)
//!   day-of-week qualifiers
//! - [`job`] — per-job state and the [`ExecutionContext`] handed to
//!   callbacks
//! - [`scheduler`] — the engine: registry, lifecycle, timer fan-out
//! - [`job_info`] — per-job handle for state reads, pause/resume, and live
//!   trigger mutation
//!
//! Day-of-week numbering is Sunday = 1 through Saturday = 7 everywhere
//! (not ISO).
//!
//! ```no_run
//! use std::sync::Arc;
//! use belltower::{trigger, Scheduler};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new();
//! let key = Arc::new("nightly-report".to_string());
//! scheduler.schedule_job(
//!     Arc::clone(&key),
//!     |context| {
//!         println!("fired at {:?}", context.actual_fire_time());
//!         Ok(())
//!     },
//!     vec![trigger::create("0 0 2 * * ?")?],
//! )?;
//! scheduler.start()?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod error;
pub mod job;
pub mod job_info;
pub mod scheduler;
pub mod trigger;

pub use clock::Clock;
pub use error::{BoxError, ParseError, Result, SchedulerError};
pub use job::{ExecutionContext, JobData};
pub use job_info::JobInfo;
pub use scheduler::{JobError, Scheduler};
pub use trigger::{CronTrigger, ManualTrigger, NowTrigger, Trigger};
