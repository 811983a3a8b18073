//! External view of a scheduled job.

use std::any::Any;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::error::{Result, SchedulerError};
use crate::job::{JobData, JobRegistration};
use crate::scheduler::SchedulerCore;
use crate::trigger::Trigger;

/// Handle onto one scheduled job: state reads, pause/resume, and live
/// trigger mutation. Cheap to clone. The handle stays usable after the job
/// is unscheduled; operations on the disposed job then fail or no-op.
#[derive(Clone)]
pub struct JobInfo {
    job: Arc<JobRegistration>,
    core: Arc<SchedulerCore>,
}

impl JobInfo {
    pub(crate) fn new(job: Arc<JobRegistration>, core: Arc<SchedulerCore>) -> Self {
        Self { job, core }
    }

    /// The data the job was registered with (also its identity).
    pub fn data(&self) -> &JobData {
        &self.job.data
    }

    /// The data downcast to its concrete type.
    pub fn data_downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.job.data).downcast().ok()
    }

    pub fn is_paused(&self) -> bool {
        self.job.paused.load(Ordering::Acquire)
    }

    /// Whether the job's callback is executing right now.
    pub fn is_running(&self) -> bool {
        self.job.running.load(Ordering::Acquire)
    }

    /// When the callback last actually ran; `None` before the first fire.
    pub fn last_fire_time(&self) -> Option<DateTime<FixedOffset>> {
        *self.job.actual_fire_time.lock()
    }

    /// The next occurrence the timer is armed for; `None` when nothing is
    /// pending.
    pub fn next_fire_time(&self) -> Option<DateTime<FixedOffset>> {
        *self.job.scheduled_fire_time.lock()
    }

    /// Suppress firing without unscheduling. The pending timer is disarmed;
    /// nothing fires until [`resume`](Self::resume).
    pub fn pause(&self) -> Result<()> {
        if self.job.is_disposed() {
            return Err(SchedulerError::Disposed);
        }
        self.job.paused.store(true, Ordering::Release);
        self.job.disarm();
        debug!(job_id = self.job.id, "job paused");
        Ok(())
    }

    /// Clear the paused flag and recompute the next occurrence. Missed
    /// occurrences are not replayed.
    pub fn resume(&self) {
        self.job.paused.store(false, Ordering::Release);
        debug!(job_id = self.job.id, "job resumed");
        SchedulerCore::refresh_job(&self.core, &self.job);
    }

    /// Snapshot of the job's triggers, safe against concurrent mutation.
    pub fn triggers(&self) -> Vec<Arc<dyn Trigger>> {
        self.job.triggers.lock().clone()
    }

    /// Add a trigger and recompute the next occurrence.
    pub fn add_trigger(&self, trigger: Arc<dyn Trigger>) {
        self.job.triggers.lock().push(trigger);
        SchedulerCore::refresh_job(&self.core, &self.job);
    }

    /// Remove a trigger by `Arc` identity. Returns whether it was present.
    pub fn remove_trigger(&self, trigger: &Arc<dyn Trigger>) -> bool {
        let removed = {
            let mut triggers = self.job.triggers.lock();
            let before = triggers.len();
            triggers.retain(|t| !Arc::ptr_eq(t, trigger));
            before != triggers.len()
        };
        if removed {
            SchedulerCore::refresh_job(&self.core, &self.job);
        }
        removed
    }

    /// Drop every trigger. The job stays registered.
    pub fn clear_triggers(&self) {
        self.job.triggers.lock().clear();
        SchedulerCore::refresh_job(&self.core, &self.job);
    }
}

impl fmt::Debug for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobInfo")
            .field("job_id", &self.job.id)
            .field("paused", &self.is_paused())
            .field("running", &self.is_running())
            .field("next_fire_time", &self.next_fire_time())
            .finish()
    }
}
