//! The scheduling engine: job registry, lifecycle, timer fan-out.
//!
//! Each registered job owns a single-shot timer. While the scheduler runs,
//! a refresh computes the earliest upcoming occurrence across the job's
//! triggers and arms the timer for it; when the timer elapses the callback
//! is dispatched on a detached task and the job is refreshed again on
//! completion. Callback errors are broadcast to subscribers and never stop
//! the job.

use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::{BoxError, Result, SchedulerError};
use crate::job::{AsyncCallback, ExecutionContext, JobCallback, JobData, JobRegistration};
use crate::job_info::JobInfo;
use crate::trigger::Trigger;

/// Registry key: the pointer identity of the job's data `Arc`. Clones of
/// the same `Arc` are the same job; a fresh allocation with equal contents
/// is a different one.
#[derive(Clone)]
pub(crate) struct JobKey(JobData);

impl JobKey {
    fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for JobKey {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for JobKey {}

impl Hash for JobKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

/// A user-callback failure, surfaced to error subscribers.
#[derive(Clone)]
pub struct JobError {
    context: ExecutionContext,
    error: Arc<dyn StdError + Send + Sync>,
}

impl JobError {
    /// The execution context of the firing that failed.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The error the callback returned.
    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }
}

impl fmt::Debug for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobError")
            .field("context", &self.context)
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job callback failed: {}", self.error)
    }
}

pub(crate) struct SchedulerCore {
    jobs: Mutex<HashMap<JobKey, Arc<JobRegistration>>>,
    running: AtomicBool,
    disposed: AtomicBool,
    clock: Clock,
    runtime: Handle,
    error_tx: broadcast::Sender<JobError>,
}

impl SchedulerCore {
    /// Recompute a job's next occurrence and re-arm its timer. No-op while
    /// the scheduler is not running. Triggers with nothing left to yield
    /// are dropped from the job.
    pub(crate) fn refresh_job(core: &Arc<Self>, job: &Arc<JobRegistration>) {
        if !core.running.load(Ordering::Acquire) {
            return;
        }
        let now = core.clock.now();
        let snapshot: Vec<Arc<dyn Trigger>> = job.triggers.lock().clone();

        let mut next: Option<DateTime<FixedOffset>> = None;
        let mut spent: Vec<Arc<dyn Trigger>> = Vec::new();
        for trigger in &snapshot {
            match trigger.next_fire(now) {
                Some(at) => next = Some(next.map_or(at, |n| n.min(at))),
                None => spent.push(Arc::clone(trigger)),
            }
        }
        if !spent.is_empty() {
            let mut triggers = job.triggers.lock();
            triggers.retain(|t| !spent.iter().any(|s| Arc::ptr_eq(t, s)));
            debug!(job_id = job.id, removed = spent.len(), "dropped spent triggers");
        }

        *job.scheduled_fire_time.lock() = next;
        let Some(next_at) = next else {
            debug!(job_id = job.id, "no pending occurrence");
            return;
        };

        let due = (next_at - now).to_std().unwrap_or_default();
        debug!(job_id = job.id, due_ms = due.as_millis() as u64, "arming timer");
        let runtime = core.runtime.clone();
        let core = Arc::clone(core);
        let job_for_tick = Arc::clone(job);
        job.arm(&runtime, move |generation| async move {
            tokio::time::sleep(due).await;
            SchedulerCore::on_tick(&core, &job_for_tick, generation);
        });
    }

    /// Timer callback: dispatch the job unless the scheduler stopped or the
    /// job is paused in the meantime.
    fn on_tick(core: &Arc<Self>, job: &Arc<JobRegistration>, generation: u64) {
        if !job.begin_fire(generation) {
            return;
        }
        if !core.running.load(Ordering::Acquire) {
            return;
        }
        if job.paused.load(Ordering::Acquire) {
            debug!(job_id = job.id, "tick while paused; waiting for resume");
            return;
        }

        let now = core.clock.now();
        *job.actual_fire_time.lock() = Some(now);
        job.running.store(true, Ordering::Release);
        let context =
            ExecutionContext::new(job.data.clone(), *job.scheduled_fire_time.lock(), Some(now));

        let runtime = core.runtime.clone();
        let core = Arc::clone(core);
        let job = Arc::clone(job);
        let callback = job.callback.clone();
        runtime.spawn(async move {
            let outcome = match &callback {
                JobCallback::Sync(f) => f(context.clone()),
                JobCallback::Async(f) => f(context.clone()).await,
            };
            if let Err(err) = outcome {
                core.on_job_error(&job, context, err);
            }
            SchedulerCore::on_job_complete(&core, &job);
        });
    }

    fn on_job_error(&self, job: &Arc<JobRegistration>, context: ExecutionContext, err: BoxError) {
        job.running.store(false, Ordering::Release);
        error!(job_id = job.id, error = %err, "job callback failed");
        let _ = self.error_tx.send(JobError {
            context,
            error: Arc::from(err),
        });
    }

    fn on_job_complete(core: &Arc<Self>, job: &Arc<JobRegistration>) {
        job.running.store(false, Ordering::Release);
        if core.running.load(Ordering::Acquire) {
            SchedulerCore::refresh_job(core, job);
        }
    }
}

/// In-process job scheduler.
///
/// Jobs are registered with caller-owned data, a sync or async callback,
/// and one or more triggers. **The data `Arc` is the job's identity**: pass
/// a clone of the same `Arc` to address the job later; a second allocation
/// of equal contents names a different job. (Deriving keys from the data's
/// contents is left as a future extension.)
///
/// Cloning the scheduler hands out another handle onto the same engine.
#[derive(Clone)]
pub struct Scheduler {
    core: Arc<SchedulerCore>,
}

impl Scheduler {
    /// Scheduler on the system clock.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_clock(Clock::system())
    }

    /// Scheduler reading time from `clock`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_clock(clock: Clock) -> Self {
        let (error_tx, _) = broadcast::channel(64);
        Self {
            core: Arc::new(SchedulerCore {
                jobs: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                clock,
                runtime: Handle::current(),
                error_tx,
            }),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.core.disposed.load(Ordering::Acquire) {
            return Err(SchedulerError::Disposed);
        }
        Ok(())
    }

    fn snapshot_jobs(&self) -> Vec<Arc<JobRegistration>> {
        self.core.jobs.lock().values().cloned().collect()
    }

    /// Whether `start` has been called without a later `stop`/`shutdown`.
    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    /// Begin firing: arms every job's timer. Idempotent.
    pub fn start(&self) -> Result<()> {
        self.ensure_live()?;
        self.core.running.store(true, Ordering::Release);
        for job in self.snapshot_jobs() {
            SchedulerCore::refresh_job(&self.core, &job);
        }
        info!("scheduler started");
        Ok(())
    }

    /// Disarm every timer but keep all jobs registered. Does not wait for
    /// in-flight callbacks. Idempotent.
    pub fn stop(&self) -> Result<()> {
        self.ensure_live()?;
        self.core.running.store(false, Ordering::Release);
        for job in self.snapshot_jobs() {
            job.disarm();
        }
        info!("scheduler stopped");
        Ok(())
    }

    /// Stop, dispose every job's timer, and clear the registry. In-flight
    /// callbacks run to completion but are not re-armed. After this, every
    /// other operation fails with [`SchedulerError::Disposed`].
    pub fn shutdown(&self) -> Result<()> {
        if self.core.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.core.running.store(false, Ordering::Release);
        let drained: Vec<Arc<JobRegistration>> = {
            let mut jobs = self.core.jobs.lock();
            jobs.drain().map(|(_, job)| job).collect()
        };
        for job in &drained {
            job.dispose();
        }
        info!(jobs = drained.len(), "scheduler shut down");
        Ok(())
    }

    /// Register a job with a synchronous callback. Runs on the timer
    /// dispatch worker; keep it short or use [`schedule_async_job`].
    ///
    /// [`schedule_async_job`]: Self::schedule_async_job
    pub fn schedule_job<T, F>(
        &self,
        data: Arc<T>,
        callback: F,
        triggers: Vec<Arc<dyn Trigger>>,
    ) -> Result<JobInfo>
    where
        T: Any + Send + Sync,
        F: Fn(ExecutionContext) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.insert_job(data, JobCallback::Sync(Arc::new(callback)), triggers)
    }

    /// Register a job with an async callback. The job is re-armed only
    /// after the returned future resolves.
    pub fn schedule_async_job<T, F, Fut>(
        &self,
        data: Arc<T>,
        callback: F,
        triggers: Vec<Arc<dyn Trigger>>,
    ) -> Result<JobInfo>
    where
        T: Any + Send + Sync,
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        let wrapped: AsyncCallback = Arc::new(
            move |context| -> Pin<Box<dyn Future<Output = std::result::Result<(), BoxError>> + Send>> {
                Box::pin(callback(context))
            },
        );
        self.insert_job(data, JobCallback::Async(wrapped), triggers)
    }

    fn insert_job(
        &self,
        data: JobData,
        callback: JobCallback,
        triggers: Vec<Arc<dyn Trigger>>,
    ) -> Result<JobInfo> {
        self.ensure_live()?;
        if triggers.is_empty() {
            return Err(SchedulerError::NoTriggers);
        }
        let key = JobKey(Arc::clone(&data));
        let job = Arc::new(JobRegistration::new(data, callback, triggers));
        {
            let mut jobs = self.core.jobs.lock();
            if jobs.contains_key(&key) {
                return Err(SchedulerError::DuplicateJob);
            }
            jobs.insert(key, Arc::clone(&job));
        }
        info!(job_id = job.id, "job scheduled");
        SchedulerCore::refresh_job(&self.core, &job);
        Ok(JobInfo::new(job, Arc::clone(&self.core)))
    }

    /// Remove a job and dispose its timer.
    pub fn unschedule_job<T: Any + Send + Sync>(&self, data: &Arc<T>) -> Result<()> {
        self.ensure_live()?;
        let job = self
            .core
            .jobs
            .lock()
            .remove(&JobKey(Arc::clone(data) as JobData))
            .ok_or(SchedulerError::JobNotFound)?;
        job.dispose();
        info!(job_id = job.id, "job unscheduled");
        Ok(())
    }

    /// Look up the job registered under `data`.
    pub fn job_info<T: Any + Send + Sync>(&self, data: &Arc<T>) -> Result<JobInfo> {
        self.ensure_live()?;
        self.core
            .jobs
            .lock()
            .get(&JobKey(Arc::clone(data) as JobData))
            .map(|job| JobInfo::new(Arc::clone(job), Arc::clone(&self.core)))
            .ok_or(SchedulerError::JobNotFound)
    }

    /// Snapshot of every registered job.
    pub fn jobs(&self) -> Result<Vec<JobInfo>> {
        self.ensure_live()?;
        Ok(self
            .snapshot_jobs()
            .into_iter()
            .map(|job| JobInfo::new(job, Arc::clone(&self.core)))
            .collect())
    }

    /// Jobs whose data is of type `T`.
    pub fn jobs_with_data<T: Any>(&self) -> Result<Vec<JobInfo>> {
        self.ensure_live()?;
        Ok(self
            .snapshot_jobs()
            .into_iter()
            .filter(|job| job.data.is::<T>())
            .map(|job| JobInfo::new(job, Arc::clone(&self.core)))
            .collect())
    }

    /// Jobs whose callback is executing right now.
    pub fn running_jobs(&self) -> Result<Vec<JobInfo>> {
        self.ensure_live()?;
        Ok(self
            .snapshot_jobs()
            .into_iter()
            .filter(|job| job.running.load(Ordering::Acquire))
            .map(|job| JobInfo::new(job, Arc::clone(&self.core)))
            .collect())
    }

    /// Subscribe to callback failures. Every subscriber receives each
    /// [`JobError`]; errors never stop the job itself.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<JobError> {
        self.core.error_tx.subscribe()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
