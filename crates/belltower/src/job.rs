//! Per-job registration state: callback, triggers, and the single-shot
//! timer backing each job.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::BoxError;
use crate::trigger::Trigger;

/// Caller-owned job payload; doubles as the job's identity key (by pointer
/// identity of the `Arc` allocation).
pub type JobData = Arc<dyn Any + Send + Sync>;

pub(crate) type SyncCallback =
    Arc<dyn Fn(ExecutionContext) -> Result<(), BoxError> + Send + Sync>;
pub(crate) type AsyncCallback = Arc<
    dyn Fn(ExecutionContext) -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>
        + Send
        + Sync,
>;

/// The two callback shapes a job can carry.
#[derive(Clone)]
pub(crate) enum JobCallback {
    Sync(SyncCallback),
    Async(AsyncCallback),
}

/// Snapshot handed to a callback for one firing. Timestamps are set by the
/// scheduler; the callback only reads.
#[derive(Clone)]
pub struct ExecutionContext {
    data: JobData,
    scheduled_fire_time: Option<DateTime<FixedOffset>>,
    actual_fire_time: Option<DateTime<FixedOffset>>,
}

impl ExecutionContext {
    pub(crate) fn new(
        data: JobData,
        scheduled_fire_time: Option<DateTime<FixedOffset>>,
        actual_fire_time: Option<DateTime<FixedOffset>>,
    ) -> Self {
        Self {
            data,
            scheduled_fire_time,
            actual_fire_time,
        }
    }

    /// The job's data as it was registered.
    pub fn data(&self) -> &JobData {
        &self.data
    }

    /// The data downcast to its concrete type.
    pub fn data_downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast().ok()
    }

    /// The instant the timer was armed to fire at.
    pub fn scheduled_fire_time(&self) -> Option<DateTime<FixedOffset>> {
        self.scheduled_fire_time
    }

    /// The instant the callback was actually dispatched.
    pub fn actual_fire_time(&self) -> Option<DateTime<FixedOffset>> {
        self.actual_fire_time
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("scheduled_fire_time", &self.scheduled_fire_time)
            .field("actual_fire_time", &self.actual_fire_time)
            .finish_non_exhaustive()
    }
}

enum TimerState {
    Disarmed,
    Armed(JoinHandle<()>),
    Disposed,
}

/// Timer slot plus a generation counter. The generation lets an elapsed
/// sleep task prove it is still the armed one before it fires; a stale task
/// (superseded by re-arm, disarm, or dispose) backs off.
struct TimerSlot {
    state: TimerState,
    generation: u64,
}

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct JobRegistration {
    /// Monotonic id, used only for log correlation.
    pub(crate) id: u64,
    pub(crate) data: JobData,
    pub(crate) callback: JobCallback,
    pub(crate) triggers: Mutex<Vec<Arc<dyn Trigger>>>,
    timer: Mutex<TimerSlot>,
    pub(crate) paused: AtomicBool,
    pub(crate) running: AtomicBool,
    pub(crate) scheduled_fire_time: Mutex<Option<DateTime<FixedOffset>>>,
    pub(crate) actual_fire_time: Mutex<Option<DateTime<FixedOffset>>>,
}

impl JobRegistration {
    pub(crate) fn new(
        data: JobData,
        callback: JobCallback,
        triggers: Vec<Arc<dyn Trigger>>,
    ) -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            data,
            callback,
            triggers: Mutex::new(triggers),
            timer: Mutex::new(TimerSlot {
                state: TimerState::Disarmed,
                generation: 0,
            }),
            paused: AtomicBool::new(false),
            running: AtomicBool::new(false),
            scheduled_fire_time: Mutex::new(None),
            actual_fire_time: Mutex::new(None),
        }
    }

    /// Arm the single-shot timer, aborting a previously armed sleep. The
    /// task is built from the new generation so it can call
    /// [`begin_fire`](Self::begin_fire) when its sleep elapses. No-op once
    /// the job is disposed.
    pub(crate) fn arm<F, Fut>(&self, runtime: &Handle, make_task: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut timer = self.timer.lock();
        if matches!(timer.state, TimerState::Disposed) {
            return;
        }
        timer.generation = timer.generation.wrapping_add(1);
        if let TimerState::Armed(old) = std::mem::replace(&mut timer.state, TimerState::Disarmed) {
            old.abort();
        }
        timer.state = TimerState::Armed(runtime.spawn(make_task(timer.generation)));
    }

    /// Abort a pending sleep. Disposed state is left untouched.
    pub(crate) fn disarm(&self) {
        let mut timer = self.timer.lock();
        if matches!(timer.state, TimerState::Armed(_)) {
            if let TimerState::Armed(handle) =
                std::mem::replace(&mut timer.state, TimerState::Disarmed)
            {
                handle.abort();
            }
        }
    }

    /// Called by an elapsed sleep task before it dispatches. Returns `true`
    /// and disarms the slot when the caller is still the armed generation;
    /// `false` means the task was superseded and must not fire.
    pub(crate) fn begin_fire(&self, generation: u64) -> bool {
        let mut timer = self.timer.lock();
        if timer.generation != generation || !matches!(timer.state, TimerState::Armed(_)) {
            return false;
        }
        timer.state = TimerState::Disarmed;
        true
    }

    /// Dispose the timer permanently; later arming is a no-op.
    pub(crate) fn dispose(&self) {
        let mut timer = self.timer.lock();
        if let TimerState::Armed(handle) = std::mem::replace(&mut timer.state, TimerState::Disposed)
        {
            handle.abort();
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        matches!(self.timer.lock().state, TimerState::Disposed)
    }
}
