//! Time source abstraction — the scheduler reads "now" through an
//! injectable clock so tests can pin or shift it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

/// Shared handle to a time source returning the current instant with its
/// UTC offset.
///
/// The default [`Clock::system`] reads the system UTC clock. Clones share
/// the same source and may be read from any thread.
#[derive(Clone)]
pub struct Clock {
    source: Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>,
}

impl Clock {
    /// The system UTC clock.
    pub fn system() -> Self {
        Self::from_fn(|| Utc::now().fixed_offset())
    }

    /// A clock frozen at `instant`.
    pub fn fixed(instant: DateTime<FixedOffset>) -> Self {
        Self::from_fn(move || instant)
    }

    /// A clock backed by an arbitrary closure.
    pub fn from_fn(f: impl Fn() -> DateTime<FixedOffset> + Send + Sync + 'static) -> Self {
        Self {
            source: Arc::new(f),
        }
    }

    /// Current instant as reported by this clock.
    pub fn now(&self) -> DateTime<FixedOffset> {
        (self.source)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock").finish_non_exhaustive()
    }
}
