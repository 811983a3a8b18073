//! Triggers — sources of future firing instants.
//!
//! Split into submodules:
//! - `expression` — six-field cron expression parsing
//! - `cron` — [`CronTrigger`] occurrence generation
//!
//! The scheduler consumes one occurrence per refresh through
//! [`Trigger::next_fire`]; a trigger reporting `None` is spent and gets
//! dropped from its job.

mod cron;
pub(crate) mod expression;

pub use cron::CronTrigger;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::error::ParseError;

/// Lazy stream of firing instants borrowed from a trigger.
pub type UpcomingIter<'a> = Box<dyn Iterator<Item = DateTime<FixedOffset>> + Send + 'a>;

/// A source of future firing instants.
///
/// `upcoming(base)` yields a monotonically non-decreasing sequence whose
/// every element is at or after `base`. An empty sequence means the trigger
/// will never fire again. `upcoming` may be called any number of times;
/// implementations hold no state between calls beyond what their semantics
/// require (`NowTrigger` keeps its fired-once latch).
pub trait Trigger: Send + Sync {
    /// The expression this trigger was created from.
    fn expression(&self) -> &str;

    /// Firing instants at or after `base`, earliest first.
    fn upcoming(&self, base: DateTime<FixedOffset>) -> UpcomingIter<'_>;

    /// First firing instant at or after `base`; `None` once the trigger is
    /// spent.
    fn next_fire(&self, base: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        self.upcoming(base).next()
    }
}

/// Fires exactly once, at the base instant of its first evaluation.
#[derive(Debug, Default)]
pub struct NowTrigger {
    fired: AtomicBool,
}

impl NowTrigger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Trigger for NowTrigger {
    fn expression(&self) -> &str {
        "now"
    }

    fn upcoming(&self, base: DateTime<FixedOffset>) -> UpcomingIter<'_> {
        if self.fired.swap(true, Ordering::AcqRel) {
            Box::new(std::iter::empty())
        } else {
            Box::new(std::iter::once(base))
        }
    }
}

/// Never fires. The scheduler treats it as spent at the first refresh and
/// drops it, leaving the job registered without a pending occurrence.
#[derive(Debug, Default)]
pub struct ManualTrigger;

impl ManualTrigger {
    pub fn new() -> Self {
        Self
    }
}

impl Trigger for ManualTrigger {
    fn expression(&self) -> &str {
        "manual"
    }

    fn upcoming(&self, _base: DateTime<FixedOffset>) -> UpcomingIter<'_> {
        Box::new(std::iter::empty())
    }
}

/// Build a trigger from an expression: `"now"`, `"manual"`, or a six-field
/// cron expression. Anything else fails with
/// [`ParseError::UnknownExpression`].
pub fn create(expression: &str) -> Result<Arc<dyn Trigger>, ParseError> {
    match expression.trim() {
        "now" => Ok(Arc::new(NowTrigger::new())),
        "manual" => Ok(Arc::new(ManualTrigger::new())),
        other => CronTrigger::new(other)
            .map(|trigger| Arc::new(trigger) as Arc<dyn Trigger>)
            .map_err(|_| ParseError::UnknownExpression(expression.to_string())),
    }
}
