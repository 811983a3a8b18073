use thiserror::Error;

/// Error type carried out of user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from scheduler registry and lifecycle operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// A job keyed by the same data is already registered.
    #[error("a job with the same data is already scheduled")]
    DuplicateJob,

    /// No job is registered for the given data.
    #[error("no job is scheduled for the given data")]
    JobNotFound,

    /// A job must be scheduled with at least one trigger.
    #[error("a job needs at least one trigger")]
    NoTriggers,

    /// The scheduler (or the job's timer) has been shut down.
    #[error("the scheduler has been shut down")]
    Disposed,
}

/// Errors produced while parsing a trigger expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not `now`, `manual`, or a parsable cron expression.
    #[error("unknown trigger expression: '{0}'")]
    UnknownExpression(String),

    /// The expression does not have the six-field cron shape.
    #[error("expected six whitespace-separated cron fields: '{0}'")]
    MalformedExpression(String),

    #[error("{field}: invalid token '{token}'")]
    InvalidToken { field: &'static str, token: String },

    #[error("{field}: range start {start} greater than end {end}")]
    InvalidRange {
        field: &'static str,
        start: u8,
        end: u8,
    },

    #[error("{field}: step must be at least 1")]
    InvalidStep { field: &'static str },

    /// Every value of the field fell outside its legal range.
    #[error("{field}: no values fall inside the legal range")]
    EmptyField { field: &'static str },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
