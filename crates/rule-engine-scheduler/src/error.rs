// rule-engine-scheduler/src/error.rs
// ============================================================================
// Module: Scheduler Errors
// Description: Failures mutating a schedule's persistent record or cron
//              handle (spec §4.9).
// Purpose: Distinguish a bad cron expression from a backend failure so
//          `add_schedule`/`update` can reject the former outright.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors [`crate::ScheduleManager`] operations may surface.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression does not parse.
    #[error("invalid cron expression {expression:?}: {reason}")]
    InvalidCron {
        /// The rejected expression.
        expression: String,
        /// Why the parser rejected it.
        reason: String,
    },
    /// The persistent store rejected a read or write.
    #[error("schedule store operation failed: {0}")]
    Backend(String),
    /// No schedule is registered under the given rule chain id.
    #[error("no schedule registered for rule chain {0}")]
    NotFound(String),
}
