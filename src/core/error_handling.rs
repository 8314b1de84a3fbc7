//! Generic error handling utilities
//!
//! Lets callers log any crate error with the right level of detail without
//! matching on each subsystem's error enum.

/// Errors that can distinguish between user-actionable and system failures
///
/// When `is_user_actionable()` returns `true`, `user_message()` should return
/// `Some(message)`; otherwise it should return `None`.
pub trait ContextualError: std::error::Error {
    /// True if the error carries a message the caller can act on directly
    /// (bad queue name, oversized payload, undecodable message)
    fn is_user_actionable(&self) -> bool;

    /// The actionable message, when there is one
    fn user_message(&self) -> Option<&str>;
}

/// Log an error with detail appropriate to its kind
///
/// User-actionable errors log their specific message; system errors log the
/// operation context. Full details always go to the debug level.
///
/// # Examples
/// ```rust,no_run
/// # use queuestream::core::error_handling::log_error_with_context;
/// # use queuestream::queue::QueueError;
/// let error = QueueError::ConnectionClosed {
///     queue: "jobs".to_string(),
/// };
/// log_error_with_context(&error, "Consuming queue 'jobs'");
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => {
            log::error!("{}: {}", operation_context, user_msg);
        }
        _ => log::error!("{} failed", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
