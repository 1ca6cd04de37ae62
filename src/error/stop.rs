use thiserror::Error;

/// Errors from evaluating a stop condition.
///
/// A multi-element vector returned by an external query is a configuration
/// error, not a transient failure — §4.7 marks it fatal rather than
/// retryable.
#[derive(Debug, Error)]
pub enum StopError {
    #[error("external stop query '{query}' returned a multi-element vector ({len} values); expected a scalar or single-element vector")]
    AmbiguousVectorResult { query: String, len: usize },
    #[error("external stop query '{query}' failed: {message}")]
    QueryFailed { query: String, message: String },
    #[error("custom stop callback '{name}' is not registered")]
    UnknownCustomCallback { name: String },
}
