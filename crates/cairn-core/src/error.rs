use thiserror::Error;

/// Errors surfaced to callers of task operations. Everything else
/// (missing ids, failed saves, timer races) degrades to a no-op or a log
/// line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("task text cannot be empty")]
    Validation,
}

pub type CoreResult<T> = Result<T, CoreError>;
