//! Errors raised by the construction and configuration surfaces of the manager.
//!
//! The hot poller path never returns `Result` (see `manager::AtManager::process`) —
//! per-command failures are reported through [`crate::work::ResponseCode`] and the
//! adapter's `error` hook instead, matching the "no error is ever thrown across the
//! poller boundary" invariant.

use thiserror::Error;

/// Errors from building a manager, enqueuing work, or validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("work queue is full")]
    QueueFull,
    #[error("memory limit exceeded: limit={limit}, requested={requested}")]
    MemoryLimitExceeded { limit: usize, requested: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type AtResult<T> = std::result::Result<T, Error>;
