use serde::Serialize;
use tracing::{error, info};

use crate::error::QdbError;

/// How a multi-item command reacts to a failed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// The first failure ends the command with that error.
    StopOnError,
    /// Keep going; report a partial failure at the end.
    Continue,
}

impl ErrorPolicy {
    pub fn from_flag(stop_on_error: bool) -> Self {
        if stop_on_error {
            ErrorPolicy::StopOnError
        } else {
            ErrorPolicy::Continue
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub item: String,
    pub error: String,
    pub not_found: bool,
}

/// Tracks per-item results for commands that act on several tables or files.
#[derive(Debug)]
pub struct Batch {
    policy: ErrorPolicy,
    total: usize,
    succeeded: usize,
    failures: Vec<BatchFailure>,
}

impl Batch {
    pub fn new(policy: ErrorPolicy, total: usize) -> Self {
        Self {
            policy,
            total,
            succeeded: 0,
            failures: Vec::new(),
        }
    }

    /// Record one item's result. `Ok(None)` means the item failed and the
    /// batch continues. An interrupt always ends the batch.
    pub fn record<T>(&mut self, item: &str, result: Result<T, QdbError>) -> Result<Option<T>, QdbError> {
        match result {
            Ok(value) => {
                self.succeeded += 1;
                Ok(Some(value))
            }
            Err(e) if e.is_interrupt() => Err(e),
            Err(e) if self.policy == ErrorPolicy::StopOnError => {
                error!("'{}' failed, stopping: {}", item, e);
                Err(e)
            }
            Err(e) => {
                error!("'{}' failed: {}", item, e);
                self.failures.push(BatchFailure {
                    item: item.to_string(),
                    error: e.to_string(),
                    not_found: e.is_table_not_found(),
                });
                Ok(None)
            }
        }
    }

    pub fn failures(&self) -> &[BatchFailure] {
        &self.failures
    }

    /// `Partial` when any item failed.
    pub fn finish(self) -> Result<usize, QdbError> {
        if self.failures.is_empty() {
            if self.total > 1 {
                info!("all {} item(s) succeeded", self.total);
            }
            return Ok(self.succeeded);
        }
        for failure in &self.failures {
            error!("failed: {} ({})", failure.item, failure.error);
        }
        Err(QdbError::Partial {
            failed: self.failures.len(),
            total: self.total,
        })
    }
}
