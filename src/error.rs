//! # Error Types
//!
//! This module defines the error type shared by the heuristics, the solution
//! pool and the grid dispatcher.
//!
//! Errors fall into three groups:
//!
//! - configuration errors, raised before any run starts,
//! - structural errors, raised when a heuristic is asked to do something its
//!   move generation does not support,
//! - run errors, which wrap either of the above with the grid position of
//!   the failing run.
//!
//! ## Examples
//!
//! Using the `OptionExt` trait to convert `Option` to `Result`:
//!
//! ```rust
//! use harvest_search::error::{OptionExt, SearchError};
//!
//! fn best_value(values: &[f64]) -> harvest_search::error::Result<f64> {
//!     values
//!         .iter()
//!         .cloned()
//!         .reduce(f64::max)
//!         .ok_or_else_search(|| SearchError::EmptyPool)
//! }
//!
//! assert!(best_value(&[]).is_err());
//! ```

use thiserror::Error;

/// Represents errors that can occur while searching for harvest schedules.
#[derive(Error, Debug)]
pub enum SearchError {
    /// An option or heuristic parameter is out of range or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The heuristic's move generation cannot handle the requested setup.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// An operation needed at least one solution but the pool was empty.
    #[error("Empty pool error: Cannot select from an empty solution pool")]
    EmptyPool,

    /// NaN or infinite values where a finite number is required.
    #[error("Invalid numeric value: {0}")]
    InvalidNumericValue(String),

    /// The worker thread pool could not be created.
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// A single run failed; `context` names its grid coordinates.
    #[error("Run failed at {context}: {source}")]
    Run {
        context: String,
        #[source]
        source: Box<SearchError>,
    },

    /// A generic error with a custom message.
    #[error("{0}")]
    Other(String),
}

impl SearchError {
    /// Wraps this error with the coordinates of the run that produced it.
    pub fn at_position(self, context: impl Into<String>) -> Self {
        SearchError::Run {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// A specialized Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Extension trait for Option to convert to Result with a custom error.
pub trait OptionExt<T> {
    /// Converts an `Option<T>` to a `Result<T, SearchError>` using a closure
    /// to generate the error.
    fn ok_or_else_search<F>(self, err_fn: F) -> Result<T>
    where
        F: FnOnce() -> SearchError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_else_search<F>(self, err_fn: F) -> Result<T>
    where
        F: FnOnce() -> SearchError,
    {
        self.ok_or_else(err_fn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_keeps_source() {
        let error = SearchError::NotSupported("three thins".to_string())
            .at_position("parameter 0, thins 5/none/none, rotation 12, rate 4%");
        let message = error.to_string();
        assert!(message.contains("rotation 12"));
        assert!(message.contains("three thins"));
        match error {
            SearchError::Run { source, .. } => {
                assert!(matches!(*source, SearchError::NotSupported(_)))
            }
            _ => panic!("expected a run error"),
        }
    }
}
