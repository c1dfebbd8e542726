//! Errors raised while building shared utilities.

use thiserror::Error;

/// Errors raised by `helix-common` constructors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommonError {
    #[error("interpolating table needs at least one sample")]
    EmptyTable,
    #[error("table input at index {0} is not finite or not strictly increasing")]
    UnsortedTable(usize),
    #[error("counting cache refresh period must be at least 1")]
    ZeroRefreshPeriod,
}
