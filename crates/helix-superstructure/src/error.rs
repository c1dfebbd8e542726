//! Error types for the shot model and mechanism IO.

use helix_common::CommonError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SuperstructureError {
    #[error("invalid shooter configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("pivot lookup table: {0}")]
    PivotTable(#[from] CommonError),

    #[error("mechanism IO failure: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, SuperstructureError>;
