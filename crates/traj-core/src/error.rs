//! Errors shared by the foundation crate.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Unknown unit: '{unit}'")]
    UnknownUnit { unit: String },

    #[error("Incompatible units: '{from}' cannot be converted to '{to}'")]
    IncompatibleUnits { from: String, to: String },
}
