//! Error types for field-level decoding
//!
//! Raised when a value pulled out of an event's field map cannot be used.
//! Callers treat these as local to one event: the derived value is dropped,
//! the event is kept.

use thiserror::Error;

/// A field was missing or held text of the wrong shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("Missing field: {field}")]
    Missing { field: String },

    #[error("Field {field} is not an integer: {value:?}")]
    InvalidInteger { field: String, value: String },

    #[error("Field {field} is not a decimal: {value:?}")]
    InvalidDecimal { field: String, value: String },

    #[error("Integer overflow computing {field}")]
    Overflow { field: String },
}

impl FieldError {
    /// Name of the field the error refers to.
    pub fn field(&self) -> &str {
        match self {
            FieldError::Missing { field }
            | FieldError::InvalidInteger { field, .. }
            | FieldError::InvalidDecimal { field, .. }
            | FieldError::Overflow { field } => field,
        }
    }
}
