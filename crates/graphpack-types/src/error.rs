use thiserror::Error;

/// Errors produced while reading graphpack values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be a string or integer")]
    InvalidField { field: &'static str },

    #[error("serialization error: {0}")]
    Serialization(String),
}
