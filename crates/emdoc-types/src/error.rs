use thiserror::Error;

/// Errors produced when converting loosely typed values into emdoc types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("expected an object or a list of objects, got {0}")]
    NotARecord(String),

    #[error("list element {index} is not an object")]
    NotARecordElement { index: usize },
}
