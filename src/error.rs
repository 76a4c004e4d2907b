use thiserror::Error;

use crate::encryption::EncryptionError;
use crate::parser::ParseError;

/// Top-level error type for document operations.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, PdfError>;
