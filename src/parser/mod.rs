//! COS-level parsing
//!
//! This module implements reading of the PDF file structure according to
//! ISO 32000-2 Section 7: tokenizing, object parsing, stream filters,
//! cross-reference resolution, and the document instance tying them together.

pub mod document;
pub mod filters;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod recovery;
pub mod xref;
pub mod xref_stream;

use std::fmt;
use std::sync::Arc;

use crate::encryption::{CryptProvider, EncryptionError, StandardCryptProvider};
use crate::parser::filters::FilterError;

pub use self::document::{AccessLevel, PdfDocument, SaveOptions, XRefStyle};
pub use self::lexer::{Lexer, Token};
pub use self::objects::ObjectParser;
pub use self::xref::{XRefEntry, XRefSection, XRefTable};

/// Result type for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// COS parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF header")]
    MalformedHeader,

    #[error("Unexpected byte at position {position}: expected {expected}")]
    UnexpectedByte {
        position: usize,
        expected: &'static str,
    },

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Malformed dictionary at position {position}: {message}")]
    MalformedDictionary { position: usize, message: String },

    #[error("Malformed stream: {0}")]
    MalformedStream(String),

    #[error("Malformed xref: {0}")]
    MalformedXRef(String),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Unknown object: {0} {1} R")]
    UnknownObject(u32, u16),

    #[error("Object header mismatch: expected {expected}, found {found}")]
    WrongObjectHeader { expected: String, found: String },

    #[error("Circular reference through {0} {1} R")]
    CircularReference(u32, u16),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

/// Kinds of recoveries and anomalies reported as warnings in lenient mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    MalformedHeader,
    MalformedToken,
    MalformedXRef,
    MalformedStream,
    DuplicateKey,
    XRefRecovery,
}

/// A structured warning recorded while parsing in lenient mode.
///
/// In strict mode the same condition surfaces as a [`ParseError`] instead.
#[derive(Debug, Clone)]
pub struct Warning {
    /// Byte offset in the input the condition was observed at.
    pub offset: u64,
    pub kind: WarningKind,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at offset {}: {}", self.kind, self.offset, self.message)
    }
}

/// Per-document parsing configuration.
#[derive(Clone)]
pub struct ParseOptions {
    /// Elevate recovery warnings to errors.
    pub strict: bool,
    /// Cryptographic primitives used by the standard security handler.
    pub crypt_provider: Arc<dyn CryptProvider>,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn lenient() -> Self {
        Self::default()
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: false,
            crypt_provider: Arc::new(StandardCryptProvider),
        }
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}
