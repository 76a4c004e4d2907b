//! PDF encryption support according to ISO 32000-2 Section 7.6
//!
//! This module implements the standard (password-based) security handler for
//! revisions 2, 3, and 4. Cipher primitives are injected through the
//! [`CryptProvider`] trait so the cryptographic backend stays a runtime
//! concern; key derivation itself is MD5-based and built in.

mod encryption_dict;
mod permissions;
mod provider;
mod rc4;
mod standard_security;

pub use encryption_dict::EncryptDictionary;
pub use permissions::{PermissionFlags, Permissions};
pub use provider::{CryptProvider, IdentityProvider, StandardCryptProvider};
pub use rc4::Rc4;
pub use standard_security::{
    build_standard_encryption, CryptMethod, EncryptionSetup, StandardSecurityHandler,
    PASSWORD_PADDING,
};

/// Errors raised by encryption machinery.
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("Document is encrypted and requires a password")]
    EncryptionRequired,

    #[error("Password does not match the document")]
    BadPassword,

    #[error("Unsupported encryption: {0}")]
    Unsupported(String),

    #[error("No crypt provider available for {0}")]
    ProviderMissing(&'static str),

    #[error("Malformed encryption dictionary: {0}")]
    MalformedEncryptDictionary(String),

    #[error("Cipher error: {0}")]
    Cipher(String),
}
