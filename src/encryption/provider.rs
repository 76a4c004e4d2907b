//! Injected cipher primitives
//!
//! The standard security handler calls ciphers only through this trait, so
//! the cryptographic backend can be swapped per document. The crate ships
//! [`StandardCryptProvider`], backed by the `aes`/`cbc` crates and the RC4
//! implementation in this module, and [`IdentityProvider`] for documents
//! that use the Identity crypt filter only.

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::rc4::Rc4;
use super::EncryptionError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Cipher primitives consumed by the standard security handler.
///
/// AES data is in the PDF wire form: the initialization vector occupies the
/// first 16 bytes of the ciphertext, and the plaintext carries PKCS#7
/// padding.
pub trait CryptProvider: Send + Sync {
    fn arc4(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError>;
    fn aes_cbc_encrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError>;
    fn aes_cbc_decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError>;
}

/// Pass-through provider: same input, same output.
pub struct IdentityProvider;

impl CryptProvider for IdentityProvider {
    fn arc4(&self, _key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(data.to_vec())
    }

    fn aes_cbc_encrypt(&self, _key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(data.to_vec())
    }

    fn aes_cbc_decrypt(&self, _key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(data.to_vec())
    }
}

/// Default provider: RC4 plus AES-128-CBC.
pub struct StandardCryptProvider;

impl CryptProvider for StandardCryptProvider {
    fn arc4(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if key.is_empty() {
            return Err(EncryptionError::Cipher("empty RC4 key".into()));
        }
        Ok(Rc4::transform(key, data))
    }

    fn aes_cbc_encrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        // The IV is derived from key and plaintext so that serialization is
        // deterministic for identical input.
        let iv: [u8; 16] = md5::compute([key, data].concat()).0;

        let mut padded = data.to_vec();
        let pad = 16 - data.len() % 16;
        padded.extend(std::iter::repeat(pad as u8).take(pad));

        let cipher = Aes128CbcEnc::new_from_slices(key, &iv)
            .map_err(|e| EncryptionError::Cipher(format!("AES key/IV: {e}")))?;

        let mut encrypted = vec![0u8; padded.len()];
        cipher
            .encrypt_padded_b2b_mut::<NoPadding>(&padded, &mut encrypted)
            .map_err(|e| EncryptionError::Cipher(format!("AES encrypt: {e}")))?;

        let mut output = iv.to_vec();
        output.extend_from_slice(&encrypted);
        Ok(output)
    }

    fn aes_cbc_decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if data.len() < 16 {
            return Err(EncryptionError::Cipher(
                "AES data shorter than the IV".into(),
            ));
        }
        let (iv, encrypted) = data.split_at(16);
        if encrypted.is_empty() {
            return Ok(Vec::new());
        }
        if encrypted.len() % 16 != 0 {
            return Err(EncryptionError::Cipher(
                "AES ciphertext is not block-aligned".into(),
            ));
        }

        let cipher = Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| EncryptionError::Cipher(format!("AES key/IV: {e}")))?;

        let mut buffer = vec![0u8; encrypted.len()];
        let plaintext = cipher
            .decrypt_padded_b2b_mut::<Pkcs7>(encrypted, &mut buffer)
            .map_err(|e| EncryptionError::Cipher(format!("AES decrypt: {e}")))?;
        Ok(plaintext.to_vec())
    }
}
