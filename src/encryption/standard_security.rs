//! Standard security handler (ISO 32000-2 Section 7.6.4)
//!
//! Password authentication and per-object encryption for revisions 2, 3,
//! and 4. The algorithm numbers in the comments refer to Section 7.6.4 of
//! the specification.

use std::sync::Arc;

use crate::objects::{Dictionary, Name, Object, ObjectId, PdfString};

use super::{CryptProvider, EncryptDictionary, EncryptionError, Permissions};

/// Padding string applied to passwords (ISO 32000-2 Table 27).
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

/// The cipher selected for a piece of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    Arc4,
    AesV2,
}

/// Password-based security handler for revisions 2 through 4.
pub struct StandardSecurityHandler {
    encrypt: EncryptDictionary,
    /// First element of the trailer ID array.
    file_id: Vec<u8>,
    provider: Arc<dyn CryptProvider>,
}

/// Pads or truncates a password to exactly 32 bytes (Algorithm 2 step a).
fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

impl StandardSecurityHandler {
    pub fn new(
        encrypt: EncryptDictionary,
        file_id: Vec<u8>,
        provider: Arc<dyn CryptProvider>,
    ) -> Result<Self, EncryptionError> {
        if !matches!(encrypt.version, 1 | 2 | 4) {
            return Err(EncryptionError::Unsupported(format!(
                "encryption version V={}",
                encrypt.version
            )));
        }
        if !matches!(encrypt.revision, 2..=4) {
            return Err(EncryptionError::Unsupported(format!(
                "standard handler revision R={}",
                encrypt.revision
            )));
        }
        Ok(Self {
            encrypt,
            file_id,
            provider,
        })
    }

    pub fn encrypt_dictionary(&self) -> &EncryptDictionary {
        &self.encrypt
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::from_p(self.encrypt.p)
    }

    fn key_length(&self) -> usize {
        if self.encrypt.revision == 2 {
            5
        } else {
            self.encrypt.key_length()
        }
    }

    /// Algorithm 2: computes the file encryption key from a user password.
    pub fn compute_encryption_key(&self, password: &[u8]) -> Vec<u8> {
        let mut input = Vec::with_capacity(84);
        input.extend_from_slice(&pad_password(password));
        input.extend_from_slice(&self.encrypt.owner_value);
        input.extend_from_slice(&(self.encrypt.p as u32).to_le_bytes());
        input.extend_from_slice(&self.file_id);
        if self.encrypt.revision >= 4 && !self.encrypt.encrypt_metadata {
            input.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        }

        let mut digest = md5::compute(&input).0.to_vec();
        if self.encrypt.revision >= 3 {
            for _ in 0..50 {
                digest = md5::compute(&digest[..self.key_length()]).0.to_vec();
            }
        }
        digest.truncate(self.key_length());
        digest
    }

    /// Algorithm 3 steps a through d: the RC4 key derived from the owner
    /// password.
    fn owner_cipher_key(
        revision: i64,
        key_length: usize,
        password: &[u8],
    ) -> Vec<u8> {
        let mut digest = md5::compute(pad_password(password)).0.to_vec();
        if revision >= 3 {
            for _ in 0..50 {
                digest = md5::compute(&digest).0.to_vec();
            }
        }
        digest.truncate(key_length);
        digest
    }

    /// Algorithm 3: computes the O entry for a new document.
    pub fn compute_owner_value(
        revision: i64,
        key_length: usize,
        provider: &dyn CryptProvider,
        owner_password: &[u8],
        user_password: &[u8],
    ) -> Result<Vec<u8>, EncryptionError> {
        let password = if owner_password.is_empty() {
            user_password
        } else {
            owner_password
        };
        let cipher_key = Self::owner_cipher_key(revision, key_length, password);

        let mut value = provider.arc4(&cipher_key, &pad_password(user_password))?;
        if revision >= 3 {
            for i in 1..=19u8 {
                let key: Vec<u8> = cipher_key.iter().map(|b| b ^ i).collect();
                value = provider.arc4(&key, &value)?;
            }
        }
        Ok(value)
    }

    /// Algorithms 4 and 5: computes the U entry from a user password.
    pub fn compute_user_value(&self, password: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let key = self.compute_encryption_key(password);

        if self.encrypt.revision == 2 {
            self.provider.arc4(&key, &PASSWORD_PADDING)
        } else {
            let mut input = PASSWORD_PADDING.to_vec();
            input.extend_from_slice(&self.file_id);
            let digest = md5::compute(&input).0;

            let mut value = self.provider.arc4(&key, &digest)?;
            for i in 1..=19u8 {
                let step_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
                value = self.provider.arc4(&step_key, &value)?;
            }
            // The remaining 16 bytes of U are arbitrary; the padding string
            // fills them.
            value.extend_from_slice(&PASSWORD_PADDING[..16]);
            Ok(value)
        }
    }

    /// Algorithm 6: authenticates a user password. Returns the file key on
    /// success.
    pub fn authenticate_user_password(
        &self,
        password: &[u8],
    ) -> Result<Option<Vec<u8>>, EncryptionError> {
        let key = self.compute_encryption_key(password);
        let computed = self.compute_user_value(password)?;

        let matches = if self.encrypt.revision == 2 {
            computed == self.encrypt.user_value
        } else {
            // Revision 3 and later compare only the first 16 bytes.
            computed.get(..16) == self.encrypt.user_value.get(..16)
        };

        Ok(matches.then_some(key))
    }

    /// Algorithm 7: authenticates an owner password by recovering the user
    /// password from the O entry.
    pub fn authenticate_owner_password(
        &self,
        password: &[u8],
    ) -> Result<Option<Vec<u8>>, EncryptionError> {
        let cipher_key = Self::owner_cipher_key(self.encrypt.revision, self.key_length(), password);

        let mut user_password = self.encrypt.owner_value.clone();
        if self.encrypt.revision == 2 {
            user_password = self.provider.arc4(&cipher_key, &user_password)?;
        } else {
            for i in (0..=19u8).rev() {
                let step_key: Vec<u8> = cipher_key.iter().map(|b| b ^ i).collect();
                user_password = self.provider.arc4(&step_key, &user_password)?;
            }
        }

        self.authenticate_user_password(&user_password)
    }

    /// Algorithm 1 steps a through d: the per-object key for `id`.
    fn object_key(&self, file_key: &[u8], id: ObjectId, aes: bool) -> Vec<u8> {
        let mut extended = file_key.to_vec();
        extended.extend_from_slice(&id.number().to_le_bytes()[..3]);
        extended.extend_from_slice(&id.generation().to_le_bytes()[..2]);
        if aes {
            extended.extend_from_slice(b"sAlT");
        }

        let mut key = md5::compute(&extended).0.to_vec();
        key.truncate((file_key.len() + 5).min(16));
        key
    }

    /// The cipher selected by the relevant crypt filter.
    ///
    /// `crypt_filter` names an explicit filter from a stream's `Crypt`
    /// entry; otherwise the StmF/StrF default for the data kind applies.
    pub fn crypt_method(
        &self,
        is_stream: bool,
        crypt_filter: Option<&Name>,
    ) -> Result<CryptMethod, EncryptionError> {
        if self.encrypt.version != 4 {
            // V1/V2 always use RC4 over the whole document.
            return Ok(CryptMethod::Arc4);
        }

        let name = match crypt_filter {
            Some(name) => name.clone(),
            None if is_stream => self.encrypt.stream_filter.clone(),
            None => self.encrypt.string_filter.clone(),
        };
        if name == "Identity" {
            return Ok(CryptMethod::Identity);
        }

        let method = self
            .encrypt
            .crypt_filters
            .get(name.as_bytes())
            .and_then(Object::as_dict)
            .and_then(|cf| cf.get("CFM"))
            .and_then(Object::as_name)
            .cloned()
            .unwrap_or_else(|| Name::from("Identity"));

        match method.as_bytes() {
            b"Identity" => Ok(CryptMethod::Identity),
            b"V2" => Ok(CryptMethod::Arc4),
            b"AESV2" => Ok(CryptMethod::AesV2),
            _ => Err(EncryptionError::Unsupported(format!(
                "crypt filter method {method}"
            ))),
        }
    }

    /// Decrypts string or stream data belonging to object `id`.
    pub fn decrypt_object(
        &self,
        file_key: &[u8],
        data: &[u8],
        id: ObjectId,
        is_stream: bool,
        crypt_filter: Option<&Name>,
    ) -> Result<Vec<u8>, EncryptionError> {
        match self.crypt_method(is_stream, crypt_filter)? {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Arc4 => {
                let key = self.object_key(file_key, id, false);
                self.provider.arc4(&key, data)
            }
            CryptMethod::AesV2 => {
                let key = self.object_key(file_key, id, true);
                self.provider.aes_cbc_decrypt(&key, data)
            }
        }
    }

    /// Encrypts string or stream data belonging to object `id`.
    pub fn encrypt_object(
        &self,
        file_key: &[u8],
        data: &[u8],
        id: ObjectId,
        is_stream: bool,
        crypt_filter: Option<&Name>,
    ) -> Result<Vec<u8>, EncryptionError> {
        match self.crypt_method(is_stream, crypt_filter)? {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Arc4 => {
                let key = self.object_key(file_key, id, false);
                self.provider.arc4(&key, data)
            }
            CryptMethod::AesV2 => {
                let key = self.object_key(file_key, id, true);
                self.provider.aes_cbc_encrypt(&key, data)
            }
        }
    }
}

/// Parameters for encrypting a new or rewritten document.
#[derive(Debug, Clone)]
pub struct EncryptionSetup {
    /// AES-128 (V4/AESV2) when true, RC4 (V2) otherwise.
    pub aes: bool,
    /// Key length in bits, 40 through 128.
    pub key_length_bits: i64,
    pub permissions: Permissions,
}

impl Default for EncryptionSetup {
    fn default() -> Self {
        Self {
            aes: true,
            key_length_bits: 128,
            permissions: Permissions::all(),
        }
    }
}

/// Builds a standard encryption dictionary plus its handler for a new
/// document.
pub fn build_standard_encryption(
    setup: &EncryptionSetup,
    user_password: &[u8],
    owner_password: &[u8],
    file_id: &[u8],
    provider: Arc<dyn CryptProvider>,
) -> Result<(StandardSecurityHandler, Dictionary), EncryptionError> {
    let (version, revision): (i64, i64) = if setup.aes {
        (4, 4)
    } else if setup.key_length_bits > 40 {
        (2, 3)
    } else {
        (1, 2)
    };
    let key_length_bits = if revision == 2 {
        40
    } else {
        setup.key_length_bits.clamp(40, 128)
    };

    let owner_value = StandardSecurityHandler::compute_owner_value(
        revision,
        (key_length_bits / 8) as usize,
        provider.as_ref(),
        owner_password,
        user_password,
    )?;

    let mut dict = Dictionary::new();
    dict.set("Filter", Name::from("Standard"));
    dict.set("V", version);
    dict.set("R", revision);
    dict.set("Length", key_length_bits);
    if setup.aes {
        let mut std_cf = Dictionary::new();
        std_cf.set("Type", Name::from("CryptFilter"));
        std_cf.set("CFM", Name::from("AESV2"));
        std_cf.set("Length", 16);
        let mut cf = Dictionary::new();
        cf.set("StdCF", std_cf);
        dict.set("CF", cf);
        dict.set("StmF", Name::from("StdCF"));
        dict.set("StrF", Name::from("StdCF"));
    }
    dict.set("O", PdfString::hex(owner_value));
    // Placeholder until the real U value is computed below.
    dict.set("U", PdfString::hex(vec![0u8; 32]));
    dict.set("P", setup.permissions.as_p());

    let mut encrypt = EncryptDictionary::from_dict(&dict)?;
    // U depends on O and P, so it is computed through a handler seeded with
    // the partial dictionary.
    let handler =
        StandardSecurityHandler::new(encrypt.clone(), file_id.to_vec(), Arc::clone(&provider))?;
    let user_value = handler.compute_user_value(user_password)?;

    dict.set("U", PdfString::hex(user_value.clone()));
    encrypt.user_value = user_value;

    let handler = StandardSecurityHandler::new(encrypt, file_id.to_vec(), provider)?;
    Ok((handler, dict))
}
