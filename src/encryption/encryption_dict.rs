//! Parsed form of the standard encryption dictionary
//! (ISO 32000-2 Section 7.6.2)

use crate::objects::{Dictionary, Name, Object};

use super::EncryptionError;

/// The fields of a standard Encrypt dictionary.
#[derive(Debug, Clone)]
pub struct EncryptDictionary {
    /// Security handler name; only `Standard` is supported.
    pub filter: Name,
    /// Algorithm version (V): 1, 2, or 4.
    pub version: i64,
    /// Standard handler revision (R): 2, 3, or 4.
    pub revision: i64,
    /// Key length in bits; 40 through 128 in multiples of 8.
    pub length_bits: i64,
    /// Owner password hash (O entry).
    pub owner_value: Vec<u8>,
    /// User password hash (U entry).
    pub user_value: Vec<u8>,
    /// Permission bits (P entry), as the signed value in the file.
    pub p: i64,
    pub encrypt_metadata: bool,
    /// Crypt filter dictionaries (CF entry).
    pub crypt_filters: Dictionary,
    /// Default crypt filter for streams (StmF).
    pub stream_filter: Name,
    /// Default crypt filter for strings (StrF).
    pub string_filter: Name,
}

fn required<'d>(dict: &'d Dictionary, key: &str) -> Result<&'d Object, EncryptionError> {
    dict.get(key)
        .ok_or_else(|| EncryptionError::MalformedEncryptDictionary(format!("missing {key}")))
}

fn string_bytes(object: &Object, key: &str) -> Result<Vec<u8>, EncryptionError> {
    object
        .as_string()
        .map(|s| s.as_bytes().to_vec())
        .ok_or_else(|| {
            EncryptionError::MalformedEncryptDictionary(format!("{key} is not a string"))
        })
}

impl EncryptDictionary {
    /// Interprets a dictionary from the trailer's `Encrypt` entry.
    pub fn from_dict(dict: &Dictionary) -> Result<Self, EncryptionError> {
        let filter = required(dict, "Filter")?
            .as_name()
            .cloned()
            .ok_or_else(|| {
                EncryptionError::MalformedEncryptDictionary("Filter is not a name".into())
            })?;
        if filter != "Standard" {
            return Err(EncryptionError::Unsupported(format!(
                "security handler {filter}"
            )));
        }

        let version = dict
            .get("V")
            .and_then(Object::as_integer)
            .unwrap_or(0);
        let revision = required(dict, "R")?.as_integer().ok_or_else(|| {
            EncryptionError::MalformedEncryptDictionary("R is not an integer".into())
        })?;
        let p = required(dict, "P")?.as_integer().ok_or_else(|| {
            EncryptionError::MalformedEncryptDictionary("P is not an integer".into())
        })?;

        let owner_value = string_bytes(required(dict, "O")?, "O")?;
        let user_value = string_bytes(required(dict, "U")?, "U")?;

        Ok(Self {
            filter,
            version,
            revision,
            length_bits: dict
                .get("Length")
                .and_then(Object::as_integer)
                .unwrap_or(40),
            owner_value,
            user_value,
            p,
            encrypt_metadata: dict
                .get("EncryptMetadata")
                .and_then(Object::as_bool)
                .unwrap_or(true),
            crypt_filters: dict
                .get("CF")
                .and_then(Object::as_dict)
                .cloned()
                .unwrap_or_default(),
            stream_filter: dict
                .get("StmF")
                .and_then(Object::as_name)
                .cloned()
                .unwrap_or_else(|| Name::from("Identity")),
            string_filter: dict
                .get("StrF")
                .and_then(Object::as_name)
                .cloned()
                .unwrap_or_else(|| Name::from("Identity")),
        })
    }

    /// Key length in bytes.
    pub fn key_length(&self) -> usize {
        (self.length_bits.clamp(40, 128) / 8) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::PdfString;

    fn minimal_dict() -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Filter", Name::from("Standard"));
        dict.set("V", 2);
        dict.set("R", 3);
        dict.set("Length", 128);
        dict.set("O", PdfString::hex(vec![1u8; 32]));
        dict.set("U", PdfString::hex(vec![2u8; 32]));
        dict.set("P", -3904i64);
        dict
    }

    #[test]
    fn test_parse_minimal() {
        let encrypt = EncryptDictionary::from_dict(&minimal_dict()).unwrap();
        assert_eq!(encrypt.revision, 3);
        assert_eq!(encrypt.key_length(), 16);
        assert!(encrypt.encrypt_metadata);
        assert_eq!(encrypt.stream_filter, "Identity");
    }

    #[test]
    fn test_non_standard_handler_rejected() {
        let mut dict = minimal_dict();
        dict.set("Filter", Name::from("Custom"));
        assert!(matches!(
            EncryptDictionary::from_dict(&dict),
            Err(EncryptionError::Unsupported(_))
        ));
    }

    #[test]
    fn test_missing_entry() {
        let mut dict = minimal_dict();
        dict.remove("O");
        assert!(matches!(
            EncryptDictionary::from_dict(&dict),
            Err(EncryptionError::MalformedEncryptDictionary(_))
        ));
    }
}
