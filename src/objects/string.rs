use std::fmt;

/// The source form of a string object.
///
/// Literal and hexadecimal strings carry the same kind of data; the form is
/// kept so a parsed document serializes back the way it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Literal,
    Hex,
}

/// A string object holding raw bytes after escape or hex resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString {
    data: Vec<u8>,
    format: StringFormat,
}

impl PdfString {
    pub fn literal(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            format: StringFormat::Literal,
        }
    }

    pub fn hex(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            format: StringFormat::Hex,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn format(&self) -> StringFormat {
        self.format
    }

    pub(crate) fn set_bytes(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Decodes the bytes as a text string (ISO 32000-2 Section 7.9.2.2).
    ///
    /// A UTF-16BE byte order mark selects UTF-16; anything else is read as
    /// Latin-1, which is a superset of the printable range of PDFDocEncoding.
    pub fn to_text(&self) -> String {
        if self.data.starts_with(&[0xFE, 0xFF]) {
            let units: Vec<u16> = self.data[2..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            self.data.iter().map(|&b| b as char).collect()
        }
    }
}

impl From<&str> for PdfString {
    fn from(s: &str) -> Self {
        Self::literal(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for PdfString {
    fn from(bytes: &[u8]) -> Self {
        Self::literal(bytes.to_vec())
    }
}

impl fmt::Display for PdfString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}
