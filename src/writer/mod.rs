//! PDF serialization
//!
//! A stateful byte buffer that emits well-formed PDFs: header with binary
//! marker, indirect objects, classical or stream cross-reference sections,
//! and the trailer. Output is deterministic for identical input.

mod xref_stream_writer;

use std::collections::HashSet;

use crate::encryption::StandardSecurityHandler;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, StringFormat};
use crate::parser::document::stream_crypt_filter;
use crate::parser::xref::XRefEntry;

/// Encryption state applied while writing objects.
pub struct EncryptionContext<'a> {
    pub handler: &'a StandardSecurityHandler,
    pub key: &'a [u8],
    /// Objects written without encryption (the Encrypt dictionary itself).
    pub skip: HashSet<ObjectId>,
}

/// Serializer accumulating a PDF into a byte buffer.
pub struct PdfSerializer {
    buffer: Vec<u8>,
}

impl PdfSerializer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Starts from existing file bytes for an incremental update. A missing
    /// final EOL is added so appended content starts on its own line.
    pub fn with_existing(data: Vec<u8>) -> Self {
        let mut buffer = data;
        if !buffer.ends_with(b"\n") {
            buffer.push(b'\n');
        }
        Self { buffer }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes `%PDF-M.m` plus the binary-content marker comment.
    pub fn write_header(&mut self, major: u8, minor: u8) {
        self.buffer
            .extend_from_slice(format!("%PDF-{major}.{minor}\n").as_bytes());
        self.buffer.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
    }

    /// Writes `N G obj ... endobj`, returning the starting offset.
    ///
    /// With an [`EncryptionContext`], strings and stream payloads are
    /// encrypted with the per-object key unless the object is in the skip
    /// set.
    pub fn write_object(
        &mut self,
        id: ObjectId,
        object: &Object,
        encryption: Option<&EncryptionContext<'_>>,
    ) -> Result<u64> {
        let offset = self.buffer.len() as u64;
        let encryption = encryption.filter(|ctx| !ctx.skip.contains(&id));

        self.buffer
            .extend_from_slice(format!("{} {} obj\n", id.number(), id.generation()).as_bytes());

        match object {
            Object::Stream(stream) => {
                let payload = match encryption {
                    Some(ctx) => {
                        let crypt_name = stream_crypt_filter(stream);
                        ctx.handler
                            .encrypt_object(ctx.key, &stream.data, id, true, crypt_name.as_ref())
                            .map_err(PdfError::from)?
                    }
                    None => stream.data.clone(),
                };

                // Length always reflects the bytes actually written.
                let mut dict = stream.dict.clone();
                dict.set("Length", payload.len() as i64);

                write_value(&mut self.buffer, &Object::Dictionary(dict), encryption, id)?;
                self.buffer.extend_from_slice(b"\nstream\n");
                self.buffer.extend_from_slice(&payload);
                self.buffer.extend_from_slice(b"\nendstream");
            }
            other => {
                write_value(&mut self.buffer, other, encryption, id)?;
            }
        }

        self.buffer.extend_from_slice(b"\nendobj\n");
        Ok(offset)
    }

    /// Writes a classical xref section, returning its starting offset for
    /// `startxref`. Entries must be sorted by object number.
    pub fn write_xref_table(&mut self, entries: &[(u32, XRefEntry)]) -> u64 {
        let startxref = self.buffer.len() as u64;
        self.buffer.extend_from_slice(b"xref\n");

        for (first, count) in build_xref_subsections(entries) {
            self.buffer
                .extend_from_slice(format!("{first} {count}\n").as_bytes());
            let range = entries
                .iter()
                .filter(|(number, _)| (first..first + count).contains(number));
            for (_, entry) in range {
                let line = match entry {
                    XRefEntry::InUse { offset, generation } => {
                        format!("{offset:010} {generation:05} n \n")
                    }
                    XRefEntry::Free {
                        next_free,
                        generation,
                    } => format!("{next_free:010} {generation:05} f \n"),
                    XRefEntry::Compressed { .. } => {
                        // Callers materialize compressed objects before
                        // choosing a classical section.
                        format!("{:010} {:05} f \n", 0, 0)
                    }
                };
                self.buffer.extend_from_slice(line.as_bytes());
            }
        }
        startxref
    }

    /// Writes an xref stream object for `entries`, returning its offset.
    pub fn write_xref_stream(
        &mut self,
        id: ObjectId,
        entries: Vec<(u32, XRefEntry)>,
        trailer_base: &Dictionary,
    ) -> Result<u64> {
        xref_stream_writer::write_xref_stream(self, id, entries, trailer_base)
    }

    /// Writes `trailer <<...>> startxref <offset> %%EOF`.
    pub fn write_trailer(&mut self, trailer: &Dictionary, startxref: u64) -> Result<()> {
        self.buffer.extend_from_slice(b"trailer\n");
        write_value(
            &mut self.buffer,
            &Object::Dictionary(trailer.clone()),
            None,
            ObjectId::new(0, 0),
        )?;
        self.buffer.push(b'\n');
        self.write_startxref_eof(startxref);
        Ok(())
    }

    /// Writes the closing `startxref <offset> %%EOF` lines.
    pub fn write_startxref_eof(&mut self, startxref: u64) {
        self.buffer
            .extend_from_slice(format!("startxref\n{startxref}\n%%EOF\n").as_bytes());
    }
}

impl Default for PdfSerializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Groups sorted entries into contiguous `(first, count)` subsections.
pub fn build_xref_subsections(entries: &[(u32, XRefEntry)]) -> Vec<(u32, u32)> {
    let mut subsections: Vec<(u32, u32)> = Vec::new();
    for &(number, _) in entries {
        match subsections.last_mut() {
            Some((first, count)) if *first + *count == number => *count += 1,
            _ => subsections.push((number, 1)),
        }
    }
    subsections
}

fn is_regular_name_byte(byte: u8) -> bool {
    (33..=126).contains(&byte) && byte != b'#' && !crate::parser::lexer::is_delimiter(byte)
}

/// Serializes one object body following the rules of ISO 32000-2
/// Section 7.3. `owner` is the indirect object the value belongs to, used
/// for string encryption.
fn write_value(
    out: &mut Vec<u8>,
    object: &Object,
    encryption: Option<&EncryptionContext<'_>>,
    owner: ObjectId,
) -> Result<()> {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(true) => out.extend_from_slice(b"true"),
        Object::Boolean(false) => out.extend_from_slice(b"false"),
        Object::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
        Object::Real(value) => write_real(out, *value)?,
        Object::String(string) => {
            let bytes = match encryption {
                Some(ctx) => ctx
                    .handler
                    .encrypt_object(ctx.key, string.as_bytes(), owner, false, None)
                    .map_err(PdfError::from)?,
                None => string.as_bytes().to_vec(),
            };
            match string.format() {
                StringFormat::Literal => write_literal_string(out, &bytes),
                StringFormat::Hex => write_hex_string(out, &bytes),
            }
        }
        Object::Name(name) => {
            out.push(b'/');
            for &byte in name.as_bytes() {
                if is_regular_name_byte(byte) {
                    out.push(byte);
                } else {
                    out.extend_from_slice(format!("#{byte:02X}").as_bytes());
                }
            }
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_value(out, item, encryption, owner)?;
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => {
            out.extend_from_slice(b"<<");
            for (key, value) in dict.iter() {
                out.push(b' ');
                write_value(out, &Object::Name(key.clone()), None, owner)?;
                out.push(b' ');
                write_value(out, value, encryption, owner)?;
            }
            out.extend_from_slice(b" >>");
        }
        Object::Reference(id) => {
            out.extend_from_slice(format!("{} {} R", id.number(), id.generation()).as_bytes());
        }
        Object::Stream(_) => {
            return Err(PdfError::Serialization(
                "streams exist only as top-level indirect objects".into(),
            ))
        }
    }
    Ok(())
}

/// Fixed-point real formatting; scientific notation never appears.
fn write_real(out: &mut Vec<u8>, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(PdfError::Serialization(format!(
            "real value {value} is not representable"
        )));
    }
    let mut text = format!("{value:.6}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.push('0');
    }
    out.extend_from_slice(text.as_bytes());
    Ok(())
}

fn write_literal_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0C => out.extend_from_slice(b"\\f"),
            // Three octal digits keep a following digit unambiguous.
            0..=31 | 127..=255 => out.extend_from_slice(format!("\\{byte:03o}").as_bytes()),
            _ => out.push(byte),
        }
    }
    out.push(b')');
}

fn write_hex_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'<');
    for byte in bytes {
        out.extend_from_slice(format!("{byte:02X}").as_bytes());
    }
    out.push(b'>');
}
