//! Object streams (ISO 32000-2 Section 7.5.7)
//!
//! An object stream packs several non-stream indirect objects into one
//! compressed payload. The decoded payload starts with `N` pairs of
//! integers (object number, byte offset) followed by the object bodies at
//! `First` plus their offsets.

use crate::objects::{Object, ObjectId, Stream};
use crate::parser::filters::{decode_stream, FilterRegistry};
use crate::parser::lexer::{Lexer, Token};
use crate::parser::objects::ObjectParser;
use crate::parser::{ParseError, ParseResult};

/// A decoded object stream ready for slot extraction.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// (object number, offset within the body) per slot.
    slots: Vec<(u32, usize)>,
    /// Decoded payload.
    data: Vec<u8>,
    /// Offset of the first object body within `data`.
    first: usize,
}

impl ObjectStream {
    /// Decodes `stream` and parses its slot table.
    pub fn parse(stream: &Stream, registry: &FilterRegistry) -> ParseResult<Self> {
        match stream.dict.get_type() {
            Some(name) if *name == "ObjStm" => {}
            _ => {
                return Err(ParseError::MalformedStream(
                    "object stream lacks /Type /ObjStm".into(),
                ))
            }
        }

        let count = stream
            .dict
            .get("N")
            .and_then(Object::as_integer)
            .filter(|n| *n >= 0)
            .ok_or_else(|| ParseError::MissingKey("N".into()))?;
        let first = stream
            .dict
            .get("First")
            .and_then(Object::as_integer)
            .filter(|f| *f >= 0)
            .ok_or_else(|| ParseError::MissingKey("First".into()))?
            as usize;

        let data = decode_stream(stream, registry)?;
        if first > data.len() {
            return Err(ParseError::MalformedStream(format!(
                "object stream First {first} beyond payload length {}",
                data.len()
            )));
        }

        let mut slots = Vec::with_capacity(count as usize);
        let mut lexer = Lexer::new(&data[..first]);
        for _ in 0..count {
            let number = match lexer.next_token()? {
                Token::Integer(n) if n >= 0 => n as u32,
                other => {
                    return Err(ParseError::MalformedStream(format!(
                        "bad object number in object stream header: {}",
                        other.describe()
                    )))
                }
            };
            let offset = match lexer.next_token()? {
                Token::Integer(o) if o >= 0 => o as usize,
                other => {
                    return Err(ParseError::MalformedStream(format!(
                        "bad offset in object stream header: {}",
                        other.describe()
                    )))
                }
            };
            slots.push((number, offset));
        }

        Ok(Self { slots, data, first })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The object number stored in slot `index`.
    pub fn object_number_at(&self, index: u32) -> Option<u32> {
        self.slots.get(index as usize).map(|&(number, _)| number)
    }

    /// Extracts the object in slot `index`.
    ///
    /// Compressed objects always have generation 0 and may not themselves
    /// be streams.
    pub fn get(&self, index: u32) -> ParseResult<(ObjectId, Object)> {
        let &(number, offset) = self
            .slots
            .get(index as usize)
            .ok_or_else(|| ParseError::MalformedStream(format!(
                "object stream has no slot {index}"
            )))?;

        let position = self.first + offset;
        if position >= self.data.len() {
            return Err(ParseError::MalformedStream(format!(
                "slot {index} offset {offset} beyond payload"
            )));
        }

        let mut parser = ObjectParser::at(&self.data, position);
        let object = parser.parse_object()?;
        Ok((ObjectId::new(number, 0), object))
    }
}
