//! Cross-reference resolution
//!
//! Locates and parses cross-reference data according to ISO 32000-2
//! Section 7.5: classical tables, xref streams, hybrid files carrying an
//! `XRefStm`, and chains of incremental updates linked through `Prev`.
//! Sections stack newest-first and merge into one effective map.

use std::collections::{BTreeMap, HashSet};

use crate::objects::{Dictionary, Object};
use crate::parser::filters::FilterRegistry;
use crate::parser::lexer::{Lexer, Token};
use crate::parser::objects::ObjectParser;
use crate::parser::xref_stream::parse_xref_stream_entries;
use crate::parser::{recovery, ParseError, ParseResult, Warning, WarningKind};

/// One entry of a cross-reference section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object; `next_free` links the free list.
    Free { next_free: u32, generation: u16 },
    /// Object stored at a byte offset in the file.
    InUse { offset: u64, generation: u16 },
    /// Object stored inside an object stream (xref-stream type 2).
    Compressed { stream_number: u32, index: u32 },
}

impl XRefEntry {
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } => *generation,
            XRefEntry::InUse { generation, .. } => *generation,
            // Compressed objects always have generation 0.
            XRefEntry::Compressed { .. } => 0,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }
}

/// How a section was stored in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefKind {
    Classical,
    Stream,
}

/// One cross-reference section plus its trailer dictionary.
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub entries: BTreeMap<u32, XRefEntry>,
    pub trailer: Dictionary,
    pub kind: XRefKind,
}

/// The assembled cross-reference state of a document.
#[derive(Debug, Clone)]
pub struct XRefTable {
    /// All sections, newest first.
    sections: Vec<XRefSection>,
    /// Effective map: the first section defining an object wins.
    merged: BTreeMap<u32, XRefEntry>,
    /// Trailer of the most recent section.
    trailer: Dictionary,
    /// Offset the newest section starts at, as named by `startxref`.
    start_offset: u64,
    /// Whether the newest section came from an xref stream.
    kind: XRefKind,
}

impl XRefTable {
    /// Locates and parses all cross-reference data in `data`.
    ///
    /// Recoveries (bad `startxref`, malformed entries) are applied in
    /// lenient mode and recorded in `warnings`; in strict mode they fail
    /// with [`ParseError::MalformedXRef`].
    pub fn parse(
        data: &[u8],
        strict: bool,
        registry: &FilterRegistry,
        warnings: &mut Vec<Warning>,
    ) -> ParseResult<Self> {
        match Self::parse_from_startxref(data, strict, registry, warnings) {
            Ok(table) => Ok(table),
            Err(error) if !strict => {
                log::warn!("xref parsing failed ({error}); rebuilding by full scan");
                warnings.push(Warning {
                    offset: 0,
                    kind: WarningKind::XRefRecovery,
                    message: format!("xref unusable ({error}); rebuilt by scanning for objects"),
                });
                let section = recovery::rebuild_xref(data)?;
                Ok(Self::from_sections(vec![section], 0))
            }
            Err(error) => Err(error),
        }
    }

    fn parse_from_startxref(
        data: &[u8],
        strict: bool,
        registry: &FilterRegistry,
        warnings: &mut Vec<Warning>,
    ) -> ParseResult<Self> {
        let start_offset = Self::find_startxref(data, strict, warnings)?;

        let mut sections = Vec::new();
        let mut visited = HashSet::new();
        let mut next_offset = Some(start_offset);

        while let Some(offset) = next_offset {
            if !visited.insert(offset) {
                warnings.push(Warning {
                    offset,
                    kind: WarningKind::MalformedXRef,
                    message: "Prev chain loops; stopping".into(),
                });
                break;
            }
            if offset as usize >= data.len() {
                return Err(ParseError::MalformedXRef(format!(
                    "xref offset {offset} beyond end of input"
                )));
            }

            let section = Self::parse_section_at(data, offset as usize, strict, registry, warnings)?;

            let prev = section
                .trailer
                .get("Prev")
                .and_then(Object::as_integer)
                .map(|p| p as u64);

            sections.push(section);
            next_offset = prev;
        }

        Ok(Self::from_sections(sections, start_offset))
    }

    fn from_sections(sections: Vec<XRefSection>, start_offset: u64) -> Self {
        let mut merged = BTreeMap::new();
        for section in &sections {
            for (&number, &entry) in &section.entries {
                merged.entry(number).or_insert(entry);
            }
        }
        let trailer = sections
            .first()
            .map(|section| section.trailer.clone())
            .unwrap_or_default();
        let kind = sections
            .first()
            .map(|section| section.kind)
            .unwrap_or(XRefKind::Classical);

        Self {
            sections,
            merged,
            trailer,
            start_offset,
            kind,
        }
    }

    /// Scans the final bytes for `startxref <offset> %%EOF`.
    fn find_startxref(
        data: &[u8],
        strict: bool,
        warnings: &mut Vec<Warning>,
    ) -> ParseResult<u64> {
        let tail_start = data.len().saturating_sub(1024);
        let tail = &data[tail_start..];

        let keyword_at = tail
            .windows(b"startxref".len())
            .rposition(|window| window == b"startxref")
            .ok_or_else(|| ParseError::MalformedXRef("startxref keyword not found".into()))?;

        let mut lexer = Lexer::at(data, tail_start + keyword_at + b"startxref".len());
        let offset = match lexer.next_token()? {
            Token::Integer(offset) if offset >= 0 => offset as u64,
            other => {
                return Err(ParseError::MalformedXRef(format!(
                    "startxref not followed by an offset (found {})",
                    other.describe()
                )))
            }
        };

        lexer.skip_whitespace_and_comments();
        if !data[..lexer.position()].ends_with(b"%%EOF") {
            let message = "missing %%EOF marker after startxref".to_string();
            if strict {
                return Err(ParseError::MalformedXRef(message));
            }
            warnings.push(Warning {
                offset: lexer.position() as u64,
                kind: WarningKind::MalformedXRef,
                message,
            });
        }

        Ok(offset)
    }

    /// Parses one section at `offset`. A classical section carrying an
    /// `XRefStm` is merged with that stream's entries, which take precedence
    /// (ISO 32000-2 Section 7.5.8.4); the classical trailer stays
    /// authoritative.
    fn parse_section_at(
        data: &[u8],
        offset: usize,
        strict: bool,
        registry: &FilterRegistry,
        warnings: &mut Vec<Warning>,
    ) -> ParseResult<XRefSection> {
        let mut lexer = Lexer::at(data, offset);
        lexer.skip_whitespace_and_comments();

        if lexer.peek_bytes(4) == b"xref" {
            let mut section =
                Self::parse_classical_section(data, lexer.position(), strict, warnings)?;

            match section.trailer.get("XRefStm").and_then(Object::as_integer) {
                Some(stm_offset) if stm_offset >= 0 && (stm_offset as usize) < data.len() => {
                    let hybrid = Self::parse_stream_section(
                        data,
                        stm_offset as usize,
                        strict,
                        registry,
                        warnings,
                    )?;
                    for (number, entry) in hybrid.entries {
                        section.entries.insert(number, entry);
                    }
                }
                Some(stm_offset) => {
                    return Err(ParseError::MalformedXRef(format!(
                        "XRefStm offset {stm_offset} out of range"
                    )))
                }
                None => {}
            }
            Ok(section)
        } else {
            Self::parse_stream_section(data, offset, strict, registry, warnings)
        }
    }

    /// Parses `xref` subsections followed by `trailer <<...>>`.
    fn parse_classical_section(
        data: &[u8],
        offset: usize,
        strict: bool,
        warnings: &mut Vec<Warning>,
    ) -> ParseResult<XRefSection> {
        let mut lexer = Lexer::at(data, offset);
        lexer.expect(b"xref")?;

        let mut entries = BTreeMap::new();

        loop {
            lexer.skip_whitespace_and_comments();
            match lexer.peek_token()? {
                Token::Integer(_) => {}
                Token::Trailer => {
                    lexer.next_token()?;
                    break;
                }
                other => {
                    return Err(ParseError::MalformedXRef(format!(
                        "expected subsection header or trailer, found {}",
                        other.describe()
                    )))
                }
            }

            let first = match lexer.next_token()? {
                Token::Integer(first) if first >= 0 => first as u32,
                other => {
                    return Err(ParseError::MalformedXRef(format!(
                        "bad subsection start: {}",
                        other.describe()
                    )))
                }
            };
            let count = match lexer.next_token()? {
                Token::Integer(count) if count >= 0 => count as u32,
                other => {
                    return Err(ParseError::MalformedXRef(format!(
                        "bad subsection count: {}",
                        other.describe()
                    )))
                }
            };

            for i in 0..count {
                // Entries are nominally 20-byte lines; token-wise reading
                // tolerates the 19-byte variants found in the wild.
                let offset_field = match lexer.next_token()? {
                    Token::Integer(value) if value >= 0 => value as u64,
                    other => {
                        return Err(ParseError::MalformedXRef(format!(
                            "bad entry offset for object {}: {}",
                            first + i,
                            other.describe()
                        )))
                    }
                };
                let generation = match lexer.next_token()? {
                    Token::Integer(value) if (0..=u16::MAX as i64).contains(&value) => {
                        value as u16
                    }
                    other => {
                        return Err(ParseError::MalformedXRef(format!(
                            "bad entry generation for object {}: {}",
                            first + i,
                            other.describe()
                        )))
                    }
                };

                lexer.skip_whitespace();
                let entry = match lexer.peek_byte() {
                    Some(b'n') => {
                        lexer.advance(1);
                        XRefEntry::InUse {
                            offset: offset_field,
                            generation,
                        }
                    }
                    Some(b'f') => {
                        lexer.advance(1);
                        XRefEntry::Free {
                            next_free: offset_field as u32,
                            generation,
                        }
                    }
                    _ => {
                        let message = format!(
                            "xref entry for object {} has no n/f flag; treating as in-use",
                            first + i
                        );
                        if strict {
                            return Err(ParseError::MalformedXRef(message));
                        }
                        warnings.push(Warning {
                            offset: lexer.position() as u64,
                            kind: WarningKind::MalformedXRef,
                            message,
                        });
                        XRefEntry::InUse {
                            offset: offset_field,
                            generation,
                        }
                    }
                };
                entries.insert(first + i, entry);
            }
        }

        // The trailer keyword is consumed; its dictionary follows.
        let mut parser = ObjectParser::at(data, lexer.position()).strict(strict);
        let trailer = match parser.parse_object()? {
            Object::Dictionary(dict) => dict,
            other => {
                return Err(ParseError::MalformedXRef(format!(
                    "trailer is not a dictionary: {other:?}"
                )))
            }
        };
        warnings.extend(parser.take_warnings());

        Ok(XRefSection {
            entries,
            trailer,
            kind: XRefKind::Classical,
        })
    }

    /// Parses an xref stream object at `offset`.
    fn parse_stream_section(
        data: &[u8],
        offset: usize,
        strict: bool,
        registry: &FilterRegistry,
        warnings: &mut Vec<Warning>,
    ) -> ParseResult<XRefSection> {
        let mut parser = ObjectParser::at(data, offset).strict(strict);
        let (_, object) = parser.parse_indirect_object(None, None).map_err(|e| {
            ParseError::MalformedXRef(format!("no xref section at offset {offset}: {e}"))
        })?;
        warnings.extend(parser.take_warnings());

        let stream = object
            .as_stream()
            .ok_or_else(|| ParseError::MalformedXRef("xref offset is not a stream".into()))?;

        match stream.dict.get_type() {
            Some(name) if *name == "XRef" => {}
            _ => {
                let message = "xref stream lacks /Type /XRef".to_string();
                if strict {
                    return Err(ParseError::MalformedXRef(message));
                }
                warnings.push(Warning {
                    offset: offset as u64,
                    kind: WarningKind::MalformedXRef,
                    message,
                });
            }
        }

        // XRef streams are never encrypted, so plain filter decoding is
        // always correct here.
        let decoded = super::filters::decode_stream(stream, registry)?;
        let entries = parse_xref_stream_entries(&stream.dict, &decoded, strict, warnings)?;

        Ok(XRefSection {
            entries,
            trailer: stream.dict.clone(),
            kind: XRefKind::Stream,
        })
    }

    /// The entry for `number` in the effective map.
    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.merged.get(&number)
    }

    /// Iterates the effective map in object-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> {
        self.merged.iter().map(|(&number, entry)| (number, entry))
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// The trailer dictionary of the most recent section.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn sections(&self) -> &[XRefSection] {
        &self.sections
    }

    pub fn kind(&self) -> XRefKind {
        self.kind
    }

    /// The `startxref` value the newest section was found through.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// The highest object number in use plus one, falling back to the
    /// trailer's `Size`.
    pub fn next_object_number(&self) -> u32 {
        let from_entries = self
            .merged
            .keys()
            .next_back()
            .map(|&number| number + 1)
            .unwrap_or(1);
        let from_trailer = self
            .trailer
            .get("Size")
            .and_then(Object::as_integer)
            .map(|size| size as u32)
            .unwrap_or(1);
        from_entries.max(from_trailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_XREF: &[u8] = b"xref\n0 3\n0000000000 65535 f \n0000000017 00000 n \n0000000081 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n0\n%%EOF\n";

    #[test]
    fn test_parse_classical_section() {
        let mut warnings = Vec::new();
        let section =
            XRefTable::parse_classical_section(SIMPLE_XREF, 0, true, &mut warnings).unwrap();

        assert_eq!(section.entries.len(), 3);
        assert_eq!(
            section.entries.get(&0),
            Some(&XRefEntry::Free {
                next_free: 0,
                generation: 65535
            })
        );
        assert_eq!(
            section.entries.get(&1),
            Some(&XRefEntry::InUse {
                offset: 17,
                generation: 0
            })
        );
        assert_eq!(
            section.trailer.get("Size").and_then(Object::as_integer),
            Some(3)
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_parse_multiple_subsections() {
        let data = b"xref\n0 1\n0000000000 65535 f \n4 2\n0000000100 00000 n \n0000000200 00001 n \ntrailer\n<< /Size 6 >>\n";
        let mut warnings = Vec::new();
        let section = XRefTable::parse_classical_section(data, 0, true, &mut warnings).unwrap();

        assert_eq!(section.entries.len(), 3);
        assert_eq!(
            section.entries.get(&5),
            Some(&XRefEntry::InUse {
                offset: 200,
                generation: 1
            })
        );
        assert!(!section.entries.contains_key(&2));
    }

    #[test]
    fn test_find_startxref() {
        let mut warnings = Vec::new();
        let offset = XRefTable::find_startxref(SIMPLE_XREF, true, &mut warnings).unwrap();
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_missing_eof_warns_in_lenient_mode() {
        let data = b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 >>\nstartxref\n0\n";
        let mut warnings = Vec::new();
        assert!(XRefTable::find_startxref(data, false, &mut warnings).is_ok());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::MalformedXRef);

        let mut warnings = Vec::new();
        assert!(XRefTable::find_startxref(data, true, &mut warnings).is_err());
    }

    #[test]
    fn test_merge_newest_wins() {
        let mut old_entries = BTreeMap::new();
        old_entries.insert(
            1,
            XRefEntry::InUse {
                offset: 10,
                generation: 0,
            },
        );
        old_entries.insert(
            2,
            XRefEntry::InUse {
                offset: 20,
                generation: 0,
            },
        );
        let mut new_entries = BTreeMap::new();
        new_entries.insert(
            1,
            XRefEntry::InUse {
                offset: 500,
                generation: 0,
            },
        );

        let table = XRefTable::from_sections(
            vec![
                XRefSection {
                    entries: new_entries,
                    trailer: Dictionary::new(),
                    kind: XRefKind::Classical,
                },
                XRefSection {
                    entries: old_entries,
                    trailer: Dictionary::new(),
                    kind: XRefKind::Classical,
                },
            ],
            0,
        );

        assert_eq!(
            table.get(1),
            Some(&XRefEntry::InUse {
                offset: 500,
                generation: 0
            })
        );
        assert_eq!(
            table.get(2),
            Some(&XRefEntry::InUse {
                offset: 20,
                generation: 0
            })
        );
    }
}
