//! XRef reconstruction for damaged files
//!
//! When the cross-reference data is missing or unusable, the whole buffer
//! is scanned for `N G obj` headers and an equivalent section is rebuilt.
//! Later definitions of the same object number win, matching the order
//! incremental updates are appended in.

use std::collections::BTreeMap;

use crate::objects::{Dictionary, Object};
use crate::parser::objects::ObjectParser;
use crate::parser::xref::{XRefEntry, XRefKind, XRefSection};
use crate::parser::ParseResult;

/// Rebuilds a single cross-reference section by scanning `data`.
pub fn rebuild_xref(data: &[u8]) -> ParseResult<XRefSection> {
    let mut entries = BTreeMap::new();
    entries.insert(
        0,
        XRefEntry::Free {
            next_free: 0,
            generation: 65535,
        },
    );

    let mut found: Vec<(u32, u16, u64)> = Vec::new();

    let mut position = 0usize;
    while let Some(relative) = find(&data[position..], b"obj") {
        let keyword_at = position + relative;
        position = keyword_at + 3;

        // The keyword must stand alone: delimiter or whitespace on both
        // sides.
        let after = data.get(keyword_at + 3).copied();
        if !after.map_or(true, |b| {
            super::lexer::is_whitespace(b) || super::lexer::is_delimiter(b)
        }) {
            continue;
        }

        if let Some((number, generation, header_start)) = parse_header_before(data, keyword_at) {
            found.push((number, generation, header_start as u64));
        }
    }

    for (number, generation, offset) in found {
        entries.insert(
            number,
            XRefEntry::InUse {
                offset,
                generation,
            },
        );
    }

    let trailer = recover_trailer(data, &entries);
    Ok(XRefSection {
        entries,
        trailer,
        kind: XRefKind::Classical,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Walks backwards from an `obj` keyword over `G` and `N`, returning the
/// offset of the first byte of `N`.
fn parse_header_before(data: &[u8], keyword_at: usize) -> Option<(u32, u16, usize)> {
    let mut cursor = keyword_at;

    let skip_space_back = |mut i: usize| -> Option<usize> {
        let mut moved = false;
        while i > 0 && super::lexer::is_whitespace(data[i - 1]) {
            i -= 1;
            moved = true;
        }
        moved.then_some(i)
    };
    let digits_back = |mut i: usize| -> Option<(usize, u64)> {
        let end = i;
        while i > 0 && data[i - 1].is_ascii_digit() {
            i -= 1;
        }
        if i == end {
            return None;
        }
        let text = std::str::from_utf8(&data[i..end]).ok()?;
        Some((i, text.parse().ok()?))
    };

    cursor = skip_space_back(cursor)?;
    let (generation_start, generation) = digits_back(cursor)?;
    if generation > u16::MAX as u64 {
        return None;
    }

    cursor = skip_space_back(generation_start)?;
    let (number_start, number) = digits_back(cursor)?;
    if number == 0 || number > u32::MAX as u64 {
        return None;
    }

    // The header must start a line or follow a delimiter, not sit inside a
    // longer token.
    if number_start > 0
        && !super::lexer::is_whitespace(data[number_start - 1])
        && !super::lexer::is_delimiter(data[number_start - 1])
    {
        return None;
    }

    Some((number as u32, generation as u16, number_start))
}

/// Finds a usable trailer dictionary: the last `trailer` keyword if any,
/// otherwise a synthesized one pointing at a discovered catalog.
fn recover_trailer(data: &[u8], entries: &BTreeMap<u32, XRefEntry>) -> Dictionary {
    let mut trailer = None;
    let mut position = 0usize;
    while let Some(relative) = find(&data[position..], b"trailer") {
        let keyword_at = position + relative;
        position = keyword_at + 7;

        let mut parser = ObjectParser::at(data, keyword_at + 7);
        if let Ok(Object::Dictionary(dict)) = parser.parse_object() {
            trailer = Some(dict);
        }
    }

    let mut trailer = trailer.unwrap_or_default();
    let size = entries
        .keys()
        .next_back()
        .map(|&number| number as i64 + 1)
        .unwrap_or(1);
    if !trailer.contains_key("Size") {
        trailer.set("Size", size);
    }

    if !trailer.contains_key("Root") {
        // Look for the document catalog among the recovered objects.
        for (&number, entry) in entries {
            let XRefEntry::InUse { offset, generation } = entry else {
                continue;
            };
            let mut parser = ObjectParser::at(data, *offset as usize);
            let Ok((id, object)) = parser.parse_indirect_object(None, None) else {
                continue;
            };
            if id.number() != number || id.generation() != *generation {
                continue;
            }
            if let Some(dict) = object.as_dict() {
                if dict.get_type().is_some_and(|name| *name == "Catalog") {
                    trailer.set("Root", id);
                    break;
                }
            }
        }
    }

    trailer
}
