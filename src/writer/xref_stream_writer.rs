//! Cross-reference stream emission (ISO 32000-2 Section 7.5.8)
//!
//! Builds the binary records of an xref stream, choosing field widths that
//! fit the largest offset and generation, and writes the stream as an
//! ordinary in-use object compressed with FlateDecode.

use crate::error::Result;
use crate::objects::{Dictionary, Name, Object, ObjectId, Stream};
use crate::parser::filters::{Codec, FlateCodec};
use crate::parser::xref::XRefEntry;
use crate::parser::ParseError;

use super::{build_xref_subsections, PdfSerializer};

/// Smallest byte width that can hold `value`.
fn bytes_needed(value: u64) -> usize {
    ((64 - value.leading_zeros() as usize).div_ceil(8)).max(1)
}

fn entry_fields(entry: &XRefEntry) -> (u64, u64, u64) {
    match entry {
        XRefEntry::Free {
            next_free,
            generation,
        } => (0, *next_free as u64, *generation as u64),
        XRefEntry::InUse { offset, generation } => (1, *offset, *generation as u64),
        XRefEntry::Compressed {
            stream_number,
            index,
        } => (2, *stream_number as u64, *index as u64),
    }
}

/// Writes `entries` plus the stream's own entry as an xref stream object.
/// Returns the object's offset for `startxref`.
pub fn write_xref_stream(
    serializer: &mut PdfSerializer,
    id: ObjectId,
    mut entries: Vec<(u32, XRefEntry)>,
    trailer_base: &Dictionary,
) -> Result<u64> {
    // The stream indexes itself; its offset is the current buffer position.
    let own_offset = serializer.len() as u64;
    entries.push((
        id.number(),
        XRefEntry::InUse {
            offset: own_offset,
            generation: id.generation(),
        },
    ));
    entries.sort_by_key(|&(number, _)| number);
    entries.dedup_by_key(|&mut (number, _)| number);

    let mut width_2 = 1;
    let mut width_3 = 1;
    for (_, entry) in &entries {
        let (_, field_2, field_3) = entry_fields(entry);
        width_2 = width_2.max(bytes_needed(field_2));
        width_3 = width_3.max(bytes_needed(field_3));
    }

    let mut records = Vec::with_capacity(entries.len() * (1 + width_2 + width_3));
    for (_, entry) in &entries {
        let (entry_type, field_2, field_3) = entry_fields(entry);
        records.push(entry_type as u8);
        records.extend_from_slice(&field_2.to_be_bytes()[8 - width_2..]);
        records.extend_from_slice(&field_3.to_be_bytes()[8 - width_3..]);
    }

    let payload = FlateCodec.encode(&records, None).map_err(ParseError::from)?;

    let size = entries
        .last()
        .map(|&(number, _)| number as i64 + 1)
        .unwrap_or(1);
    let index: Vec<Object> = build_xref_subsections(&entries)
        .into_iter()
        .flat_map(|(first, count)| {
            [Object::Integer(first as i64), Object::Integer(count as i64)]
        })
        .collect();

    let mut dict = Dictionary::new();
    dict.set("Type", Name::from("XRef"));
    dict.set("Size", size);
    dict.set(
        "W",
        vec![
            Object::Integer(1),
            Object::Integer(width_2 as i64),
            Object::Integer(width_3 as i64),
        ],
    );
    dict.set("Index", index);
    dict.set("Filter", Name::from("FlateDecode"));
    for (key, value) in trailer_base.iter() {
        if key.as_bytes() == b"Size" {
            continue;
        }
        dict.set(key.clone(), value.clone());
    }

    // XRef streams are never encrypted.
    let stream = Stream::new(dict, payload);
    let offset = serializer.write_object(id, &Object::Stream(stream), None)?;
    debug_assert_eq!(offset, own_offset);
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::filters::{decode_stream, FilterRegistry};
    use crate::parser::objects::ObjectParser;
    use crate::parser::xref_stream::parse_xref_stream_entries;

    #[test]
    fn test_bytes_needed() {
        assert_eq!(bytes_needed(0), 1);
        assert_eq!(bytes_needed(255), 1);
        assert_eq!(bytes_needed(256), 2);
        assert_eq!(bytes_needed(65535), 2);
        assert_eq!(bytes_needed(65536), 3);
    }

    #[test]
    fn test_round_trip_through_parser() {
        let mut serializer = PdfSerializer::new();
        serializer.write_header(1, 5);

        let entries = vec![
            (
                0,
                XRefEntry::Free {
                    next_free: 0,
                    generation: 65535,
                },
            ),
            (
                1,
                XRefEntry::InUse {
                    offset: 15,
                    generation: 0,
                },
            ),
            (
                2,
                XRefEntry::Compressed {
                    stream_number: 5,
                    index: 3,
                },
            ),
        ];

        let mut trailer = Dictionary::new();
        trailer.set("Root", ObjectId::new(1, 0));
        let stream_id = ObjectId::new(3, 0);
        let offset =
            write_xref_stream(&mut serializer, stream_id, entries, &trailer).unwrap();

        let bytes = serializer.into_bytes();
        let mut parser = ObjectParser::at(&bytes, offset as usize);
        let (parsed_id, object) = parser.parse_indirect_object(None, None).unwrap();
        assert_eq!(parsed_id, stream_id);

        let stream = object.as_stream().unwrap();
        assert_eq!(stream.dict.get_type(), Some(&Name::from("XRef")));

        let registry = FilterRegistry::with_standard_filters();
        let decoded = decode_stream(stream, &registry).unwrap();
        let mut warnings = Vec::new();
        let parsed =
            parse_xref_stream_entries(&stream.dict, &decoded, true, &mut warnings).unwrap();

        assert_eq!(
            parsed.get(&1),
            Some(&XRefEntry::InUse {
                offset: 15,
                generation: 0
            })
        );
        assert_eq!(
            parsed.get(&2),
            Some(&XRefEntry::Compressed {
                stream_number: 5,
                index: 3
            })
        );
        // The stream's own entry points at itself.
        assert_eq!(
            parsed.get(&3),
            Some(&XRefEntry::InUse {
                offset,
                generation: 0
            })
        );
    }
}
