//! Cross-reference stream decoding (ISO 32000-2 Section 7.5.8)
//!
//! An xref stream encodes entries as fixed-width big-endian records. The
//! `W` array gives the width of the three fields; `Index` names the object
//! ranges covered, defaulting to `[0 Size]`.

use std::collections::BTreeMap;

use crate::objects::{Dictionary, Object};
use crate::parser::xref::XRefEntry;
use crate::parser::{ParseError, ParseResult, Warning, WarningKind};

fn read_field(data: &[u8], width: usize) -> u64 {
    data.iter()
        .take(width)
        .fold(0u64, |acc, &byte| acc << 8 | byte as u64)
}

/// Decodes the records of an xref stream into entries.
pub fn parse_xref_stream_entries(
    dict: &Dictionary,
    data: &[u8],
    strict: bool,
    warnings: &mut Vec<Warning>,
) -> ParseResult<BTreeMap<u32, XRefEntry>> {
    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .ok_or_else(|| ParseError::MissingKey("Size".into()))?;

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .ok_or_else(|| ParseError::MissingKey("W".into()))?
        .iter()
        .map(|value| {
            value
                .as_integer()
                .filter(|w| (0..=8).contains(w))
                .map(|w| w as usize)
                .ok_or_else(|| ParseError::MalformedXRef("bad W array value".into()))
        })
        .collect::<ParseResult<_>>()?;
    if widths.len() != 3 {
        return Err(ParseError::MalformedXRef(format!(
            "W array has {} elements, expected 3",
            widths.len()
        )));
    }
    let record_width: usize = widths.iter().sum();
    if record_width == 0 {
        return Err(ParseError::MalformedXRef("W array is all zero".into()));
    }

    let index: Vec<(u32, u32)> = match dict.get("Index") {
        None => vec![(0, size.max(0) as u32)],
        Some(Object::Array(values)) => {
            if values.len() % 2 != 0 {
                return Err(ParseError::MalformedXRef(
                    "Index array has an odd number of elements".into(),
                ));
            }
            values
                .chunks_exact(2)
                .map(|pair| {
                    match (pair[0].as_integer(), pair[1].as_integer()) {
                        (Some(first), Some(count)) if first >= 0 && count >= 0 => {
                            Ok((first as u32, count as u32))
                        }
                        _ => Err(ParseError::MalformedXRef(
                            "Index array values must be non-negative integers".into(),
                        )),
                    }
                })
                .collect::<ParseResult<_>>()?
        }
        Some(_) => {
            return Err(ParseError::MalformedXRef("Index is not an array".into()))
        }
    };

    let mut entries = BTreeMap::new();
    let mut offset = 0usize;

    'subsections: for (first, count) in index {
        for i in 0..count {
            if offset + record_width > data.len() {
                let message = format!(
                    "xref stream data ends early at object {}",
                    first + i
                );
                if strict {
                    return Err(ParseError::MalformedXRef(message));
                }
                warnings.push(Warning {
                    offset: offset as u64,
                    kind: WarningKind::MalformedXRef,
                    message,
                });
                break 'subsections;
            }

            let record = &data[offset..offset + record_width];
            offset += record_width;

            // A zero-width type field defaults to type 1.
            let entry_type = if widths[0] == 0 {
                1
            } else {
                read_field(record, widths[0])
            };
            let field2 = read_field(&record[widths[0]..], widths[1]);
            let field3 = read_field(&record[widths[0] + widths[1]..], widths[2]);

            let entry = match entry_type {
                0 => XRefEntry::Free {
                    next_free: field2 as u32,
                    generation: field3 as u16,
                },
                1 => XRefEntry::InUse {
                    offset: field2,
                    generation: field3 as u16,
                },
                2 => XRefEntry::Compressed {
                    stream_number: field2 as u32,
                    index: field3 as u32,
                },
                other => {
                    // Unknown types shall be ignored (ISO 32000-2
                    // Section 7.5.8.3).
                    log::warn!("ignoring xref entry of unknown type {other}");
                    continue;
                }
            };
            entries.insert(first + i, entry);
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_dict(size: i64, widths: [i64; 3]) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Size", size);
        dict.set(
            "W",
            widths.iter().map(|&w| Object::Integer(w)).collect::<Vec<_>>(),
        );
        dict
    }

    #[test]
    fn test_decode_basic_entries() {
        let dict = base_dict(3, [1, 2, 1]);
        // free head, in-use at 0x0120 gen 0, compressed in stream 2 index 1
        let data = [
            0u8, 0x00, 0x00, 0xFF, // type 0
            1, 0x01, 0x20, 0x00, // type 1
            2, 0x00, 0x02, 0x01, // type 2
        ];

        let mut warnings = Vec::new();
        let entries = parse_xref_stream_entries(&dict, &data, true, &mut warnings).unwrap();

        assert_eq!(
            entries.get(&0),
            Some(&XRefEntry::Free {
                next_free: 0,
                generation: 0xFF
            })
        );
        assert_eq!(
            entries.get(&1),
            Some(&XRefEntry::InUse {
                offset: 0x120,
                generation: 0
            })
        );
        assert_eq!(
            entries.get(&2),
            Some(&XRefEntry::Compressed {
                stream_number: 2,
                index: 1
            })
        );
    }

    #[test]
    fn test_index_subsections() {
        let mut dict = base_dict(10, [1, 1, 1]);
        dict.set(
            "Index",
            vec![
                Object::Integer(2),
                Object::Integer(1),
                Object::Integer(7),
                Object::Integer(1),
            ],
        );
        let data = [1u8, 10, 0, 1, 20, 0];

        let mut warnings = Vec::new();
        let entries = parse_xref_stream_entries(&dict, &data, true, &mut warnings).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key(&2));
        assert!(entries.contains_key(&7));
    }

    #[test]
    fn test_zero_width_type_defaults_to_in_use() {
        let dict = base_dict(1, [0, 2, 1]);
        let data = [0x02, 0x00, 0x05];

        let mut warnings = Vec::new();
        let entries = parse_xref_stream_entries(&dict, &data, true, &mut warnings).unwrap();
        assert_eq!(
            entries.get(&0),
            Some(&XRefEntry::InUse {
                offset: 0x200,
                generation: 5
            })
        );
    }

    #[test]
    fn test_truncated_data() {
        let dict = base_dict(2, [1, 2, 1]);
        let data = [1u8, 0, 16, 0]; // one record, Size says two

        let mut warnings = Vec::new();
        assert!(parse_xref_stream_entries(&dict, &data, true, &mut warnings).is_err());

        let mut warnings = Vec::new();
        let entries = parse_xref_stream_entries(&dict, &data, false, &mut warnings).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(warnings.len(), 1);
    }
}
