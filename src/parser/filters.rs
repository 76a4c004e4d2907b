//! PDF stream filters
//!
//! Encoding and decoding of stream payloads according to ISO 32000-2
//! Section 7.4. Codecs live in a registry keyed by filter name; a stream's
//! `Filter` array forms a chain, decoded in array order and encoded in
//! reverse.

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::objects::{Dictionary, Name, Object, Stream};
use crate::parser::{ParseError, ParseResult};

/// Errors raised by stream codecs.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("{filter}: malformed data at {position}: {reason}")]
    Malformed {
        filter: &'static str,
        position: usize,
        reason: String,
    },

    #[error("Unsupported filter: {0}")]
    Unsupported(String),
}

/// A stream codec with symmetric encode/decode entry points.
///
/// `decode` must succeed on any well-formed input; malformed input yields a
/// [`FilterError`]. Parameters come from the matching `DecodeParms` entry.
pub trait Codec {
    fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError>;
    fn encode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError>;
}

/// Registry mapping filter names to codecs.
pub struct FilterRegistry {
    codecs: HashMap<Vec<u8>, Box<dyn Codec>>,
}

impl FilterRegistry {
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// A registry with the standard filters installed.
    pub fn with_standard_filters() -> Self {
        let mut registry = Self::empty();
        registry.register(b"FlateDecode", Box::new(FlateCodec));
        registry.register(b"ASCIIHexDecode", Box::new(AsciiHexCodec));
        registry.register(b"ASCII85Decode", Box::new(Ascii85Codec));
        registry.register(b"RunLengthDecode", Box::new(RunLengthCodec));
        registry.register(b"Crypt", Box::new(CryptCodec));
        registry
    }

    pub fn register(&mut self, name: &[u8], codec: Box<dyn Codec>) {
        self.codecs.insert(name.to_vec(), codec);
    }

    pub fn get(&self, name: &[u8]) -> Option<&dyn Codec> {
        self.codecs.get(name).map(Box::as_ref)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_standard_filters()
    }
}

/// The filter chain of a stream: names paired with their decode parameters.
///
/// `Filter` may be a single name or an array; `DecodeParms` aligns with it
/// positionally, with `null` standing for "no parameters".
pub fn filter_chain(dict: &Dictionary) -> ParseResult<Vec<(Name, Option<Dictionary>)>> {
    let filters: Vec<Name> = match dict.get("Filter") {
        None => return Ok(Vec::new()),
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_name().cloned().ok_or_else(|| {
                    ParseError::MalformedStream("Filter array entry is not a name".into())
                })
            })
            .collect::<ParseResult<_>>()?,
        Some(_) => {
            return Err(ParseError::MalformedStream(
                "Filter is neither a name nor an array".into(),
            ))
        }
    };

    let params_entry = dict.get("DecodeParms").or_else(|| dict.get("DP"));
    let mut params: Vec<Option<Dictionary>> = match params_entry {
        None => vec![None; filters.len()],
        Some(Object::Dictionary(dict)) => vec![Some(dict.clone())],
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| item.as_dict().cloned())
            .collect(),
        Some(_) => vec![None; filters.len()],
    };
    params.resize(filters.len(), None);

    Ok(filters.into_iter().zip(params).collect())
}

/// Decodes a stream payload through its whole filter chain.
///
/// The `Crypt` filter is a pass-through here: decryption happens in the
/// document, which knows the object identity the key is derived from.
pub fn decode_stream(stream: &Stream, registry: &FilterRegistry) -> ParseResult<Vec<u8>> {
    let chain = filter_chain(&stream.dict)?;
    let mut data = stream.data.clone();
    for (name, params) in &chain {
        let codec = registry.get(name.as_bytes()).ok_or_else(|| {
            FilterError::Unsupported(String::from_utf8_lossy(name.as_bytes()).into_owned())
        })?;
        data = codec.decode(&data, params.as_ref())?;
    }
    Ok(data)
}

/// Encodes a payload for a stream dictionary's filter chain. Filters apply
/// in reverse of the `Filter` array so that decoding in array order undoes
/// them.
pub fn encode_data(
    data: &[u8],
    chain: &[(Name, Option<Dictionary>)],
    registry: &FilterRegistry,
) -> ParseResult<Vec<u8>> {
    let mut data = data.to_vec();
    for (name, params) in chain.iter().rev() {
        let codec = registry.get(name.as_bytes()).ok_or_else(|| {
            FilterError::Unsupported(String::from_utf8_lossy(name.as_bytes()).into_owned())
        })?;
        data = codec.encode(&data, params.as_ref())?;
    }
    Ok(data)
}

fn param_usize(params: Option<&Dictionary>, key: &str, default: usize) -> usize {
    params
        .and_then(|dict| dict.get(key))
        .and_then(Object::as_integer)
        .map(|value| value.max(0) as usize)
        .unwrap_or(default)
}

/// FlateDecode: zlib/deflate, optionally with PNG predictors applied
/// row-by-row on bytes.
pub struct FlateCodec;

impl Codec for FlateCodec {
    fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
        let mut decoder = ZlibDecoder::new(data);
        let mut inflated = Vec::new();
        decoder
            .read_to_end(&mut inflated)
            .map_err(|e| FilterError::Malformed {
                filter: "FlateDecode",
                position: 0,
                reason: e.to_string(),
            })?;

        match param_usize(params, "Predictor", 1) {
            1 => Ok(inflated),
            2 => Err(FilterError::Unsupported(
                "FlateDecode TIFF predictor 2".into(),
            )),
            10..=15 => {
                let columns = param_usize(params, "Columns", 1).max(1);
                let colors = param_usize(params, "Colors", 1).max(1);
                let bpc = param_usize(params, "BitsPerComponent", 8).max(1);
                undo_png_prediction(&inflated, columns, colors, bpc)
            }
            other => Err(FilterError::Unsupported(format!(
                "FlateDecode predictor {other}"
            ))),
        }
    }

    fn encode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
        let filtered = match param_usize(params, "Predictor", 1) {
            1 => data.to_vec(),
            2 => {
                return Err(FilterError::Unsupported(
                    "FlateDecode TIFF predictor 2".into(),
                ))
            }
            predictor @ 10..=15 => {
                let columns = param_usize(params, "Columns", 1).max(1);
                let colors = param_usize(params, "Colors", 1).max(1);
                let bpc = param_usize(params, "BitsPerComponent", 8).max(1);
                apply_png_prediction(data, predictor - 10, columns, colors, bpc)?
            }
            other => {
                return Err(FilterError::Unsupported(format!(
                    "FlateDecode predictor {other}"
                )))
            }
        };

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&filtered)
            .and_then(|_| encoder.finish())
            .map_err(|e| FilterError::Malformed {
                filter: "FlateDecode",
                position: 0,
                reason: e.to_string(),
            })
    }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Undoes PNG row filtering (PNG spec Section 9). Each row is prefixed with
/// a filter-type byte. A short final row is decoded as far as it goes.
fn undo_png_prediction(
    filtered: &[u8],
    columns: usize,
    colors: usize,
    bpc: usize,
) -> Result<Vec<u8>, FilterError> {
    let sample_length = (colors * bpc).div_ceil(8).max(1);
    let row_length = sample_length * columns;

    let mut previous = vec![0u8; row_length];
    let mut output = Vec::with_capacity(filtered.len());
    let mut offset = 0;

    while offset < filtered.len() {
        let filter_type = filtered[offset];
        offset += 1;
        let end = (offset + row_length).min(filtered.len());
        let mut row = filtered[offset..end].to_vec();
        offset = end;

        for i in 0..row.len() {
            let left = if i >= sample_length {
                row[i - sample_length]
            } else {
                0
            };
            let up = previous[i];
            let up_left = if i >= sample_length {
                previous[i - sample_length]
            } else {
                0
            };

            row[i] = match filter_type {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(FilterError::Malformed {
                        filter: "FlateDecode",
                        position: offset,
                        reason: format!("row uses unsupported PNG filter {other}"),
                    })
                }
            };
        }

        output.extend_from_slice(&row);
        previous[..row.len()].copy_from_slice(&row);
    }

    Ok(output)
}

/// Applies PNG row filtering with a fixed filter type (`Predictor - 10`).
fn apply_png_prediction(
    data: &[u8],
    filter_type: usize,
    columns: usize,
    colors: usize,
    bpc: usize,
) -> Result<Vec<u8>, FilterError> {
    let sample_length = (colors * bpc).div_ceil(8).max(1);
    let row_length = sample_length * columns;

    // Predictor 15 (optimum) is emitted as Paeth throughout.
    let filter_type = if filter_type == 5 { 4 } else { filter_type };
    if filter_type > 4 {
        return Err(FilterError::Unsupported(format!(
            "PNG filter type {filter_type}"
        )));
    }
    let filter_byte = filter_type as u8;

    let mut previous = vec![0u8; row_length];
    let mut output = Vec::with_capacity(data.len() + data.len() / row_length.max(1) + 1);

    for row in data.chunks(row_length) {
        output.push(filter_byte);
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= sample_length {
                row[i - sample_length]
            } else {
                0
            };
            let up = previous[i];
            let up_left = if i >= sample_length {
                previous[i - sample_length]
            } else {
                0
            };

            let encoded = match filter_byte {
                0 => byte,
                1 => byte.wrapping_sub(left),
                2 => byte.wrapping_sub(up),
                3 => byte.wrapping_sub(((left as u16 + up as u16) / 2) as u8),
                4 => byte.wrapping_sub(paeth(left, up, up_left)),
                _ => unreachable!(),
            };
            output.push(encoded);
        }
        previous[..row.len()].copy_from_slice(row);
    }

    Ok(output)
}

/// ASCIIHexDecode: pairs of hex digits, whitespace ignored, `>` is EOD, an
/// odd digit count behaves as if followed by `0`.
pub struct AsciiHexCodec;

impl Codec for AsciiHexCodec {
    fn decode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
        let mut bytes = Vec::with_capacity(data.len() / 2);
        let mut pending: Option<u8> = None;

        for (position, &byte) in data.iter().enumerate() {
            match byte {
                b'>' => break,
                _ if super::lexer::is_whitespace(byte) => continue,
                _ if byte.is_ascii_hexdigit() => {
                    let digit = (byte as char).to_digit(16).unwrap_or(0) as u8;
                    match pending.take() {
                        Some(high) => bytes.push(high << 4 | digit),
                        None => pending = Some(digit),
                    }
                }
                _ => {
                    return Err(FilterError::Malformed {
                        filter: "ASCIIHexDecode",
                        position,
                        reason: format!("invalid byte 0x{byte:02X}"),
                    })
                }
            }
        }

        if let Some(high) = pending {
            bytes.push(high << 4);
        }
        Ok(bytes)
    }

    fn encode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
        let mut out = Vec::with_capacity(data.len() * 2 + 1);
        for byte in data {
            out.extend_from_slice(format!("{byte:02X}").as_bytes());
        }
        out.push(b'>');
        Ok(out)
    }
}

/// ASCII85Decode: Adobe variant with `~>` EOD, `z` for a zero group, and
/// partial final groups.
pub struct Ascii85Codec;

impl Codec for Ascii85Codec {
    fn decode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
        // An optional <~ opener is produced by some writers.
        let data = data.strip_prefix(b"<~").unwrap_or(data);

        let mut out = Vec::with_capacity(data.len() * 4 / 5);
        let mut group = [0u8; 5];
        let mut count = 0usize;

        let mut position = 0usize;
        while position < data.len() {
            let byte = data[position];
            match byte {
                b'~' => break,
                b'z' if count == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
                b'!'..=b'u' => {
                    group[count] = byte - b'!';
                    count += 1;
                    if count == 5 {
                        let value = group
                            .iter()
                            .fold(0u32, |acc, &digit| acc.wrapping_mul(85).wrapping_add(digit as u32));
                        out.extend_from_slice(&value.to_be_bytes());
                        count = 0;
                    }
                }
                _ if super::lexer::is_whitespace(byte) => {}
                _ => {
                    return Err(FilterError::Malformed {
                        filter: "ASCII85Decode",
                        position,
                        reason: format!("invalid byte 0x{byte:02X}"),
                    })
                }
            }
            position += 1;
        }

        match count {
            0 => {}
            1 => {
                return Err(FilterError::Malformed {
                    filter: "ASCII85Decode",
                    position,
                    reason: "single trailing character in final group".into(),
                })
            }
            _ => {
                // Pad the partial group with the highest digit and keep
                // count - 1 output bytes.
                for slot in group.iter_mut().skip(count) {
                    *slot = 84;
                }
                let value = group
                    .iter()
                    .fold(0u32, |acc, &digit| acc.wrapping_mul(85).wrapping_add(digit as u32));
                out.extend_from_slice(&value.to_be_bytes()[..count - 1]);
            }
        }

        Ok(out)
    }

    fn encode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
        let mut out = Vec::with_capacity(data.len() * 5 / 4 + 2);

        for chunk in data.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            let mut value = u32::from_be_bytes(word);

            let mut digits = [0u8; 5];
            for slot in digits.iter_mut().rev() {
                *slot = (value % 85) as u8 + b'!';
                value /= 85;
            }
            // A partial group of n bytes emits n + 1 characters.
            out.extend_from_slice(&digits[..chunk.len() + 1]);
        }

        out.extend_from_slice(b"~>");
        Ok(out)
    }
}

/// RunLengthDecode: length-prefixed runs, 128 is EOD. Decode-only; run
/// encoding is never produced on write.
pub struct RunLengthCodec;

impl Codec for RunLengthCodec {
    fn decode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
        let mut out = Vec::with_capacity(data.len());
        let mut position = 0usize;

        while position < data.len() {
            let length = data[position];
            position += 1;

            match length {
                0..=127 => {
                    let count = length as usize + 1;
                    if position + count > data.len() {
                        return Err(FilterError::Malformed {
                            filter: "RunLengthDecode",
                            position,
                            reason: "literal run past end of data".into(),
                        });
                    }
                    out.extend_from_slice(&data[position..position + count]);
                    position += count;
                }
                128 => break,
                _ => {
                    let byte = *data.get(position).ok_or(FilterError::Malformed {
                        filter: "RunLengthDecode",
                        position,
                        reason: "repeat run past end of data".into(),
                    })?;
                    out.extend(std::iter::repeat(byte).take(257 - length as usize));
                    position += 1;
                }
            }
        }

        Ok(out)
    }

    fn encode(&self, _data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
        Err(FilterError::Unsupported("RunLengthDecode encoding".into()))
    }
}

/// Crypt: decryption is applied by the document before the chain runs, so
/// the codec itself passes data through unchanged.
pub struct CryptCodec;

impl Codec for CryptCodec {
    fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
        if let Some(name) = params
            .and_then(|dict| dict.get("Name"))
            .and_then(Object::as_name)
        {
            if name.as_bytes() != b"Identity" {
                log::debug!("Crypt filter {name} already applied by the security handler");
            }
        }
        Ok(data.to_vec())
    }

    fn encode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_hex_roundtrip() {
        let codec = AsciiHexCodec;
        let encoded = codec.encode(b"Hello", None).unwrap();
        assert_eq!(encoded, b"48656C6C6F>");
        assert_eq!(codec.decode(&encoded, None).unwrap(), b"Hello");
    }

    #[test]
    fn test_ascii_hex_whitespace_and_odd() {
        let codec = AsciiHexCodec;
        assert_eq!(codec.decode(b"48 65 6C\n6C 6F>", None).unwrap(), b"Hello");
        assert_eq!(codec.decode(b"901FA>", None).unwrap(), vec![0x90, 0x1F, 0xA0]);
    }

    #[test]
    fn test_ascii85_known_values() {
        let codec = Ascii85Codec;
        // "Man" triples from the classic example.
        assert_eq!(codec.encode(b"Man ", None).unwrap(), b"9jqo^~>");
        assert_eq!(codec.decode(b"9jqo^~>", None).unwrap(), b"Man ");
    }

    #[test]
    fn test_ascii85_z_and_partial() {
        let codec = Ascii85Codec;
        assert_eq!(codec.decode(b"z~>", None).unwrap(), vec![0, 0, 0, 0]);
        // Partial group round-trip.
        let encoded = codec.encode(b"Hi", None).unwrap();
        assert_eq!(codec.decode(&encoded, None).unwrap(), b"Hi");
    }

    #[test]
    fn test_ascii85_roundtrip_binary() {
        let codec = Ascii85Codec;
        let data: Vec<u8> = (0u16..600).map(|i| (i % 251) as u8).collect();
        let encoded = codec.encode(&data, None).unwrap();
        assert_eq!(codec.decode(&encoded, None).unwrap(), data);
    }

    #[test]
    fn test_run_length_decode() {
        let codec = RunLengthCodec;
        // Two literals, a repeat of 'a' x3, EOD.
        let data = [1u8, b'x', b'y', 254, b'a', 128];
        assert_eq!(codec.decode(&data, None).unwrap(), b"xyaaa");
    }

    #[test]
    fn test_flate_roundtrip() {
        let codec = FlateCodec;
        let data = b"stream payload stream payload stream payload".to_vec();
        let encoded = codec.encode(&data, None).unwrap();
        assert_eq!(codec.decode(&encoded, None).unwrap(), data);
    }

    #[test]
    fn test_flate_predictor_roundtrip() {
        let codec = FlateCodec;
        let mut params = Dictionary::new();
        params.set("Predictor", 12);
        params.set("Columns", 5);

        let data: Vec<u8> = (0u16..40).map(|i| (i * 7 % 256) as u8).collect();
        let encoded = codec.encode(&data, Some(&params)).unwrap();
        assert_eq!(codec.decode(&encoded, Some(&params)).unwrap(), data);
    }

    #[test]
    fn test_flate_predictor_all_filter_types() {
        for predictor in [10, 11, 12, 13, 14] {
            let codec = FlateCodec;
            let mut params = Dictionary::new();
            params.set("Predictor", predictor as i64);
            params.set("Columns", 4);

            let data: Vec<u8> = (0u16..64).map(|i| (i * 13 % 256) as u8).collect();
            let encoded = codec.encode(&data, Some(&params)).unwrap();
            assert_eq!(
                codec.decode(&encoded, Some(&params)).unwrap(),
                data,
                "predictor {predictor}"
            );
        }
    }

    #[test]
    fn test_tiff_predictor_unsupported() {
        let codec = FlateCodec;
        let mut params = Dictionary::new();
        params.set("Predictor", 2);
        assert!(matches!(
            codec.decode(b"", Some(&params)),
            Err(FilterError::Unsupported(_))
        ));
    }

    #[test]
    fn test_chain_decode() {
        let registry = FilterRegistry::with_standard_filters();

        let payload = b"chained payload".to_vec();
        let flated = FlateCodec.encode(&payload, None).unwrap();
        let wrapped = Ascii85Codec.encode(&flated, None).unwrap();

        let mut dict = Dictionary::new();
        dict.set(
            "Filter",
            vec![
                Object::Name(Name::from("ASCII85Decode")),
                Object::Name(Name::from("FlateDecode")),
            ],
        );
        let stream = Stream::new(dict, wrapped);
        assert_eq!(decode_stream(&stream, &registry).unwrap(), payload);
    }

    #[test]
    fn test_chain_encode_matches_decode() {
        let registry = FilterRegistry::with_standard_filters();
        let chain = vec![
            (Name::from("ASCII85Decode"), None),
            (Name::from("FlateDecode"), None),
        ];
        let payload = b"symmetric chain".to_vec();
        let encoded = encode_data(&payload, &chain, &registry).unwrap();

        let mut dict = Dictionary::new();
        dict.set(
            "Filter",
            vec![
                Object::Name(Name::from("ASCII85Decode")),
                Object::Name(Name::from("FlateDecode")),
            ],
        );
        let stream = Stream::new(dict, encoded);
        assert_eq!(decode_stream(&stream, &registry).unwrap(), payload);
    }

    #[test]
    fn test_unknown_filter() {
        let registry = FilterRegistry::with_standard_filters();
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::Name(Name::from("JBIG2Decode")));
        let stream = Stream::new(dict, vec![1, 2, 3]);
        assert!(decode_stream(&stream, &registry).is_err());
    }
}
