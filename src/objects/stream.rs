use crate::objects::Dictionary;

/// A stream object: a dictionary describing a byte payload.
///
/// `data` holds the payload exactly as it sits in the file, possibly
/// filter-encoded and possibly encrypted. Decoding goes through the filter
/// registry; decryption is handled by the owning document, which knows the
/// object identity the per-object key is derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub dict: Dictionary,
    pub data: Vec<u8>,
}

impl Stream {
    pub fn new(dict: Dictionary, data: Vec<u8>) -> Self {
        Self { dict, data }
    }

    /// Replaces the payload and updates the `Length` entry to match.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.dict.set("Length", data.len() as i64);
        self.data = data;
    }
}
