//! Document instance
//!
//! Ties the cross-reference engine, object parser, filters, and security
//! handler together behind one stateful interface: open bytes, resolve
//! references lazily with memoization, stage edits, and save.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::encryption::{
    EncryptDictionary, EncryptionError, PermissionFlags, StandardSecurityHandler,
};
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Name, Object, ObjectId, Stream};
use crate::parser::filters::{self, FilterRegistry};
use crate::parser::object_stream::ObjectStream;
use crate::parser::objects::ObjectParser;
use crate::parser::xref::{XRefEntry, XRefKind, XRefTable};
use crate::parser::{ParseError, ParseOptions, Warning, WarningKind};
use crate::writer::{EncryptionContext, PdfSerializer};

/// What a password unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    /// Document is encrypted and locked.
    None,
    /// User password accepted; permission flags apply.
    User,
    /// Owner password accepted; full access.
    Owner,
}

/// Which cross-reference form to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefStyle {
    Classical,
    Stream,
    /// Stream when the input used a stream, classical otherwise.
    Auto,
}

/// Options for [`PdfDocument::save`].
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub xref_style: XRefStyle,
    /// Preserve the original bytes and append one update section.
    pub incremental: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            xref_style: XRefStyle::Auto,
            incremental: false,
        }
    }
}

#[derive(Debug, Clone)]
enum Staged {
    Replace(Object),
    Free,
}

/// A parsed PDF document over an in-memory buffer.
pub struct PdfDocument {
    data: Vec<u8>,
    version: (u8, u8),
    xref: XRefTable,
    registry: FilterRegistry,
    options: ParseOptions,
    warnings: Vec<Warning>,

    cache: HashMap<ObjectId, Object>,
    in_flight: HashSet<ObjectId>,
    object_streams: HashMap<u32, ObjectStream>,
    decoded_streams: HashMap<ObjectId, Vec<u8>>,

    security: Option<StandardSecurityHandler>,
    encryption_key: Option<Vec<u8>>,
    encrypt_ref: Option<ObjectId>,
    access: AccessLevel,

    staged: BTreeMap<u32, Staged>,
}

impl PdfDocument {
    /// Opens a document from bytes with default options.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        Self::from_bytes_with_options(data, ParseOptions::default())
    }

    pub fn from_bytes_with_options(
        data: impl Into<Vec<u8>>,
        options: ParseOptions,
    ) -> Result<Self> {
        let data = data.into();
        let mut warnings = Vec::new();

        let version = Self::parse_header(&data, options.strict, &mut warnings)?;

        let registry = FilterRegistry::with_standard_filters();
        let xref = XRefTable::parse(&data, options.strict, &registry, &mut warnings)
            .map_err(PdfError::from)?;

        let mut document = Self {
            data,
            version,
            xref,
            registry,
            options,
            warnings,
            cache: HashMap::new(),
            in_flight: HashSet::new(),
            object_streams: HashMap::new(),
            decoded_streams: HashMap::new(),
            security: None,
            encryption_key: None,
            encrypt_ref: None,
            access: AccessLevel::Owner,
            staged: BTreeMap::new(),
        };

        document.setup_encryption()?;
        Ok(document)
    }

    /// Locates `%PDF-M.m` within the first 1024 bytes.
    fn parse_header(
        data: &[u8],
        strict: bool,
        warnings: &mut Vec<Warning>,
    ) -> Result<(u8, u8)> {
        let window = &data[..data.len().min(1024)];
        let found = window
            .windows(5)
            .position(|candidate| candidate == b"%PDF-")
            .ok_or(ParseError::MalformedHeader)?;

        let rest = &window[found + 5..];
        let (major, minor) = match rest {
            [major @ b'0'..=b'9', b'.', minor @ b'0'..=b'9', ..] => {
                (*major - b'0', *minor - b'0')
            }
            _ => return Err(ParseError::MalformedHeader.into()),
        };

        if found != 0 {
            let message = format!("{found} bytes precede the PDF header");
            if strict {
                return Err(ParseError::MalformedHeader.into());
            }
            warnings.push(Warning {
                offset: 0,
                kind: WarningKind::MalformedHeader,
                message,
            });
        }

        Ok((major, minor))
    }

    /// Sets up the security handler from the trailer's Encrypt entry and
    /// tries the empty user password, the conventional state of
    /// permission-only documents.
    fn setup_encryption(&mut self) -> Result<()> {
        let encrypt_entry = match self.xref.trailer().get("Encrypt") {
            Some(entry) => entry.clone(),
            None => return Ok(()),
        };

        let encrypt_dict = match encrypt_entry {
            Object::Dictionary(dict) => dict,
            Object::Reference(id) => {
                self.encrypt_ref = Some(id);
                let object = self.resolve_raw(id)?;
                object
                    .as_dict()
                    .cloned()
                    .ok_or_else(|| {
                        EncryptionError::MalformedEncryptDictionary(
                            "Encrypt is not a dictionary".into(),
                        )
                    })
                    .map_err(PdfError::from)?
            }
            _ => {
                return Err(EncryptionError::MalformedEncryptDictionary(
                    "Encrypt is neither a dictionary nor a reference".into(),
                )
                .into())
            }
        };

        let file_id = self
            .xref
            .trailer()
            .get("ID")
            .and_then(Object::as_array)
            .and_then(|ids| ids.first())
            .and_then(Object::as_string)
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default();

        let encrypt = EncryptDictionary::from_dict(&encrypt_dict).map_err(PdfError::from)?;
        let handler = StandardSecurityHandler::new(
            encrypt,
            file_id,
            self.options.crypt_provider.clone(),
        )
        .map_err(PdfError::from)?;

        self.security = Some(handler);
        self.access = AccessLevel::None;
        self.authenticate(b"")?;
        Ok(())
    }

    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// The trailer dictionary of the most recent section.
    pub fn trailer(&self) -> &Dictionary {
        self.xref.trailer()
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    /// Iterates the effective cross-reference map, a snapshot per call.
    pub fn xref_entries(&self) -> impl Iterator<Item = (u32, &XRefEntry)> {
        self.xref.iter()
    }

    /// Warnings recorded while opening and resolving.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_encrypted(&self) -> bool {
        self.security.is_some()
    }

    pub fn access_level(&self) -> AccessLevel {
        self.access
    }

    /// Permission flags from the P entry, present only for encrypted
    /// documents.
    pub fn permissions(&self) -> Option<PermissionFlags> {
        self.security
            .as_ref()
            .map(|handler| handler.permissions().flags())
    }

    /// Applies a password, trying the owner path first, then the user path.
    ///
    /// Returns the resulting access level; `AccessLevel::None` means the
    /// password matched neither entry and the document stays locked.
    pub fn authenticate(&mut self, password: &[u8]) -> Result<AccessLevel> {
        let handler = match &self.security {
            Some(handler) => handler,
            None => return Ok(AccessLevel::Owner),
        };

        if let Some(key) = handler
            .authenticate_owner_password(password)
            .map_err(PdfError::from)?
        {
            self.encryption_key = Some(key);
            self.access = AccessLevel::Owner;
        } else if let Some(key) = handler
            .authenticate_user_password(password)
            .map_err(PdfError::from)?
        {
            self.encryption_key = Some(key);
            self.access = AccessLevel::User;
        } else {
            self.encryption_key = None;
            self.access = AccessLevel::None;
        }

        // Any cached plaintext from a previous key is stale either way.
        self.cache.clear();
        self.decoded_streams.clear();
        self.object_streams.clear();

        Ok(self.access)
    }

    /// Resolves a reference to its object.
    ///
    /// Free and absent-but-reserved entries yield `Null`; an unknown object
    /// number is an error. Results are memoized; cycles resolve to a
    /// symbolic reference instead of recursing forever.
    pub fn resolve(&mut self, id: ObjectId) -> Result<Object> {
        if let Some(staged) = self.staged.get(&id.number()) {
            return Ok(match staged {
                Staged::Replace(object) => object.clone(),
                Staged::Free => Object::Null,
            });
        }

        if let Some(object) = self.cache.get(&id) {
            return Ok(object.clone());
        }

        if self.security.is_some() && self.encryption_key.is_none() {
            return Err(if self.access == AccessLevel::None {
                EncryptionError::BadPassword.into()
            } else {
                EncryptionError::EncryptionRequired.into()
            });
        }

        if self.in_flight.contains(&id) {
            return Ok(Object::Reference(id));
        }

        let entry = match self.xref.get(id.number()) {
            Some(entry) => *entry,
            None => return Err(ParseError::UnknownObject(id.number(), id.generation()).into()),
        };

        self.in_flight.insert(id);
        let result = self.resolve_entry(id, entry);
        self.in_flight.remove(&id);

        let object = result?;
        self.cache.insert(id, object.clone());
        Ok(object)
    }

    fn resolve_entry(&mut self, id: ObjectId, entry: XRefEntry) -> Result<Object> {
        match entry {
            XRefEntry::Free { .. } => Ok(Object::Null),
            XRefEntry::InUse { offset, generation } => {
                if generation != id.generation() {
                    return Err(
                        ParseError::UnknownObject(id.number(), id.generation()).into()
                    );
                }
                let mut object = self.parse_at(id, offset)?;
                self.decrypt_resolved(id, &mut object)?;
                Ok(object)
            }
            XRefEntry::Compressed {
                stream_number,
                index,
            } => self.resolve_compressed(id, stream_number, index),
        }
    }

    /// Parses the indirect object for `id` at `offset`, resolving an
    /// indirect stream `Length` through a side lookup that cannot recurse.
    fn parse_at(&mut self, id: ObjectId, offset: u64) -> Result<Object> {
        if offset as usize >= self.data.len() {
            return Err(ParseError::MalformedXRef(format!(
                "object {id} has offset {offset} beyond end of input"
            ))
            .into());
        }

        let data = &self.data;
        let xref = &self.xref;
        let length_cycle = Cell::new(false);
        let mut resolve_length = |length_id: ObjectId| -> Option<i64> {
            if length_id == id {
                length_cycle.set(true);
                return None;
            }
            Self::raw_integer(data, xref, length_id)
        };

        let mut parser = ObjectParser::at(data, offset as usize).strict(self.options.strict);
        let parsed = parser.parse_indirect_object(Some(id), Some(&mut resolve_length));
        let mut new_warnings = parser.take_warnings();

        if length_cycle.get() {
            return Err(ParseError::CircularReference(id.number(), id.generation()).into());
        }

        let (_, object) = parsed?;
        self.warnings.append(&mut new_warnings);
        Ok(object)
    }

    /// Reads a directly stored integer object without touching the cache.
    fn raw_integer(data: &[u8], xref: &XRefTable, id: ObjectId) -> Option<i64> {
        match xref.get(id.number())? {
            XRefEntry::InUse { offset, .. } => {
                let mut parser = ObjectParser::at(data, *offset as usize);
                let (_, object) = parser.parse_indirect_object(Some(id), None).ok()?;
                object.as_integer()
            }
            _ => None,
        }
    }

    /// Raw resolution without decryption, used for the Encrypt dictionary
    /// itself.
    fn resolve_raw(&mut self, id: ObjectId) -> Result<Object> {
        let entry = match self.xref.get(id.number()) {
            Some(entry) => *entry,
            None => return Err(ParseError::UnknownObject(id.number(), id.generation()).into()),
        };
        match entry {
            XRefEntry::InUse { offset, .. } => self.parse_at(id, offset),
            XRefEntry::Free { .. } => Ok(Object::Null),
            XRefEntry::Compressed { .. } => Err(ParseError::MalformedStream(
                "Encrypt dictionary may not live in an object stream".into(),
            )
            .into()),
        }
    }

    fn resolve_compressed(
        &mut self,
        id: ObjectId,
        stream_number: u32,
        index: u32,
    ) -> Result<Object> {
        if id.generation() != 0 {
            return Err(ParseError::UnknownObject(id.number(), id.generation()).into());
        }

        if !self.object_streams.contains_key(&stream_number) {
            let (offset, generation) = match self.xref.get(stream_number) {
                Some(XRefEntry::InUse { offset, generation }) => (*offset, *generation),
                _ => {
                    return Err(ParseError::MalformedXRef(format!(
                        "object stream {stream_number} is not an in-use object"
                    ))
                    .into())
                }
            };
            let container = ObjectId::new(stream_number, generation);
            let mut object = self.parse_at(container, offset)?;
            self.decrypt_resolved(container, &mut object)?;
            let stream = object.as_stream().ok_or_else(|| {
                ParseError::MalformedStream(format!(
                    "object {container} referenced as an object stream is not a stream"
                ))
            })?;
            let parsed = ObjectStream::parse(stream, &self.registry)?;
            self.object_streams.insert(stream_number, parsed);
        }

        let object_stream = &self.object_streams[&stream_number];
        let (slot_id, object) = object_stream.get(index)?;
        if slot_id.number() != id.number() {
            return Err(ParseError::WrongObjectHeader {
                expected: id.to_string(),
                found: slot_id.to_string(),
            }
            .into());
        }
        // Strings inside a compressed object were encrypted (and decrypted)
        // with the container, never individually.
        Ok(object)
    }

    /// Dereferences `object` if it is a reference; other objects pass
    /// through.
    pub fn resolve_object(&mut self, object: &Object) -> Result<Object> {
        match object {
            Object::Reference(id) => self.resolve(*id),
            other => Ok(other.clone()),
        }
    }

    /// The document catalog, resolved through the trailer's Root entry.
    pub fn catalog(&mut self) -> Result<Dictionary> {
        let root = self
            .trailer()
            .get("Root")
            .cloned()
            .ok_or_else(|| ParseError::MissingKey("Root".into()))?;
        self.resolve_object(&root)?
            .as_dict()
            .cloned()
            .ok_or_else(|| {
                PdfError::Parse(ParseError::MalformedDictionary {
                    position: 0,
                    message: "Root does not resolve to a dictionary".into(),
                })
            })
    }

    /// The fully decoded payload of the stream object `id`, cached per
    /// stream.
    pub fn decoded_stream(&mut self, id: ObjectId) -> Result<Vec<u8>> {
        if let Some(data) = self.decoded_streams.get(&id) {
            return Ok(data.clone());
        }

        let object = self.resolve(id)?;
        let stream = object.as_stream().ok_or_else(|| {
            PdfError::Parse(ParseError::MalformedStream(format!(
                "object {id} is not a stream"
            )))
        })?;

        let decoded = filters::decode_stream(stream, &self.registry)?;
        self.decoded_streams.insert(id, decoded.clone());
        Ok(decoded)
    }

    /// Applies string and stream decryption to a freshly parsed object.
    fn decrypt_resolved(&mut self, id: ObjectId, object: &mut Object) -> Result<()> {
        let (Some(handler), Some(key)) = (&self.security, &self.encryption_key) else {
            return Ok(());
        };
        if Some(id) == self.encrypt_ref {
            return Ok(());
        }
        // XRef streams are excluded from encryption by definition.
        if let Object::Stream(stream) = &*object {
            if stream.dict.get_type().is_some_and(|name| *name == "XRef") {
                return Ok(());
            }
        }
        decrypt_tree(handler, key, id, object).map_err(PdfError::from)
    }

    /// Stages a new object and returns its assigned identity.
    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectId {
        let next_staged = self
            .staged
            .keys()
            .next_back()
            .map(|&number| number + 1)
            .unwrap_or(0);
        let number = self.xref.next_object_number().max(next_staged);
        let id = ObjectId::new(number, 0);
        self.staged.insert(number, Staged::Replace(object.into()));
        id
    }

    /// Stages a replacement for an existing object.
    pub fn replace_object(&mut self, id: ObjectId, object: impl Into<Object>) {
        self.staged
            .insert(id.number(), Staged::Replace(object.into()));
        self.cache.remove(&id);
        self.decoded_streams.remove(&id);
    }

    /// Stages freeing an object; it resolves to `Null` from now on.
    pub fn free_object(&mut self, id: ObjectId) {
        self.staged.insert(id.number(), Staged::Free);
        self.cache.remove(&id);
        self.decoded_streams.remove(&id);
    }

    fn resolved_xref_style(&self, style: XRefStyle) -> XRefKind {
        match style {
            XRefStyle::Classical => XRefKind::Classical,
            XRefStyle::Stream => XRefKind::Stream,
            XRefStyle::Auto => self.xref.kind(),
        }
    }

    fn encryption_context(&self) -> Result<Option<EncryptionContext<'_>>> {
        match (&self.security, &self.encryption_key) {
            (Some(handler), Some(key)) => {
                let mut skip = HashSet::new();
                if let Some(encrypt_ref) = self.encrypt_ref {
                    skip.insert(encrypt_ref);
                }
                Ok(Some(EncryptionContext { handler, key, skip }))
            }
            (Some(_), None) => Err(EncryptionError::EncryptionRequired.into()),
            (None, _) => Ok(None),
        }
    }

    /// Serializes the document.
    ///
    /// A full rewrite materializes every live object; an incremental save
    /// keeps the original bytes untouched and appends the staged changes
    /// plus one new cross-reference section.
    pub fn save(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        if options.incremental {
            self.save_incremental(options)
        } else {
            self.save_rewrite(options)
        }
    }

    fn save_rewrite(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        let style = self.resolved_xref_style(options.xref_style);

        // Gather every live object number: the effective map plus staged
        // additions.
        let mut numbers: Vec<u32> = self
            .xref
            .iter()
            .map(|(number, _)| number)
            .filter(|&number| number != 0)
            .chain(self.staged.keys().copied())
            .collect();
        numbers.sort_unstable();
        numbers.dedup();

        let mut serializer = PdfSerializer::new();
        serializer.write_header(self.version.0, self.version.1);

        let mut entries: Vec<(u32, XRefEntry)> = Vec::with_capacity(numbers.len() + 1);
        let mut freed: Vec<(u32, u16)> = Vec::new();
        let mut written: Vec<(u32, XRefEntry)> = Vec::new();

        for &number in &numbers {
            let generation = self
                .xref
                .get(number)
                .map(XRefEntry::generation)
                .unwrap_or(0);

            match self.staged.get(&number).cloned() {
                Some(Staged::Free) => {
                    freed.push((number, generation.saturating_add(1)));
                    continue;
                }
                Some(Staged::Replace(object)) => {
                    let id = ObjectId::new(number, generation);
                    let context = self.encryption_context()?;
                    let offset =
                        serializer.write_object(id, &object, context.as_ref())?;
                    written.push((number, XRefEntry::InUse { offset, generation }));
                }
                None => {
                    let entry = *self.xref.get(number).expect("number came from the map");
                    if entry.is_free() {
                        freed.push((number, entry.generation()));
                        continue;
                    }
                    // Compressed objects are materialized as regular ones.
                    let id = ObjectId::new(number, entry.generation());
                    let object = self.resolve(id)?;
                    if object.is_null() {
                        freed.push((number, entry.generation()));
                        continue;
                    }
                    // Skip container object streams; their members are
                    // written individually.
                    if let Object::Stream(stream) = &object {
                        if stream.dict.get_type().is_some_and(|n| *n == "ObjStm") {
                            freed.push((number, entry.generation()));
                            continue;
                        }
                        if stream.dict.get_type().is_some_and(|n| *n == "XRef") {
                            freed.push((number, entry.generation()));
                            continue;
                        }
                    }
                    let context = self.encryption_context()?;
                    let offset =
                        serializer.write_object(id, &object, context.as_ref())?;
                    written.push((number, XRefEntry::InUse { offset, generation: id.generation() }));
                }
            }
        }

        // The free list: object 0 heads it, chained in ascending order.
        let mut free_chain: Vec<(u32, u16)> = vec![(0, 65535)];
        free_chain.extend(freed);
        for i in 0..free_chain.len() {
            let next = free_chain.get(i + 1).map(|&(number, _)| number).unwrap_or(0);
            let (number, generation) = free_chain[i];
            entries.push((
                number,
                XRefEntry::Free {
                    next_free: next,
                    generation,
                },
            ));
        }
        entries.extend(written);
        entries.sort_by_key(|&(number, _)| number);

        let size = entries.last().map(|&(number, _)| number + 1).unwrap_or(1) as i64;
        let trailer = self.build_clean_trailer(size, None);

        match style {
            XRefKind::Classical => {
                let startxref = serializer.write_xref_table(&entries);
                serializer.write_trailer(&trailer, startxref)?;
            }
            XRefKind::Stream => {
                let stream_number = entries.last().map(|&(n, _)| n + 1).unwrap_or(1);
                let stream_id = ObjectId::new(stream_number, 0);
                let startxref =
                    serializer.write_xref_stream(stream_id, entries, &trailer)?;
                serializer.write_startxref_eof(startxref);
            }
        }

        Ok(serializer.into_bytes())
    }

    fn save_incremental(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        let style = self.resolved_xref_style(options.xref_style);

        let mut serializer = PdfSerializer::with_existing(self.data.clone());

        let staged: Vec<(u32, Staged)> = self
            .staged
            .iter()
            .map(|(&number, staged)| (number, staged.clone()))
            .collect();

        let mut entries: Vec<(u32, XRefEntry)> = Vec::with_capacity(staged.len());
        for (number, staged) in staged {
            let old_generation = self
                .xref
                .get(number)
                .map(XRefEntry::generation)
                .unwrap_or(0);
            match staged {
                Staged::Free => {
                    entries.push((
                        number,
                        XRefEntry::Free {
                            next_free: 0,
                            generation: old_generation.saturating_add(1),
                        },
                    ));
                }
                Staged::Replace(object) => {
                    let id = ObjectId::new(number, old_generation);
                    let context = self.encryption_context()?;
                    let offset = serializer.write_object(id, &object, context.as_ref())?;
                    entries.push((
                        number,
                        XRefEntry::InUse {
                            offset,
                            generation: old_generation,
                        },
                    ));
                }
            }
        }
        entries.sort_by_key(|&(number, _)| number);

        let size = self
            .xref
            .next_object_number()
            .max(entries.last().map(|&(n, _)| n + 1).unwrap_or(1)) as i64;
        let trailer = self.build_clean_trailer(size, Some(self.xref.start_offset() as i64));

        match style {
            XRefKind::Classical => {
                let startxref = serializer.write_xref_table(&entries);
                serializer.write_trailer(&trailer, startxref)?;
            }
            XRefKind::Stream => {
                let stream_number = size as u32;
                let stream_id = ObjectId::new(stream_number, 0);
                let startxref =
                    serializer.write_xref_stream(stream_id, entries, &trailer)?;
                serializer.write_startxref_eof(startxref);
            }
        }

        Ok(serializer.into_bytes())
    }

    /// A trailer carrying only the document-level keys, never the stream
    /// machinery of an xref-stream trailer.
    fn build_clean_trailer(&self, size: i64, prev: Option<i64>) -> Dictionary {
        let mut trailer = Dictionary::new();
        trailer.set("Size", size);
        for key in ["Root", "Info", "Encrypt", "ID"] {
            if let Some(value) = self.xref.trailer().get(key) {
                trailer.set(Name::from(key), value.clone());
            }
        }
        if let Some(prev) = prev {
            trailer.set("Prev", prev);
        }
        trailer
    }
}

/// Recursively decrypts every string and stream payload in `object`.
fn decrypt_tree(
    handler: &StandardSecurityHandler,
    key: &[u8],
    id: ObjectId,
    object: &mut Object,
) -> std::result::Result<(), EncryptionError> {
    match object {
        Object::String(string) => {
            let plain = handler.decrypt_object(key, string.as_bytes(), id, false, None)?;
            string.set_bytes(plain);
        }
        Object::Array(items) => {
            for item in items {
                decrypt_tree(handler, key, id, item)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                decrypt_tree(handler, key, id, value)?;
            }
        }
        Object::Stream(stream) => {
            let crypt_name = stream_crypt_filter(stream);
            let plain =
                handler.decrypt_object(key, &stream.data, id, true, crypt_name.as_ref())?;
            stream.data = plain;
            for (_, value) in stream.dict.iter_mut() {
                decrypt_tree(handler, key, id, value)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// The crypt filter named by a stream's `Crypt` entry, if any.
pub(crate) fn stream_crypt_filter(stream: &Stream) -> Option<Name> {
    let chain = filters::filter_chain(&stream.dict).ok()?;
    chain
        .iter()
        .find(|(name, _)| *name == "Crypt")
        .map(|(_, params)| {
            params
                .as_ref()
                .and_then(|dict| dict.get("Name"))
                .and_then(Object::as_name)
                .cloned()
                .unwrap_or_else(|| Name::from("Identity"))
        })
}
