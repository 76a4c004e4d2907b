//! End-to-end encryption tests: documents encrypted with the standard
//! security handler, opened with user and owner passwords, and re-saved.

use std::collections::HashSet;
use std::sync::Arc;

use carousel_pdf::encryption::{
    build_standard_encryption, CryptProvider, EncryptionSetup, Permissions,
    StandardCryptProvider,
};
use carousel_pdf::objects::{Dictionary, Name, Object, ObjectId, PdfString, Stream};
use carousel_pdf::writer::EncryptionContext;
use carousel_pdf::{
    AccessLevel, PdfDocument, PdfError, PdfSerializer, SaveOptions, XRefEntry, XRefStyle,
};

const SECRET_NOTE: &[u8] = b"top secret note";
const SECRET_STREAM: &[u8] = b"confidential stream data";
const FILE_ID: &[u8] = b"0123456789abcdef";

fn provider() -> Arc<dyn CryptProvider> {
    Arc::new(StandardCryptProvider)
}

/// Print and extract allowed, everything else prohibited.
fn limited_permissions() -> Permissions {
    Permissions::from_p(-3884)
}

/// Builds an encrypted document: catalog, page tree, a dictionary holding a
/// string, a stream, and the Encrypt dictionary as object 5.
fn encrypted_document(aes: bool, user_password: &[u8], owner_password: &[u8]) -> Vec<u8> {
    let setup = EncryptionSetup {
        aes,
        key_length_bits: 128,
        permissions: limited_permissions(),
    };
    let (handler, encrypt_dict) =
        build_standard_encryption(&setup, user_password, owner_password, FILE_ID, provider())
            .unwrap();
    let key = handler
        .authenticate_user_password(user_password)
        .unwrap()
        .expect("the freshly built U entry must authenticate");

    let encrypt_id = ObjectId::new(5, 0);
    let context = EncryptionContext {
        handler: &handler,
        key: &key,
        skip: HashSet::from([encrypt_id]),
    };

    let mut serializer = PdfSerializer::new();
    serializer.write_header(1, 6);

    let mut entries = vec![(
        0u32,
        XRefEntry::Free {
            next_free: 0,
            generation: 65535,
        },
    )];
    let push = |number: u32, offset: u64, entries: &mut Vec<(u32, XRefEntry)>| {
        entries.push((
            number,
            XRefEntry::InUse {
                offset,
                generation: 0,
            },
        ));
    };

    let mut catalog = Dictionary::new();
    catalog.set("Type", Name::from("Catalog"));
    catalog.set("Pages", ObjectId::new(2, 0));
    let offset = serializer
        .write_object(ObjectId::new(1, 0), &catalog.into(), Some(&context))
        .unwrap();
    push(1, offset, &mut entries);

    let mut pages = Dictionary::new();
    pages.set("Type", Name::from("Pages"));
    pages.set("Kids", Vec::new());
    pages.set("Count", 0);
    let offset = serializer
        .write_object(ObjectId::new(2, 0), &pages.into(), Some(&context))
        .unwrap();
    push(2, offset, &mut entries);

    let mut note = Dictionary::new();
    note.set("Note", PdfString::literal(SECRET_NOTE.to_vec()));
    let offset = serializer
        .write_object(ObjectId::new(3, 0), &note.into(), Some(&context))
        .unwrap();
    push(3, offset, &mut entries);

    let stream = Stream::new(Dictionary::new(), SECRET_STREAM.to_vec());
    let offset = serializer
        .write_object(ObjectId::new(4, 0), &stream.into(), Some(&context))
        .unwrap();
    push(4, offset, &mut entries);

    let offset = serializer
        .write_object(encrypt_id, &encrypt_dict.into(), Some(&context))
        .unwrap();
    push(5, offset, &mut entries);

    let startxref = serializer.write_xref_table(&entries);
    let mut trailer = Dictionary::new();
    trailer.set("Size", 6);
    trailer.set("Root", ObjectId::new(1, 0));
    trailer.set("Encrypt", encrypt_id);
    trailer.set(
        "ID",
        vec![
            Object::String(PdfString::hex(FILE_ID.to_vec())),
            Object::String(PdfString::hex(FILE_ID.to_vec())),
        ],
    );
    serializer.write_trailer(&trailer, startxref).unwrap();
    serializer.into_bytes()
}

#[test]
fn rc4_document_requires_password() {
    let mut document = PdfDocument::from_bytes(encrypted_document(false, b"hello", b"secret"))
        .unwrap();

    assert!(document.is_encrypted());
    assert_eq!(document.access_level(), AccessLevel::None);

    let error = document.resolve(ObjectId::new(3, 0)).unwrap_err();
    assert!(matches!(error, PdfError::Encryption(_)));
}

#[test]
fn rc4_user_password_unlocks_strings_and_streams() {
    let mut document = PdfDocument::from_bytes(encrypted_document(false, b"hello", b"secret"))
        .unwrap();

    assert_eq!(
        document.authenticate(b"hello").unwrap(),
        AccessLevel::User
    );

    let note = document.resolve(ObjectId::new(3, 0)).unwrap();
    assert_eq!(
        note.as_dict()
            .unwrap()
            .get("Note")
            .and_then(Object::as_string)
            .map(|s| s.as_bytes()),
        Some(SECRET_NOTE)
    );

    let payload = document.decoded_stream(ObjectId::new(4, 0)).unwrap();
    assert_eq!(payload, SECRET_STREAM);
}

#[test]
fn wrong_password_is_rejected_and_locks_again() {
    let mut document = PdfDocument::from_bytes(encrypted_document(false, b"hello", b"secret"))
        .unwrap();

    assert_eq!(document.authenticate(b"hello").unwrap(), AccessLevel::User);
    assert!(document.resolve(ObjectId::new(3, 0)).is_ok());

    assert_eq!(document.authenticate(b"wrong").unwrap(), AccessLevel::None);
    assert!(document.resolve(ObjectId::new(3, 0)).is_err());

    // A valid password restores access.
    assert_eq!(document.authenticate(b"hello").unwrap(), AccessLevel::User);
    assert!(document.resolve(ObjectId::new(3, 0)).is_ok());
}

#[test]
fn owner_password_grants_owner_access() {
    let mut document = PdfDocument::from_bytes(encrypted_document(false, b"hello", b"secret"))
        .unwrap();
    assert_eq!(
        document.authenticate(b"secret").unwrap(),
        AccessLevel::Owner
    );
    let note = document.resolve(ObjectId::new(3, 0)).unwrap();
    assert!(note.as_dict().unwrap().contains_key("Note"));
}

#[test]
fn aes_document_round_trips() {
    let mut document = PdfDocument::from_bytes(encrypted_document(true, b"hello", b"secret"))
        .unwrap();

    assert_eq!(document.authenticate(b"hello").unwrap(), AccessLevel::User);

    let note = document.resolve(ObjectId::new(3, 0)).unwrap();
    assert_eq!(
        note.as_dict()
            .unwrap()
            .get("Note")
            .and_then(Object::as_string)
            .map(|s| s.as_bytes()),
        Some(SECRET_NOTE)
    );
    assert_eq!(
        document.decoded_stream(ObjectId::new(4, 0)).unwrap(),
        SECRET_STREAM
    );
}

#[test]
fn aes_rejects_wrong_password() {
    let mut document = PdfDocument::from_bytes(encrypted_document(true, b"hello", b"secret"))
        .unwrap();
    assert_eq!(document.authenticate(b"wrong").unwrap(), AccessLevel::None);
}

#[test]
fn empty_user_password_unlocks_on_open() {
    let mut document =
        PdfDocument::from_bytes(encrypted_document(false, b"", b"secret")).unwrap();

    // Permission-only documents authenticate with the empty password at
    // open time.
    assert_eq!(document.access_level(), AccessLevel::User);
    let note = document.resolve(ObjectId::new(3, 0)).unwrap();
    assert!(note.as_dict().unwrap().contains_key("Note"));
}

#[test]
fn permission_flags_come_from_p_entry() {
    let document = PdfDocument::from_bytes(encrypted_document(false, b"hello", b"secret"))
        .unwrap();
    let flags = document.permissions().unwrap();
    assert!(flags.print);
    assert!(flags.extract);
    assert!(!flags.modify);
    assert!(!flags.annotate);
    assert!(!flags.assemble);
}

#[test]
fn trailer_id_stays_unencrypted() {
    let document = PdfDocument::from_bytes(encrypted_document(false, b"hello", b"secret"))
        .unwrap();
    let id = document
        .trailer()
        .get("ID")
        .and_then(Object::as_array)
        .and_then(|ids| ids.first())
        .and_then(Object::as_string)
        .map(|s| s.as_bytes().to_vec())
        .unwrap();
    assert_eq!(id, FILE_ID);
}

#[test]
fn encrypted_document_resaves_and_reopens() {
    let mut document = PdfDocument::from_bytes(encrypted_document(true, b"hello", b"secret"))
        .unwrap();
    assert_eq!(document.authenticate(b"hello").unwrap(), AccessLevel::User);

    let saved = document
        .save(&SaveOptions {
            xref_style: XRefStyle::Classical,
            incremental: false,
        })
        .unwrap();

    let mut reopened = PdfDocument::from_bytes(saved).unwrap();
    assert!(reopened.is_encrypted());
    assert_eq!(reopened.authenticate(b"hello").unwrap(), AccessLevel::User);

    let note = reopened.resolve(ObjectId::new(3, 0)).unwrap();
    assert_eq!(
        note.as_dict()
            .unwrap()
            .get("Note")
            .and_then(Object::as_string)
            .map(|s| s.as_bytes()),
        Some(SECRET_NOTE)
    );
    assert_eq!(
        reopened.decoded_stream(ObjectId::new(4, 0)).unwrap(),
        SECRET_STREAM
    );
}
