//! # carousel-pdf
//!
//! A low-level reader and writer for the PDF Carousel Object System (COS),
//! the object layer described by ISO 32000-2 Section 7. The crate parses,
//! resolves, decrypts, decodes, and serializes PDF files from 1.0 through
//! 2.0 at the object level; it has no notion of pages, fonts, or rendering.
//!
//! ## Reading
//!
//! ```no_run
//! use carousel_pdf::{Object, PdfDocument};
//!
//! # fn main() -> carousel_pdf::Result<()> {
//! let bytes = std::fs::read("document.pdf").expect("read file");
//! let mut document = PdfDocument::from_bytes(bytes)?;
//!
//! let root = document.trailer().get("Root").cloned().unwrap();
//! let catalog = document.resolve_object(&root)?;
//! if let Some(pages) = catalog.as_dict().and_then(|dict| dict.get("Pages")) {
//!     let page_tree = document.resolve_object(&pages.clone())?;
//!     println!("page tree: {page_tree:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Writing
//!
//! ```no_run
//! use carousel_pdf::{Dictionary, Name, PdfDocument, SaveOptions, XRefStyle};
//!
//! # fn main() -> carousel_pdf::Result<()> {
//! # let bytes: Vec<u8> = Vec::new();
//! let mut document = PdfDocument::from_bytes(bytes)?;
//!
//! let mut marker = Dictionary::new();
//! marker.set("Type", Name::from("Marker"));
//! document.add_object(marker);
//!
//! let saved = document.save(&SaveOptions {
//!     xref_style: XRefStyle::Classical,
//!     incremental: true,
//! })?;
//! # let _ = saved;
//! # Ok(())
//! # }
//! ```

pub mod encryption;
pub mod error;
pub mod objects;
pub mod parser;
pub mod writer;

pub use error::{PdfError, Result};
pub use objects::{Dictionary, Name, Object, ObjectId, PdfString, Stream, StringFormat};
pub use parser::{
    AccessLevel, ParseError, ParseOptions, PdfDocument, SaveOptions, Warning, WarningKind,
    XRefEntry, XRefStyle, XRefTable,
};
pub use writer::PdfSerializer;
