//! # clredit
//!
//! ECMA-335 CLI/.NET metadata editing library with Edit-and-Continue delta
//! merge support.
//!
//! This crate provides a read/write engine over raw CLR metadata: the
//! relational tables, the four append-only heaps, a generic cursor API for
//! querying and editing rows, and a merge engine that applies EnC delta
//! images onto a base image. It works with raw metadata bytes, making it
//! PE-agnostic and suitable for use with any PE parser.
//!
//! ## Features
//!
//! - Parse BSJB metadata root, stream headers, and all ECMA-335/Portable PDB
//!   tables
//! - Zero-copy heaps and tables, promoted to owned storage on first edit
//! - Generic column reads/writes: constants, simple and coded indices, heap
//!   content
//! - Row insertion with automatic reference shifting and indirection tables
//! - Column re-widening when row counts cross the 2-byte boundary
//! - EnC delta merge with minimal-delta heap rebasing
//!
//! ## Example
//!
//! ```ignore
//! use clredit::{MetadataImage, TableId};
//!
//! // Parse a base image and apply a compiler-emitted EnC delta.
//! let mut base = MetadataImage::parse(&base_bytes)?;
//! let delta = MetadataImage::parse(&delta_bytes)?;
//! base.merge_delta(&delta)?;
//!
//! // Query the result through cursors.
//! let module = base.cursor_at_start(TableId::Module)?;
//! println!("Module: {}", base.read_strings(module, 1, 1)?[0]);
//!
//! // Write the merged image back to bytes.
//! let merged_bytes = base.serialize();
//! ```

pub mod cursor;
pub mod delta;
pub mod editor;
pub mod error;
pub mod heaps;
pub mod image;
pub mod reader;
pub mod root;
pub mod schema;
pub mod stream;
pub mod table;
pub mod writer;

// Re-export main types
pub use cursor::{Cursor, RowRange, Token};
pub use error::{Error, Result};
pub use image::MetadataImage;
pub use root::MetadataRoot;
pub use stream::StreamHeader;
pub use table::{Table, TablesHeader};

// Re-export heaps
pub use heaps::{BlobHeap, Guid, GuidHeap, HeapKind, StringsHeap, UserStringsHeap};

// Re-export schema
pub use schema::{CodedIndexKind, ColumnDesc, ColumnKind, LayoutCtx, TableId, TableLayout};
