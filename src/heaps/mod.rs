//! Metadata heaps: #Strings, #US, #GUID, #Blob.
//!
//! All four heaps are append-only; offset/index 0 is the reserved null entry.
//! Parsed heaps borrow the input buffer and are promoted to owned storage on
//! the first mutation.

mod blob;
mod guid;
mod strings;
mod us;

pub use blob::BlobHeap;
pub use guid::{Guid, GuidHeap};
pub use strings::StringsHeap;
pub use us::UserStringsHeap;

/// The four heap kinds a table column can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapKind {
    /// #Strings: null-terminated UTF-8.
    String,
    /// #Blob: compressed-length-prefixed bytes.
    Blob,
    /// #GUID: fixed 16-byte records, 1-based index.
    Guid,
    /// #US: compressed-length-prefixed UTF-16LE.
    UserString,
}
