//! Error types for clredit.

use crate::schema::TableId;
use thiserror::Error;

/// Result type alias for clredit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing, querying, editing, or merging metadata.
///
/// Variants fall into four kinds: malformed input, invalid argument,
/// capacity failure, and consistency violation. Malformed input is never
/// silently recovered; invalid arguments fail at the call that made the
/// mistake and leave the image unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid BSJB signature (expected 0x424A5342).
    #[error("invalid metadata signature: expected 0x424A5342, got 0x{0:08X}")]
    InvalidSignature(u32),

    /// Unexpected end of data while reading.
    #[error("unexpected end of data at offset {offset}, needed {needed} bytes")]
    UnexpectedEof {
        /// Offset where the read was attempted.
        offset: usize,
        /// Number of bytes needed.
        needed: usize,
    },

    /// Invalid or malformed stream name.
    #[error("invalid stream name at offset {0}")]
    InvalidStreamName(usize),

    /// Stream not found by name.
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    /// Invalid UTF-8 string in #Strings heap.
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidString(usize),

    /// Invalid UTF-16 string in #US heap.
    #[error("invalid UTF-16 string at offset {0}")]
    InvalidUserString(usize),

    /// Invalid compressed integer encoding.
    #[error("invalid compressed integer at offset {0}")]
    InvalidCompressedInt(usize),

    /// Invalid GUID index (out of bounds).
    #[error("invalid GUID index: {0}")]
    InvalidGuidIndex(u32),

    /// Invalid blob data.
    #[error("invalid blob at offset {0}")]
    InvalidBlob(usize),

    /// Invalid table ID.
    #[error("invalid table ID: {0}")]
    InvalidTableId(u8),

    /// Cursor or row index outside `[1, row_count + 1]`.
    #[error("table {table} row {row} out of bounds (row count {count})")]
    RowOutOfBounds {
        /// Table kind.
        table: TableId,
        /// Requested 1-based row.
        row: u32,
        /// Current row count.
        count: u32,
    },

    /// Column index past the table's column count.
    #[error("table {table} has no column {column}")]
    ColumnOutOfBounds {
        /// Table kind.
        table: TableId,
        /// Requested column index.
        column: usize,
    },

    /// A column was read or written with the wrong interpretation.
    #[error("table {table} column {column} is not a {expected} column")]
    ColumnKindMismatch {
        /// Table kind.
        table: TableId,
        /// Column index.
        column: usize,
        /// The interpretation the caller asked for.
        expected: &'static str,
    },

    /// A simple table index was written with a cursor into the wrong table.
    #[error("table {table} column {column} indexes {expected}, got {got}")]
    IndexTargetMismatch {
        /// Table kind being written.
        table: TableId,
        /// Column index.
        column: usize,
        /// Declared target table.
        expected: TableId,
        /// Table of the value that was passed.
        got: TableId,
    },

    /// A value does not fit the column's current storage width.
    #[error("table {table} column {column} is {width} bytes; value {value} does not fit")]
    ValueTooWide {
        /// Table kind.
        table: TableId,
        /// Column index.
        column: usize,
        /// Current storage width in bytes.
        width: usize,
        /// The value that was passed.
        value: u32,
    },

    /// Invalid coded index value (tag has no candidate table).
    #[error("invalid coded index for {kind}: {value}")]
    InvalidCodedIndex {
        /// The kind of coded index.
        kind: &'static str,
        /// The invalid value.
        value: u32,
    },

    /// A coded index was composed from a table not in the candidate set.
    #[error("table {table} is not a candidate of coded index {kind}")]
    CodedIndexTarget {
        /// The kind of coded index.
        kind: &'static str,
        /// The offending table.
        table: TableId,
    },

    /// Allocation failure while growing a heap or table buffer.
    #[error("allocation of {needed} bytes failed")]
    Capacity {
        /// Bytes that could not be reserved.
        needed: usize,
    },

    /// Base and delta images disagree on the tables-stream version.
    #[error("version mismatch: base {base_major}.{base_minor}, delta {delta_major}.{delta_minor}")]
    VersionMismatch {
        /// Base image major version.
        base_major: u8,
        /// Base image minor version.
        base_minor: u8,
        /// Delta image major version.
        delta_major: u8,
        /// Delta image minor version.
        delta_minor: u8,
    },

    /// The EnC map is internally inconsistent.
    #[error("corrupt EnC map: {0}")]
    EncMapCorrupt(String),

    /// The EnC log is internally inconsistent.
    #[error("corrupt EnC log: {0}")]
    EncLogCorrupt(String),

    /// A log entry targeted a row past the append position.
    #[error(
        "table {table} row {row} is neither an existing row nor the append position {expected}"
    )]
    NonAppendInsert {
        /// Table kind.
        table: TableId,
        /// The rid the log entry targeted.
        row: u32,
        /// The only rid at which a new row may be created.
        expected: u32,
    },
}
