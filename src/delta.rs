//! Edit-and-Continue delta merge: heap merging, EnC map resolution, and
//! log replay.

use std::collections::HashMap;

use crate::cursor::{Cursor, Token};
use crate::error::{Error, Result};
use crate::image::MetadataImage;
use crate::schema::{self, ColumnKind, TableId};

/// EnC log function codes.
const FUNC_DEFAULT: u32 = 0;
const FUNC_METHOD_CREATE: u32 = 1;
const FUNC_FIELD_CREATE: u32 = 2;
const FUNC_PARAM_CREATE: u32 = 3;
const FUNC_PROPERTY_CREATE: u32 = 4;
const FUNC_EVENT_CREATE: u32 = 5;

/// Heap offset rebasing for a minimal delta, where the delta heaps are
/// addressed from 0 independent of the base.
#[derive(Debug, Clone, Copy, Default)]
struct HeapBias {
    strings: u32,
    blobs: u32,
}

/// Replay state across log entries: either between operations, or holding
/// the parent half of a two-part create.
#[derive(Debug, Clone, Copy)]
enum MergeState {
    Idle,
    Pending {
        parent: Cursor,
        col: usize,
        child: TableId,
    },
}

/// The EnC map: for each table kind, the base tokens of the delta's rows in
/// delta row order. The i-th entry of a kind's group names delta row i.
struct EncMap {
    groups: HashMap<TableId, Vec<u32>>,
}

impl EncMap {
    /// Build the map from the delta's EncMap table, validating that each
    /// table kind forms one contiguous group.
    fn build(delta: &MetadataImage<'_>) -> Result<Option<Self>> {
        let Some(table) = delta.table(TableId::EncMap) else {
            return Ok(None);
        };
        let mut groups: HashMap<TableId, Vec<u32>> = HashMap::new();
        let mut current: Option<TableId> = None;
        for rid in 1..=table.row_count {
            let raw = table.get(rid, 0)?;
            let kind = Token::from_raw(raw).table()?;
            if current != Some(kind) && groups.contains_key(&kind) {
                return Err(Error::EncMapCorrupt(format!(
                    "table {kind} appears in two non-adjacent groups"
                )));
            }
            groups.entry(kind).or_default().push(raw);
            current = Some(kind);
        }
        Ok(Some(Self { groups }))
    }

    /// Resolve a log token to the physical delta row holding its content.
    fn resolve(map: Option<&Self>, token: Token) -> Result<u32> {
        let Some(map) = map else {
            // No map: the delta's rows are numbered like the base's.
            return Ok(token.rid());
        };
        let kind = token.table()?;
        let position = map
            .groups
            .get(&kind)
            .and_then(|group| group.iter().position(|&raw| raw == token.raw()));
        match position {
            Some(i) => Ok(i as u32 + 1),
            None => Err(Error::EncLogCorrupt(format!(
                "token 0x{:08X} has no EnC map entry",
                token.raw()
            ))),
        }
    }
}

fn create_target(func: u32) -> Option<(TableId, usize, TableId)> {
    match func {
        FUNC_METHOD_CREATE => Some((TableId::TypeDef, 5, TableId::MethodDef)),
        FUNC_FIELD_CREATE => Some((TableId::TypeDef, 4, TableId::Field)),
        FUNC_PARAM_CREATE => Some((TableId::MethodDef, 5, TableId::Param)),
        FUNC_PROPERTY_CREATE => Some((TableId::PropertyMap, 1, TableId::Property)),
        FUNC_EVENT_CREATE => Some((TableId::EventMap, 1, TableId::Event)),
        _ => None,
    }
}

impl<'a> MetadataImage<'a> {
    /// Merge an EnC delta image into this base image.
    ///
    /// Heaps are merged first (wholesale with offset rebasing for a minimal
    /// delta, tail-only otherwise), then the EnC log is replayed entry by
    /// entry. A failed merge may leave the image partially updated; callers
    /// must discard it on error.
    pub fn merge_delta(&mut self, delta: &MetadataImage<'_>) -> Result<()> {
        if self.header.major_version != delta.header.major_version
            || self.header.minor_version != delta.header.minor_version
        {
            return Err(Error::VersionMismatch {
                base_major: self.header.major_version,
                base_minor: self.header.minor_version,
                delta_major: delta.header.major_version,
                delta_minor: delta.header.minor_version,
            });
        }

        let bias = self.merge_heaps(delta)?;
        let map = EncMap::build(delta)?;

        let log_entries = match delta.table(TableId::EncLog) {
            Some(table) => {
                let mut entries = Vec::with_capacity(table.row_count as usize);
                for rid in 1..=table.row_count {
                    entries.push((Token::from_raw(table.get(rid, 0)?), table.get(rid, 1)?));
                }
                entries
            }
            None => Vec::new(),
        };

        let mut state = MergeState::Idle;
        for (token, func) in log_entries {
            state = self.replay_entry(delta, map.as_ref(), bias, state, token, func)?;
        }
        if matches!(state, MergeState::Pending { .. }) {
            return Err(Error::EncLogCorrupt(
                "log ends with an unterminated create operation".to_string(),
            ));
        }
        Ok(())
    }

    fn merge_heaps(&mut self, delta: &MetadataImage<'_>) -> Result<HeapBias> {
        let bias = if delta.is_minimal_delta() {
            // The delta heaps carry only new content addressed from 0; copy
            // them wholesale and rebase copied offsets.
            HeapBias {
                strings: self.strings.append_bytes(delta.strings.data())?,
                blobs: self.blobs.append_bytes(delta.blobs.data())?,
            }
        } else {
            // Cumulative heaps: copy only past the base's current end so
            // every prior offset stays valid as-is.
            let base_len = self.strings.size();
            if delta.strings.data().len() > base_len {
                self.strings.append_bytes(&delta.strings.data()[base_len..])?;
            }
            let base_len = self.blobs.size();
            if delta.blobs.data().len() > base_len {
                self.blobs.append_bytes(&delta.blobs.data()[base_len..])?;
            }
            HeapBias::default()
        };

        if delta.is_minimal_delta() {
            self.user_strings
                .append_bytes(delta.user_strings.data())?;
        } else {
            let base_len = self.user_strings.size();
            if delta.user_strings.data().len() > base_len {
                self.user_strings
                    .append_bytes(&delta.user_strings.data()[base_len..])?;
            }
        }

        // The GUID heap is cumulative across generations even in a minimal
        // delta.
        self.guids.append_tail(delta.guids.data())?;

        self.sync_heap_widths()?;
        Ok(bias)
    }

    fn replay_entry(
        &mut self,
        delta: &MetadataImage<'_>,
        map: Option<&EncMap>,
        bias: HeapBias,
        state: MergeState,
        token: Token,
        func: u32,
    ) -> Result<MergeState> {
        match state {
            MergeState::Idle => {
                if let Some((owner, col, child)) = create_target(func) {
                    let table = token.table()?;
                    if table != owner {
                        return Err(Error::EncLogCorrupt(format!(
                            "create parent 0x{:08X} is a {table}, expected {owner}",
                            token.raw()
                        )));
                    }
                    let rid = token.rid();
                    if rid == 0 || rid > self.row_count(owner) {
                        return Err(Error::EncLogCorrupt(format!(
                            "create parent 0x{:08X} does not exist",
                            token.raw()
                        )));
                    }
                    return Ok(MergeState::Pending {
                        parent: Cursor { table: owner, row: rid },
                        col,
                        child,
                    });
                }
                if func != FUNC_DEFAULT {
                    return Err(Error::EncLogCorrupt(format!(
                        "unknown function code {func}"
                    )));
                }

                let table = token.table()?;
                let rid = token.rid();
                let delta_rid = EncMap::resolve(map, token)?;
                let count = self.row_count(table);
                let cursor = if rid >= 1 && rid <= count {
                    Cursor { table, row: rid }
                } else if rid == count + 1 {
                    self.append_row(table)?
                } else {
                    return Err(Error::NonAppendInsert {
                        table,
                        row: rid,
                        expected: count + 1,
                    });
                };
                self.copy_row(delta, table, delta_rid, cursor, bias)?;
                Ok(MergeState::Idle)
            }
            MergeState::Pending { parent, col, child } => {
                if func != FUNC_DEFAULT {
                    return Err(Error::EncLogCorrupt(
                        "create operation while another is pending".to_string(),
                    ));
                }
                let table = token.table()?;
                if table != child {
                    return Err(Error::EncLogCorrupt(format!(
                        "pending create expected a {child} row, got 0x{:08X}",
                        token.raw()
                    )));
                }
                let delta_rid = EncMap::resolve(map, token)?;
                let cursor = self.splice_into_range(parent, col)?;
                self.copy_row(delta, table, delta_rid, cursor, bias)?;
                Ok(MergeState::Idle)
            }
        }
    }

    /// Copy a delta row's non-list columns onto a base row, rebasing string
    /// and blob offsets for a minimal delta. Widths differ between the two
    /// images; values are moved column by column.
    fn copy_row(
        &mut self,
        delta: &MetadataImage<'_>,
        table: TableId,
        delta_rid: u32,
        dst: Cursor,
        bias: HeapBias,
    ) -> Result<()> {
        let src = delta.table(table).ok_or_else(|| {
            Error::EncLogCorrupt(format!("delta carries no {table} rows"))
        })?;
        if delta_rid == 0 || delta_rid > src.row_count {
            return Err(Error::EncMapCorrupt(format!(
                "{table} map entry {delta_rid} exceeds the delta row count {}",
                src.row_count
            )));
        }

        let list_cols = schema::list_columns(table);
        let mut values = Vec::with_capacity(src.layout.columns.len());
        for (col, desc) in src.layout.columns.iter().enumerate() {
            if list_cols.iter().any(|&(c, _)| c == col) {
                continue;
            }
            let raw = src.get(delta_rid, col)?;
            let value = match desc.kind {
                ColumnKind::Str if raw != 0 => raw + bias.strings,
                ColumnKind::Blob if raw != 0 => raw + bias.blobs,
                _ => raw,
            };
            values.push((col, value));
        }

        let dst_table = self.live_table(dst.table)?;
        for (col, value) in values {
            dst_table.set(dst.row, col, value)?;
        }
        self.recheck_sorted(dst.table, dst.row)?;
        Ok(())
    }
}
