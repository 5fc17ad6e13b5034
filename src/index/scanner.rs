//! Heuristic container-record scanner for `containers.index`.
//!
//! # How it works
//!
//! The record section has no declared stride and its layout changed between
//! producer versions.  The scanner therefore tries every byte offset from 0 up
//! to `len - min_record_tail` (exclusive) and attempts to read one record at
//! each, keeping the attempts that satisfy the grammar:
//!
//! ```text
//! display_name  utf16 (non-empty)
//! <layout>      see RecordVariant
//! identifier    utf16 starting with 0x or "0x
//! sequence      u8, then 4 reserved bytes
//! guid          16 bytes
//! ```
//!
//! ## Layouts
//!
//! | Variant | After the display name |
//! |---------|------------------------|
//! | `WithDuplicateName` | a second utf16 name (may decode empty), then the identifier |
//! | `WithPadding` | an optional all-zero u32, then the identifier |
//!
//! Variants are tried in that order.  A duplicate-name record can look like a
//! padded record with a garbage identifier, never the other way round.
//!
//! ## False positives
//!
//! A sweep like this rediscovers the same record at spurious offsets inside
//! the tail of a previous record.  Results are deduplicated by GUID, keeping
//! the lowest offset, then ordered by offset.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::options::ScanOptions;
use crate::primitives::{guid_to_file_name, ByteView};

/// Bytes following the identifier: sequence number plus 4 reserved bytes.
const SEQUENCE_FIELD_LEN: usize = 5;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Known field layouts between the display name and the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordVariant {
    WithDuplicateName,
    WithPadding,
}

impl RecordVariant {
    /// Attempt order.
    pub const PRIORITY: [RecordVariant; 2] =
        [RecordVariant::WithDuplicateName, RecordVariant::WithPadding];

    /// Read this layout starting just past the display name.
    ///
    /// Returns the raw identifier (quotes intact) and the offset after it.
    fn read_identifier(
        self,
        view:   &ByteView<'_>,
        offset: usize,
        opts:   &ScanOptions,
    ) -> Option<(String, usize)> {
        let start = match self {
            RecordVariant::WithDuplicateName => view.read_utf16(offset, opts.name_max_units)?.1,
            RecordVariant::WithPadding => match view.read_u32(offset) {
                Some((0, next)) => next,
                _ => offset,
            },
        };
        let (identifier, next) = view.read_utf16(start, opts.name_max_units)?;
        has_hex_prefix(&identifier).then_some((identifier, next))
    }
}

/// One container entry recovered from the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRecord {
    /// Offset the record was found at.  Diagnostic only.
    pub offset:       usize,
    pub display_name: String,
    /// Always starts with `0x`; surrounding quotes are removed.
    pub identifier:   String,
    pub sequence:     u8,
    pub guid:         String,
    pub variant:      RecordVariant,
}

impl ContainerRecord {
    /// Directory holding this container, relative to the index's folder.
    pub fn folder_name(&self) -> String {
        guid_to_file_name(&self.guid)
    }
}

fn has_hex_prefix(s: &str) -> bool {
    s.starts_with("0x") || s.starts_with("\"0x")
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Try to read one record at exactly `offset`.
pub fn parse_record_at(view: &ByteView<'_>, offset: usize, opts: &ScanOptions) -> Option<ContainerRecord> {
    let (display_name, pos) = view.read_utf16(offset, opts.name_max_units)?;
    if display_name.is_empty() {
        return None;
    }

    let (variant, identifier, pos) = RecordVariant::PRIORITY
        .iter()
        .find_map(|&v| v.read_identifier(view, pos, opts).map(|(id, next)| (v, id, next)))?;

    let sequence = view.slice(pos, SEQUENCE_FIELD_LEN)?[0];
    let (guid, _) = view.read_guid(pos + SEQUENCE_FIELD_LEN)?;

    Some(ContainerRecord {
        offset,
        display_name,
        identifier: identifier.replace('"', ""),
        sequence,
        guid,
        variant,
    })
}

/// Recover all container records from an index buffer.
///
/// Never fails: an unrecognisable buffer yields an empty list.
pub fn scan_entries(buf: &[u8], opts: &ScanOptions) -> Vec<ContainerRecord> {
    let view = ByteView::new(buf);
    let end = buf.len().saturating_sub(opts.min_record_tail);

    let found = candidates(&view, end, opts);
    let total = found.len();

    let mut seen = HashSet::new();
    let mut entries: Vec<ContainerRecord> = found
        .into_iter()
        .filter(|r| seen.insert(r.guid.clone()))
        .collect();
    entries.sort_by_key(|r| r.offset);

    debug!(
        offsets = end,
        candidates = total,
        unique = entries.len(),
        "container index scanned"
    );
    entries
}

#[cfg(feature = "parallel")]
fn candidates(view: &ByteView<'_>, end: usize, opts: &ScanOptions) -> Vec<ContainerRecord> {
    use rayon::prelude::*;

    // Indexed collect keeps ascending offset order.
    (0..end)
        .into_par_iter()
        .filter_map(|offset| parse_record_at(view, offset, opts))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn candidates(view: &ByteView<'_>, end: usize, opts: &ScanOptions) -> Vec<ContainerRecord> {
    (0..end)
        .filter_map(|offset| parse_record_at(view, offset, opts))
        .collect()
}
