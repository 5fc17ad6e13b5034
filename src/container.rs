//! Per-container file table (the `container.<n>` blob inside a container folder).
//!
//! ```text
//! u32 version
//! u32 file_count
//! file_count × {
//!     [u8; 128]  filename, UTF-16LE, NUL terminated unless it fills the slot
//!     [u8; 16]   guid            (payload file name)
//!     [u8; 16]   guid_duplicate
//! }
//! ```
//!
//! Entries have a fixed stride.  `file_count` is not checked against the blob
//! length: parsing stops once an entry would start past the end, and the
//! entries that would lie beyond it are dropped rather than emitted empty.
//!
//! A name that fills its slot has no terminator.  When the blob is exactly
//! `8 + file_count × 160` bytes long the terminator search stops at the slot
//! end; otherwise it may continue into the following bytes, which is how a
//! runaway name in a damaged blob is detected.

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::options::ScanOptions;
use crate::primitives::{guid_to_file_name, ByteView, GUID_LEN};

pub const FILENAME_SLOT_LEN:     usize = 128;
/// Stride of one file-table entry: name slot plus two GUIDs.
pub const FILE_ENTRY_LEN:        usize = FILENAME_SLOT_LEN + 2 * GUID_LEN;
const TABLE_HEADER_LEN:          usize = 8;
/// Prefix of the file-table blob's name inside a container folder.
pub const CONTAINER_FILE_PREFIX: &str = "container.";

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FileTableError {
    #[error("file table too small ({size} bytes)")]
    TooSmall { size: usize },
    /// A filename ran past the sanity ceiling without a terminator.
    #[error("filename {} too long, possibly corrupt data", .entry + 1)]
    FilenameOverrun { entry: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerFileRecord {
    pub filename:       Option<String>,
    pub guid:           Option<String>,
    pub guid_duplicate: Option<String>,
}

impl ContainerFileRecord {
    /// On-disk name of this file's payload inside the container folder.
    pub fn file_name(&self) -> Option<String> {
        self.guid.as_deref().map(guid_to_file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerFileTable {
    pub version:    u32,
    pub file_count: u32,
    pub total_size: usize,
    /// `None` when `error` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files:      Option<Vec<ContainerFileRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error:      Option<FileTableError>,
}

impl ContainerFileTable {
    /// Parse a file-table blob.
    ///
    /// Corruption does not produce `Err`: the table is returned with `files`
    /// unset and `error` populated, so the caller still sees the version and
    /// declared count.  `Err` means the blob cannot even hold the header.
    pub fn parse(buf: &[u8], opts: &ScanOptions) -> Result<Self, FileTableError> {
        let view = ByteView::new(buf);
        let too_small = || FileTableError::TooSmall { size: buf.len() };

        let (version, off)        = view.read_u32(0).ok_or_else(too_small)?;
        let (file_count, mut off) = view.read_u32(off).ok_or_else(too_small)?;

        let mut table = Self {
            version,
            file_count,
            total_size: buf.len(),
            files: None,
            error: None,
        };

        let fixed_stride = (file_count as usize)
            .checked_mul(FILE_ENTRY_LEN)
            .and_then(|n| n.checked_add(TABLE_HEADER_LEN))
            == Some(buf.len());

        let mut files = Vec::new();
        for entry in 0..file_count as usize {
            if off >= buf.len() {
                break;
            }

            let search_end = if fixed_stride { off + FILENAME_SLOT_LEN } else { buf.len() };
            let filename = match read_filename(&view, off, search_end, opts.filename_max_units) {
                Some(name) => name,
                None => {
                    let err = FileTableError::FilenameOverrun { entry };
                    warn!(version, file_count, "{err}");
                    table.error = Some(err);
                    return Ok(table);
                }
            };
            off += FILENAME_SLOT_LEN;

            let (mut guid, mut guid_duplicate) = (None, None);
            if view.slice(off, 2 * GUID_LEN).is_some() {
                guid           = view.read_guid(off).map(|(g, _)| g);
                guid_duplicate = view.read_guid(off + GUID_LEN).map(|(g, _)| g);
                off += 2 * GUID_LEN;
            }

            files.push(ContainerFileRecord { filename, guid, guid_duplicate });
        }

        table.files = Some(files);
        Ok(table)
    }

    pub fn files(&self) -> Result<&[ContainerFileRecord], &FileTableError> {
        match (&self.files, &self.error) {
            (_, Some(err))     => Err(err),
            (Some(files), _)   => Ok(files.as_slice()),
            (None, None)       => Ok(&[]),
        }
    }
}

/// Decode the filename slot at `start`.
///
/// The name keeps at most one slot's worth of units.  The terminator search
/// runs up to `search_end`, and a run longer than `max_units` is treated as
/// corruption (`None`).  `Some(None)` is an empty name.
fn read_filename(
    view:       &ByteView<'_>,
    start:      usize,
    search_end: usize,
    max_units:  usize,
) -> Option<Option<String>> {
    let slot_end = start + FILENAME_SLOT_LEN;
    let mut units = Vec::new();
    let mut run = 0usize;
    let mut pos = start;

    while let Some((unit, next)) = view.read_u16(pos).filter(|_| pos < search_end) {
        if unit == 0 {
            break;
        }
        run += 1;
        if run > max_units {
            return None;
        }
        if pos < slot_end {
            units.push(unit);
        }
        pos = next;
    }

    if units.is_empty() {
        return Some(None);
    }
    let name = char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    Some(Some(name))
}
