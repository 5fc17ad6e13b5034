//! `containers.index` decoding.
//!
//! The index opens with a fixed header:
//!
//! | Field           | Encoding                         |
//! |-----------------|----------------------------------|
//! | version         | u32 LE                           |
//! | container_count | u32 LE                           |
//! | unknown         | u32 LE, kept verbatim            |
//! | package_name    | u32 unit count + UTF-16LE        |
//! | timestamp       | u64 LE FILETIME                  |
//! | second_count    | u32 LE                           |
//! | container_id    | u32 unit count + UTF-16LE, optional |
//!
//! The container records that follow are not self-delimiting and come in more
//! than one layout, so they are recovered by the heuristic [`scanner`] rather
//! than read positionally.

pub mod scanner;

#[cfg(test)]
pub(crate) mod fixtures;

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::options::ScanOptions;
use crate::primitives::{filetime_to_datetime, ByteView};

pub use scanner::{scan_entries, ContainerRecord, RecordVariant};

/// File name of the index inside a package's sync folder.
pub const INDEX_FILE_NAME: &str = "containers.index";

/// Fixed fields at the start of an index buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexHeader {
    pub version:         u32,
    pub container_count: u32,
    pub unknown:         u32,
    pub package_name:    String,
    pub raw_timestamp:   u64,
    pub timestamp:       DateTime<Utc>,
    pub second_count:    u32,
    pub container_id:    Option<String>,
}

impl IndexHeader {
    /// Parse the header at offset 0.
    ///
    /// Returns `None` if any required field is missing or out of bounds; a
    /// partially filled header is never produced.  Only the trailing
    /// `container_id` may be absent.
    pub fn parse(buf: &[u8], opts: &ScanOptions) -> Option<Self> {
        let view = ByteView::new(buf);

        let (version, off)         = view.read_u32(0)?;
        let (container_count, off) = view.read_u32(off)?;
        let (unknown, off)         = view.read_u32(off)?;
        let (package_name, off)    = view.read_utf16(off, opts.package_name_max_units)?;
        let (raw_timestamp, off)   = view.read_u64(off)?;
        let timestamp              = filetime_to_datetime(raw_timestamp)?;
        let (second_count, off)    = view.read_u32(off)?;
        let container_id = view
            .read_utf16(off, opts.container_id_max_units)
            .map(|(id, _)| id);

        Some(Self {
            version,
            container_count,
            unknown,
            package_name,
            raw_timestamp,
            timestamp,
            second_count,
            container_id,
        })
    }
}

/// Everything recovered from one index buffer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContainerIndex {
    pub header:  Option<IndexHeader>,
    pub entries: Vec<ContainerRecord>,
}

impl ContainerIndex {
    pub fn parse(buf: &[u8], opts: &ScanOptions) -> Self {
        let header = IndexHeader::parse(buf, opts);
        if header.is_none() {
            debug!(len = buf.len(), "index header not recognised");
        }
        let entries = scan_entries(buf, opts);
        Self { header, entries }
    }

    /// Read and parse the index file at `path`.
    pub fn read_file(path: &Path, opts: &ScanOptions) -> io::Result<Self> {
        let buf = std::fs::read(path)?;
        Ok(Self::parse(&buf, opts))
    }

    pub fn package_name(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.package_name.as_str())
    }
}
