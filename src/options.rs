//! Tunable sanity limits for the index and file-table parsers.
//!
//! None of these values are declared by the on-disk format.  They bound how far
//! a parser will follow a length field on corrupt input before giving up.

/// Limits applied while parsing `containers.index` and container file tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Maximum UTF-16 units in the header's package name.
    pub package_name_max_units: usize,
    /// Maximum UTF-16 units in a record's display name, duplicate name and identifier.
    pub name_max_units: usize,
    /// Maximum UTF-16 units in the optional identifier that closes the header.
    pub container_id_max_units: usize,
    /// Unterminated filename run length (in UTF-16 units) treated as corruption.
    pub filename_max_units: usize,
    /// Bytes that must remain after a candidate offset for the scanner to try it.
    pub min_record_tail: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            package_name_max_units: 256,
            name_max_units:         512,
            container_id_max_units: 128,
            filename_max_units:     200,
            min_record_tail:        64,
        }
    }
}
