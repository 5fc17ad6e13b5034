//! Bounds-checked reads over an immutable byte buffer.
//!
//! Every read takes an absolute offset and returns `Some((value, next_offset))`
//! or `None`.  A failed read has no side effects, so a caller can always retry
//! at another offset.  The entry scanner depends on this: a mismatch is the
//! normal outcome of most of its attempts, not an error.
//!
//! # GUIDs
//! GUIDs are stored in the Windows in-memory layout: the first three fields
//! (4, 2, 2 bytes) are little-endian, the last 8 bytes are a plain byte run.
//! They are rendered in the canonical hyphenated form, uppercase.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Byte length of an on-disk GUID.
pub const GUID_LEN: usize = 16;

/// FILETIME ticks (100 ns) between 1601-01-01 and 1970-01-01.
pub const FILETIME_UNIX_EPOCH: u64 = 116_444_736_000_000_000;

/// FILETIME ticks per millisecond.
pub const FILETIME_TICKS_PER_MS: i128 = 10_000;

/// Read-only view over a byte buffer with offset-based, non-advancing reads.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    buf: &'a [u8],
}

impl<'a> ByteView<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }

    /// `len` bytes starting at `offset`, or `None` if that runs past the end.
    pub fn slice(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        self.buf.get(offset..end)
    }

    pub fn read_u8(&self, offset: usize) -> Option<(u8, usize)> {
        self.buf.get(offset).map(|&b| (b, offset + 1))
    }

    pub fn read_u16(&self, offset: usize) -> Option<(u16, usize)> {
        self.slice(offset, 2)
            .map(|raw| (LittleEndian::read_u16(raw), offset + 2))
    }

    pub fn read_u32(&self, offset: usize) -> Option<(u32, usize)> {
        self.slice(offset, 4)
            .map(|raw| (LittleEndian::read_u32(raw), offset + 4))
    }

    pub fn read_u64(&self, offset: usize) -> Option<(u64, usize)> {
        self.slice(offset, 8)
            .map(|raw| (LittleEndian::read_u64(raw), offset + 8))
    }

    /// Read a u32 unit count `L` followed by `L` UTF-16LE code units.
    ///
    /// Fails when `L` is zero, exceeds `max_units`, or the string would run
    /// past the end of the buffer.  Embedded NULs are dropped from the result.
    pub fn read_utf16(&self, offset: usize, max_units: usize) -> Option<(String, usize)> {
        let (units, start) = self.read_u32(offset)?;
        let units = units as usize;
        if units == 0 || units > max_units {
            return None;
        }
        let byte_len = units.checked_mul(2)?;
        let raw = self.slice(start, byte_len)?;
        Some((decode_utf16le(raw), start + byte_len))
    }

    /// Read a 16-byte GUID and render it as `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.
    pub fn read_guid(&self, offset: usize) -> Option<(String, usize)> {
        let raw = self.slice(offset, GUID_LEN)?;
        let mut bytes = [0u8; GUID_LEN];
        bytes.copy_from_slice(raw);
        Some((format_guid(&bytes), offset + GUID_LEN))
    }
}

/// Decode UTF-16LE code units, replacing unpaired surrogates and dropping NULs.
pub fn decode_utf16le(raw: &[u8]) -> String {
    let units = raw.chunks_exact(2).map(LittleEndian::read_u16);
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .filter(|&c| c != '\0')
        .collect()
}

/// Render on-disk GUID bytes in canonical uppercase text form.
pub fn format_guid(bytes: &[u8; GUID_LEN]) -> String {
    let mut buf = Uuid::encode_buffer();
    Uuid::from_bytes_le(*bytes)
        .hyphenated()
        .encode_upper(&mut buf)
        .to_owned()
}

/// Inverse of [`format_guid`]: recover the on-disk bytes from the text form.
pub fn parse_guid(text: &str) -> Option<[u8; GUID_LEN]> {
    Uuid::parse_str(text).ok().map(|u| u.to_bytes_le())
}

/// Name of the directory or file that stores the object with this GUID.
pub fn guid_to_file_name(guid: &str) -> String {
    guid.replace('-', "").to_uppercase()
}

/// Convert a Windows FILETIME to a UTC instant with millisecond precision.
///
/// Ticks before the Unix epoch yield instants before 1970; integer division
/// truncates toward zero.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    let ms = (filetime as i128 - FILETIME_UNIX_EPOCH as i128) / FILETIME_TICKS_PER_MS;
    let ms = i64::try_from(ms).ok()?;
    Utc.timestamp_millis_opt(ms).single()
}
