//! Change-notification buffer decoding.
//!
//! The OS fills a caller-supplied buffer with variable-length records laid
//! end to end:
//!
//! ```text
//! offset  size  field
//! 0       4     next_entry_offset   (0 = last record)
//! 4       4     action
//! 8       4     name_length         (bytes)
//! 12      n     name                (UTF-16LE, native separators)
//! ```
//!
//! All integers are little-endian. [`ChangeDecoder`] walks the buffer with
//! a bounds-checked cursor and yields one owned [`ChangeRecord`] at a time.
//! [`RecordWriter`] produces the same layout for change sources that do not
//! get it from the OS.

use crate::path::ROOT;
use std::path::MAIN_SEPARATOR;
use thiserror::Error;

/// Size of the fixed record header.
pub const HEADER_LEN: usize = 12;

/// Size of the smallest record carrying a name: one UTF-16 unit, padded to
/// the 4-byte record alignment.
pub const MIN_RECORD_LEN: usize = HEADER_LEN + 4;

/// Native action codes.
pub mod action {
    pub const ADDED: u32 = 1;
    pub const REMOVED: u32 = 2;
    pub const MODIFIED: u32 = 3;
    pub const RENAMED_OLD_NAME: u32 = 4;
    pub const RENAMED_NEW_NAME: u32 = 5;
}

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Created,
    Removed,
    RenamedFrom,
    RenamedTo,
    Modified,
    /// Any code this decoder does not recognise.
    Unknown(u32),
}

impl ChangeAction {
    /// Maps a native action code.
    pub fn from_code(code: u32) -> Self {
        match code {
            action::ADDED => ChangeAction::Created,
            action::REMOVED => ChangeAction::Removed,
            action::MODIFIED => ChangeAction::Modified,
            action::RENAMED_OLD_NAME => ChangeAction::RenamedFrom,
            action::RENAMED_NEW_NAME => ChangeAction::RenamedTo,
            other => ChangeAction::Unknown(other),
        }
    }

    /// The native action code.
    pub fn code(self) -> u32 {
        match self {
            ChangeAction::Created => action::ADDED,
            ChangeAction::Removed => action::REMOVED,
            ChangeAction::Modified => action::MODIFIED,
            ChangeAction::RenamedFrom => action::RENAMED_OLD_NAME,
            ChangeAction::RenamedTo => action::RENAMED_NEW_NAME,
            ChangeAction::Unknown(code) => code,
        }
    }
}

/// One decoded change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub action: ChangeAction,
    /// Absolute virtual path, `/`-separated.
    pub path: String,
}

/// A malformed record; the rest of the buffer is abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record header at offset {offset} exceeds buffer of {len} bytes")]
    TruncatedHeader { offset: usize, len: usize },

    #[error("name of {name_len} bytes at offset {offset} exceeds buffer of {len} bytes")]
    TruncatedName {
        offset: usize,
        name_len: usize,
        len: usize,
    },

    #[error("odd name length {name_len} at offset {offset}")]
    OddNameLength { offset: usize, name_len: usize },

    #[error("next entry offset {next} at offset {offset} does not advance past the header")]
    BadNextOffset { offset: usize, next: usize },
}

/// Lazy, bounds-checked iterator over one raw change buffer.
///
/// Records with an empty name are skipped. After the terminating record or
/// the first [`DecodeError`] the iterator is exhausted.
#[derive(Debug)]
pub struct ChangeDecoder<'a> {
    buf: &'a [u8],
    offset: Option<usize>,
}

impl<'a> ChangeDecoder<'a> {
    /// Starts decoding at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        let offset = if buf.is_empty() { None } else { Some(0) };
        Self { buf, offset }
    }

    fn read_u32(&self, at: usize) -> u32 {
        let bytes = [
            self.buf[at],
            self.buf[at + 1],
            self.buf[at + 2],
            self.buf[at + 3],
        ];
        u32::from_le_bytes(bytes)
    }

    fn decode_at(&self, offset: usize) -> Result<(Option<ChangeRecord>, Option<usize>), DecodeError> {
        let len = self.buf.len();
        if offset.checked_add(HEADER_LEN).is_none_or(|end| end > len) {
            return Err(DecodeError::TruncatedHeader { offset, len });
        }

        let next = self.read_u32(offset) as usize;
        let code = self.read_u32(offset + 4);
        let name_len = self.read_u32(offset + 8) as usize;

        let name_start = offset + HEADER_LEN;
        if name_start.checked_add(name_len).is_none_or(|end| end > len) {
            return Err(DecodeError::TruncatedName {
                offset,
                name_len,
                len,
            });
        }
        if name_len % 2 != 0 {
            return Err(DecodeError::OddNameLength { offset, name_len });
        }
        if next != 0 && next < HEADER_LEN {
            return Err(DecodeError::BadNextOffset { offset, next });
        }

        let record = (name_len > 0).then(|| ChangeRecord {
            action: ChangeAction::from_code(code),
            path: virtual_path(&self.buf[name_start..name_start + name_len]),
        });
        let following = if next == 0 {
            None
        } else {
            Some(offset.checked_add(next).ok_or(DecodeError::BadNextOffset { offset, next })?)
        };
        Ok((record, following))
    }
}

impl Iterator for ChangeDecoder<'_> {
    type Item = Result<ChangeRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(offset) = self.offset {
            match self.decode_at(offset) {
                Ok((record, following)) => {
                    self.offset = following;
                    if let Some(record) = record {
                        return Some(Ok(record));
                    }
                }
                Err(e) => {
                    self.offset = None;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

impl std::iter::FusedIterator for ChangeDecoder<'_> {}

/// Decodes a UTF-16LE native name into an absolute virtual path.
fn virtual_path(name: &[u8]) -> String {
    let units: Vec<u16> = name
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let decoded = String::from_utf16_lossy(&units);
    let relative = if MAIN_SEPARATOR == '/' {
        decoded
    } else {
        decoded.replace(MAIN_SEPARATOR, "/")
    };
    format!("{ROOT}{}", relative.trim_start_matches('/'))
}

/// Encodes records in the native layout into a fixed-size buffer.
///
/// Used by change sources that receive events from a higher-level API and
/// by tests.
#[derive(Debug)]
pub struct RecordWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    last: Option<usize>,
}

impl<'a> RecordWriter<'a> {
    /// Writes into `buf` from the start.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            len: 0,
            last: None,
        }
    }

    /// Appends a record for `name`, a root-relative native path.
    ///
    /// Returns `false` without writing anything when the record does not fit.
    pub fn push(&mut self, action: u32, name: &str) -> bool {
        let units: Vec<u16> = name.encode_utf16().collect();
        let name_len = units.len() * 2;
        // records stay 4-byte aligned like the OS-produced ones
        let record_len = (HEADER_LEN + name_len).next_multiple_of(4);
        let Some(end) = self.len.checked_add(record_len) else {
            return false;
        };
        if end > self.buf.len() {
            return false;
        }
        let Ok(name_len_u32) = u32::try_from(name_len) else {
            return false;
        };

        let start = self.len;
        let record = &mut self.buf[start..end];
        record.fill(0);
        record[4..8].copy_from_slice(&action.to_le_bytes());
        record[8..12].copy_from_slice(&name_len_u32.to_le_bytes());
        for (i, unit) in units.iter().enumerate() {
            let at = HEADER_LEN + i * 2;
            record[at..at + 2].copy_from_slice(&unit.to_le_bytes());
        }

        if let Some(prev) = self.last {
            // record_len of the previous entry always fits in u32
            let next = u32::try_from(start - prev).unwrap_or(0);
            self.buf[prev..prev + 4].copy_from_slice(&next.to_le_bytes());
        }
        self.last = Some(start);
        self.len = end;
        true
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no record has been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
