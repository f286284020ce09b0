//! File and volume attributes reported to the host.
//!
//! Ownership is not emulated: every entry reports uid 0, gid 0 and a
//! single link.

use crate::native::DiskSpace;
use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default block size reported by `statfs`.
pub const BLOCK_SIZE: u32 = 4096;

/// Default maximum file-name length reported by `statfs`.
pub const NAME_MAX: u32 = 255;

const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;
const PERM_MASK: u32 = 0o777;

/// Kind of a directory entry as far as the host is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Symlink,
    RegularFile,
}

impl FileKind {
    fn type_bits(self) -> u32 {
        match self {
            FileKind::Directory => S_IFDIR,
            FileKind::Symlink => S_IFLNK,
            FileKind::RegularFile => S_IFREG,
        }
    }
}

/// Attributes of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    /// Permission bits combined with the file-type bits.
    pub mode: u32,
    pub size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    /// Always equal to `mtime`.
    pub ctime: SystemTime,
    pub birthtime: SystemTime,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

impl FileStat {
    /// Builds the reported attributes from (non-following) metadata.
    ///
    /// Anything that is neither a directory nor a symlink is reported as a
    /// regular file. Times the platform cannot supply fall back to `mtime`.
    pub fn from_metadata(meta: &Metadata) -> Self {
        let file_type = meta.file_type();
        let kind = if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_symlink() {
            FileKind::Symlink
        } else {
            FileKind::RegularFile
        };

        let mtime = meta.modified().unwrap_or(UNIX_EPOCH);
        Self {
            kind,
            mode: permission_bits(meta, kind) | kind.type_bits(),
            size: meta.len(),
            atime: meta.accessed().unwrap_or(mtime),
            mtime,
            ctime: mtime,
            birthtime: meta.created().unwrap_or(mtime),
            nlink: 1,
            uid: 0,
            gid: 0,
        }
    }

    pub fn perm(&self) -> u32 {
        self.mode & PERM_MASK
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata, _kind: FileKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & PERM_MASK
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata, kind: FileKind) -> u32 {
    let writable = !meta.permissions().readonly();
    match (kind, writable) {
        (FileKind::Directory, true) => 0o777,
        (FileKind::Directory, false) => 0o555,
        (_, true) => 0o666,
        (_, false) => 0o444,
    }
}

/// Volume statistics reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub bsize: u32,
    pub frsize: u32,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub namemax: u32,
}

impl StatFs {
    /// Expresses byte counts in `block_size` units. A zero block size
    /// counts as 1.
    pub fn from_disk_space(space: DiskSpace, block_size: u32, name_max: u32) -> Self {
        let block_size = block_size.max(1);
        let bs = u64::from(block_size);
        Self {
            bsize: block_size,
            frsize: block_size,
            blocks: space.total / bs,
            bfree: space.free / bs,
            bavail: space.available / bs,
            namemax: name_max,
        }
    }
}
