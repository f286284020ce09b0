//! The native file-system seam.
//!
//! [`NativeFs`] and [`NativeHandle`] are the only places the core touches
//! OS handles. [`StdFs`] is the production backend over `std::fs`, with the
//! platform extensions needed to honour access rights, sharing modes and
//! creation dispositions. Tests substitute scripted backends.

use bitflags::bitflags;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

bitflags! {
    /// Access rights requested from the native open call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u32 {
        /// Read data.
        const READ = 1;
        /// Write data at caller-chosen positions.
        const WRITE = 1 << 1;
        /// Write data at end of file only; the OS manages the position.
        const APPEND = 1 << 2;
    }
}

bitflags! {
    /// Concurrent access granted to other openers of the same object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShareMode: u32 {
        /// Others may read.
        const READ = 1;
        /// Others may write.
        const WRITE = 1 << 1;
        /// Others may delete or rename.
        const DELETE = 1 << 2;
    }
}

/// What the native open call does depending on whether the target exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Create; fail if the target exists.
    CreateNew,
    /// Create, or truncate an existing target.
    CreateAlways,
    /// Open, creating the target if missing.
    OpenAlways,
    /// Open; fail if the target is missing.
    OpenExisting,
    /// Open and truncate; fail if the target is missing.
    TruncateExisting,
}

/// Fully derived parameters for one native open call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenParams {
    /// Rights requested on the handle.
    pub access: Access,
    /// Sharing granted to concurrent openers.
    pub share: ShareMode,
    /// Behaviour depending on whether the target exists.
    pub disposition: Disposition,
    /// Permission bits applied when the call creates the file.
    pub mode: u32,
}

/// Disk usage figures in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskSpace {
    pub total: u64,
    pub free: u64,
    /// Free space available to the calling user.
    pub available: u64,
}

/// Native calls the handle engine and I/O executor are built on.
pub trait NativeFs: Send + Sync {
    /// The OS handle type produced by [`NativeFs::open`].
    type Handle: NativeHandle;

    /// Issues one native open/create call.
    fn open(&self, path: &Path, params: &OpenParams) -> io::Result<Self::Handle>;

    /// Queries disk usage for the volume holding `path`.
    fn disk_space(&self, path: &Path) -> io::Result<DiskSpace>;
}

/// An open native file handle.
///
/// Exclusively owned; [`NativeHandle::close`] consumes it so a handle can
/// only be released once.
pub trait NativeHandle: Send + Sync {
    /// Single positioned read. Returns 0 at end of file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Single positioned write.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Sets the file length.
    fn set_len(&self, len: u64) -> io::Result<()>;

    /// Forces buffered data to stable storage.
    fn sync(&self) -> io::Result<()>;

    /// Releases the handle.
    fn close(self) -> io::Result<()>;
}

/// Whether a truncation failure is the OS refusing the operation, as
/// opposed to any other failure. Only this class triggers the reopen
/// fallback in [`crate::open`].
pub fn is_truncate_denied(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::PermissionDenied
}

/// Whether a sync failure means the object cannot be flushed at all
/// (directories, pipes, consoles) rather than a real write-back error.
#[cfg(windows)]
pub fn is_flush_unsupported(e: &io::Error) -> bool {
    e.raw_os_error() == Some(windows_sys::Win32::Foundation::ERROR_ACCESS_DENIED as i32)
}

/// Whether a sync failure means the object cannot be flushed at all
/// (directories, pipes, consoles) rather than a real write-back error.
#[cfg(unix)]
pub fn is_flush_unsupported(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EINVAL | libc::EROFS))
}

/// Native backend over `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

/// A `std::fs::File` used as a native handle.
#[derive(Debug)]
pub struct StdHandle {
    file: File,
}

impl StdHandle {
    /// Wraps an already open file.
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// The underlying file.
    pub fn file(&self) -> &File {
        &self.file
    }
}

impl NativeFs for StdFs {
    type Handle = StdHandle;

    fn open(&self, path: &Path, params: &OpenParams) -> io::Result<StdHandle> {
        let mut opts = OpenOptions::new();
        apply_access(&mut opts, params.access);
        apply_share(&mut opts, params.share);
        apply_disposition(&mut opts, params.disposition, params.mode);
        opts.open(path).map(StdHandle::new)
    }

    fn disk_space(&self, path: &Path) -> io::Result<DiskSpace> {
        query_disk_space(path)
    }
}

impl NativeHandle for StdHandle {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(&self.file, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(&self.file, buf, offset)
    }

    #[cfg(unix)]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(&self.file, buf, offset)
    }

    #[cfg(windows)]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_write(&self.file, buf, offset)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    #[cfg(unix)]
    fn close(self) -> io::Result<()> {
        nix::unistd::close(self.file).map_err(io::Error::from)
    }

    #[cfg(windows)]
    fn close(self) -> io::Result<()> {
        use std::os::windows::io::IntoRawHandle;
        use windows_sys::Win32::Foundation::CloseHandle;

        let handle = self.file.into_raw_handle();
        // SAFETY: ownership of the handle was just released by the File.
        if unsafe { CloseHandle(handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(unix)]
fn apply_access(opts: &mut OpenOptions, access: Access) {
    use std::os::unix::fs::OpenOptionsExt;

    opts.read(access.contains(Access::READ));
    opts.write(access.intersects(Access::WRITE | Access::APPEND));
    // O_APPEND through custom flags so std still accepts truncating dispositions
    if access.contains(Access::APPEND) {
        opts.custom_flags(libc::O_APPEND);
    }
}

#[cfg(windows)]
fn apply_access(opts: &mut OpenOptions, access: Access) {
    use std::os::windows::fs::OpenOptionsExt;
    use windows_sys::Win32::Foundation::{GENERIC_READ, GENERIC_WRITE};
    use windows_sys::Win32::Storage::FileSystem::{FILE_GENERIC_WRITE, FILE_WRITE_DATA};

    let mut mask = 0;
    if access.contains(Access::READ) {
        mask |= GENERIC_READ;
    }
    if access.contains(Access::WRITE) {
        mask |= GENERIC_WRITE;
    }
    if access.contains(Access::APPEND) {
        mask |= FILE_GENERIC_WRITE & !FILE_WRITE_DATA;
    }
    // std validates creation flags against write(); access_mode overrides the mask
    opts.read(access.contains(Access::READ));
    opts.write(access.intersects(Access::WRITE | Access::APPEND));
    opts.access_mode(mask);
}

#[cfg(unix)]
fn apply_share(_opts: &mut OpenOptions, _share: ShareMode) {}

#[cfg(windows)]
fn apply_share(opts: &mut OpenOptions, share: ShareMode) {
    use std::os::windows::fs::OpenOptionsExt;
    use windows_sys::Win32::Storage::FileSystem::{
        FILE_FLAG_BACKUP_SEMANTICS, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
    };

    let mut mode = 0;
    if share.contains(ShareMode::READ) {
        mode |= FILE_SHARE_READ;
    }
    if share.contains(ShareMode::WRITE) {
        mode |= FILE_SHARE_WRITE;
    }
    if share.contains(ShareMode::DELETE) {
        mode |= FILE_SHARE_DELETE;
    }
    opts.share_mode(mode);
    opts.custom_flags(FILE_FLAG_BACKUP_SEMANTICS);
}

fn apply_disposition(opts: &mut OpenOptions, disposition: Disposition, mode: u32) {
    match disposition {
        Disposition::CreateNew => {
            opts.create_new(true);
        }
        Disposition::CreateAlways => {
            opts.create(true).truncate(true);
        }
        Disposition::OpenAlways => {
            opts.create(true);
        }
        Disposition::OpenExisting => {}
        Disposition::TruncateExisting => {
            opts.truncate(true);
        }
    }
    apply_create_mode(opts, disposition, mode);
}

#[cfg(unix)]
fn apply_create_mode(opts: &mut OpenOptions, disposition: Disposition, mode: u32) {
    use std::os::unix::fs::OpenOptionsExt;

    let creates = matches!(
        disposition,
        Disposition::CreateNew | Disposition::CreateAlways | Disposition::OpenAlways
    );
    if creates && mode & 0o7777 != 0 {
        opts.mode(mode & 0o7777);
    }
}

#[cfg(windows)]
fn apply_create_mode(_opts: &mut OpenOptions, _disposition: Disposition, _mode: u32) {}

#[cfg(unix)]
fn query_disk_space(path: &Path) -> io::Result<DiskSpace> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(io::Error::from)?;
    let frsize = u64::from(stat.fragment_size());
    Ok(DiskSpace {
        total: u64::from(stat.blocks()) * frsize,
        free: u64::from(stat.blocks_free()) * frsize,
        available: u64::from(stat.blocks_available()) * frsize,
    })
}

#[cfg(windows)]
fn query_disk_space(path: &Path) -> io::Result<DiskSpace> {
    use windows_sys::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;

    let wide = crate::source::to_wide(path);
    let (mut available, mut total, mut free) = (0u64, 0u64, 0u64);
    // SAFETY: `wide` is NUL-terminated and outlives the call; the out
    // pointers reference live locals.
    let ok = unsafe { GetDiskFreeSpaceExW(wide.as_ptr(), &mut available, &mut total, &mut free) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(DiskSpace {
        total,
        free,
        available,
    })
}
