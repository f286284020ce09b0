//! The passthrough operation surface dispatched into by the host.
//!
//! Every operation resolves its virtual path under the mirrored root and
//! delegates to one OS primitive. Nothing is cached: attributes, listings
//! and data always come straight from the real directory, and the watcher
//! tells the host when its own caches go stale.

use crate::attr::{FileStat, StatFs};
use crate::config::SymfsConfig;
use crate::error::{FsError, FsResult};
use crate::io;
use crate::native::{NativeFs, StdFs};
use crate::notification::NotifyHost;
use crate::open::{acquire, AccessMode, OpenIntent};
use crate::path::PathResolver;
use crate::source::{open_platform_source, ChangeSource};
use crate::watcher::{WatchError, WatchTask};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// A passthrough file system mirroring one real directory.
///
/// Handles returned by [`SymFs::open`] and [`SymFs::create`] belong to the
/// caller, who passes them back by reference for I/O and by value to
/// [`SymFs::release`].
pub struct SymFs<N: NativeFs = StdFs> {
    resolver: PathResolver,
    native: N,
    config: SymfsConfig,
    watcher: Mutex<Option<WatchTask>>,
}

impl SymFs<StdFs> {
    /// Mirrors `root` through the standard native backend.
    pub fn new(root: impl Into<PathBuf>, config: SymfsConfig) -> Self {
        Self::with_native(root, StdFs, config)
    }
}

impl<N: NativeFs> SymFs<N> {
    /// Mirrors `root` through a custom native backend.
    pub fn with_native(root: impl Into<PathBuf>, native: N, config: SymfsConfig) -> Self {
        Self {
            resolver: PathResolver::new(root),
            native,
            config,
            watcher: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// The native backend operations are delegated to.
    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn config(&self) -> &SymfsConfig {
        &self.config
    }

    /// The real path backing a virtual path.
    pub fn real_path(&self, path: &str) -> PathBuf {
        self.resolver.resolve(path)
    }

    // ==================== Lifecycle ====================

    /// Mount-time initialisation: starts the change watcher when enabled.
    ///
    /// A watcher that cannot start is logged and the mount carries on
    /// without live invalidation.
    pub fn init(&self, host: Arc<dyn NotifyHost>) {
        if !self.config.watch {
            info!("Change watcher disabled by configuration");
            return;
        }
        if let Err(e) = self.start_watcher(host) {
            warn!(error = %e, "Change watcher not started");
        }
    }

    /// Starts the watcher on the platform change source for the root.
    pub fn start_watcher(&self, host: Arc<dyn NotifyHost>) -> Result<(), WatchError> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Err(WatchError::AlreadyStarted);
        }
        let root = self.resolver.root();
        let source = open_platform_source(root).map_err(|source| WatchError::Source {
            root: root.display().to_string(),
            source,
        })?;
        *slot = Some(WatchTask::spawn(source, host, self.config.watch_buffer_size)?);
        info!(root = %root.display(), "Change watcher started");
        Ok(())
    }

    /// Starts the watcher on a caller-supplied change source.
    pub fn start_watcher_with<S>(&self, source: S, host: Arc<dyn NotifyHost>) -> Result<(), WatchError>
    where
        S: ChangeSource + 'static,
    {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Err(WatchError::AlreadyStarted);
        }
        *slot = Some(WatchTask::spawn(source, host, self.config.watch_buffer_size)?);
        Ok(())
    }

    /// Whether a watcher was started and its loop is still running.
    pub fn watcher_running(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Unmount-time teardown: closes the watcher's change source and waits
    /// for the watch loop to end.
    pub fn destroy(&self) {
        let task = self.watcher.lock().take();
        if let Some(task) = task {
            match task.stop() {
                Some(exit) => debug!(?exit, "Change watcher stopped"),
                None => warn!("Change watcher thread panicked"),
            }
        }
    }

    // ==================== File handles ====================

    /// Opens an existing file with POSIX open flags.
    pub fn open(&self, path: &str, flags: i32) -> FsResult<N::Handle> {
        trace!(path, flags, "open");
        self.open_with(path, &OpenIntent::from_flags(flags, 0))
    }

    /// Opens a file and truncates it, creating it with `mode` if missing.
    pub fn create(&self, path: &str, flags: i32, mode: u32) -> FsResult<N::Handle> {
        trace!(path, flags, mode, "create");
        self.open_with(
            path,
            &OpenIntent::from_flags(flags | libc::O_CREAT | libc::O_TRUNC, mode),
        )
    }

    /// Opens a file from an already decoded intent.
    pub fn open_with(&self, path: &str, intent: &OpenIntent) -> FsResult<N::Handle> {
        acquire(&self.native, &self.real_path(path), intent)
    }

    pub fn read(&self, handle: &N::Handle, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        io::read(handle, buf, offset)
    }

    pub fn write(&self, handle: &N::Handle, buf: &[u8], offset: u64) -> FsResult<usize> {
        io::write(handle, buf, offset)
    }

    pub fn flush(&self, handle: &N::Handle) -> FsResult<()> {
        io::flush(handle)
    }

    pub fn fsync(&self, handle: &N::Handle) -> FsResult<()> {
        io::fsync(handle)
    }

    pub fn release(&self, handle: N::Handle) -> FsResult<()> {
        io::release(handle)
    }

    /// Sets a file's length through `handle` if given, by path otherwise.
    pub fn truncate(&self, path: &str, size: u64, handle: Option<&N::Handle>) -> FsResult<()> {
        trace!(path, size, by_handle = handle.is_some(), "truncate");
        io::truncate(&self.native, &self.real_path(path), size, handle)
    }

    // ==================== Attributes ====================

    /// Attributes of the entry itself; symlinks are not followed.
    pub fn getattr(&self, path: &str) -> FsResult<FileStat> {
        let meta = std::fs::symlink_metadata(self.real_path(path))?;
        Ok(FileStat::from_metadata(&meta))
    }

    pub fn statfs(&self, path: &str) -> FsResult<StatFs> {
        let space = self.native.disk_space(&self.real_path(path))?;
        Ok(StatFs::from_disk_space(
            space,
            self.config.block_size,
            self.config.name_max,
        ))
    }

    pub fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        trace!(path, mode, "chmod");
        set_mode(&self.real_path(path), mode)
    }

    /// Ownership is fixed; changing it is not supported.
    pub fn chown(&self, _path: &str, _uid: u32, _gid: u32) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    /// Sets access and modification times, following symlinks.
    pub fn utimens(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        filetime::set_file_times(
            self.real_path(path),
            filetime::FileTime::from_system_time(atime),
            filetime::FileTime::from_system_time(mtime),
        )?;
        Ok(())
    }

    /// Existence check only; the mask is not evaluated.
    pub fn access(&self, path: &str, _mask: u32) -> FsResult<()> {
        std::fs::metadata(self.real_path(path))?;
        Ok(())
    }

    // ==================== Namespace ====================

    /// Creates an empty regular file; fails if the path exists.
    pub fn mknod(&self, path: &str, mode: u32) -> FsResult<()> {
        trace!(path, "mknod");
        let intent = OpenIntent::new(AccessMode::WriteOnly)
            .create(true)
            .exclusive(true)
            .mode(mode);
        let handle = self.open_with(path, &intent)?;
        io::release(handle)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        trace!(path, "mkdir");
        create_dir(&self.real_path(path), mode)
    }

    pub fn unlink(&self, path: &str) -> FsResult<()> {
        trace!(path, "unlink");
        Ok(std::fs::remove_file(self.real_path(path))?)
    }

    pub fn rmdir(&self, path: &str) -> FsResult<()> {
        trace!(path, "rmdir");
        Ok(std::fs::remove_dir(self.real_path(path))?)
    }

    pub fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        trace!(from, to, "rename");
        Ok(std::fs::rename(self.real_path(from), self.real_path(to))?)
    }

    pub fn link(&self, existing: &str, new: &str) -> FsResult<()> {
        Ok(std::fs::hard_link(
            self.real_path(existing),
            self.real_path(new),
        )?)
    }

    /// Creates a symlink at `new` whose target is stored verbatim.
    pub fn symlink(&self, target: &str, new: &str) -> FsResult<()> {
        create_symlink(Path::new(target), &self.real_path(new))
    }

    pub fn readlink(&self, path: &str) -> FsResult<PathBuf> {
        Ok(std::fs::read_link(self.real_path(path))?)
    }

    // ==================== Directories ====================

    /// Checks that `path` is a directory. No state is kept.
    pub fn opendir(&self, path: &str) -> FsResult<()> {
        let meta = std::fs::metadata(self.real_path(path))?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(())
    }

    /// Lists `path`: `.` and `..` first, then every entry name until
    /// `filler` returns false.
    pub fn readdir<F>(&self, path: &str, mut filler: F) -> FsResult<()>
    where
        F: FnMut(&str) -> bool,
    {
        let names = std::fs::read_dir(self.real_path(path))?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(path, entries = names.len(), "readdir");

        filler(".");
        filler("..");
        for name in &names {
            if !filler(name) {
                break;
            }
        }
        Ok(())
    }

    pub fn releasedir(&self, _path: &str) -> FsResult<()> {
        Ok(())
    }

    pub fn fsyncdir(&self, _path: &str, _datasync: bool) -> FsResult<()> {
        Ok(())
    }

    // ==================== Extended attributes ====================

    pub fn setxattr(&self, _path: &str, _name: &str, _value: &[u8], _flags: i32) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    pub fn getxattr(&self, _path: &str, _name: &str) -> FsResult<Vec<u8>> {
        Err(FsError::Unsupported)
    }

    pub fn removexattr(&self, _path: &str, _name: &str) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    pub fn listxattr<F>(&self, _path: &str, _filler: F) -> FsResult<()>
    where
        F: FnMut(&str) -> bool,
    {
        Err(FsError::Unsupported)
    }
}

#[cfg(unix)]
fn create_dir(path: &Path, mode: u32) -> FsResult<()> {
    use std::os::unix::fs::DirBuilderExt;
    Ok(std::fs::DirBuilder::new().mode(mode).create(path)?)
}

#[cfg(windows)]
fn create_dir(path: &Path, _mode: u32) -> FsResult<()> {
    Ok(std::fs::create_dir(path)?)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> FsResult<()> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::set_permissions(
        path,
        std::fs::Permissions::from_mode(mode),
    )?)
}

// Only the owner-write bit has a native counterpart (the read-only attribute).
#[cfg(windows)]
fn set_mode(path: &Path, mode: u32) -> FsResult<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    Ok(std::fs::set_permissions(path, perms)?)
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> FsResult<()> {
    Ok(std::os::unix::fs::symlink(target, link)?)
}

// Windows needs to know up front whether the target is a directory.
#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> FsResult<()> {
    let resolved = match link.parent() {
        Some(dir) if target.is_relative() => dir.join(target),
        _ => target.to_path_buf(),
    };
    if resolved.is_dir() {
        Ok(std::os::windows::fs::symlink_dir(target, link)?)
    } else {
        Ok(std::os::windows::fs::symlink_file(target, link)?)
    }
}
