//! Native change sources feeding the watcher.
//!
//! A [`ChangeSource`] blocks until the OS reports changes under the
//! mirrored root and fills the caller's buffer with records in the layout
//! decoded by [`crate::changes`]. A successful read of zero bytes means the
//! OS dropped events (buffer overflow) and the consumer must assume
//! anything changed.
//!
//! - Windows: `ReadDirectoryChangesW` on a directory handle, which already
//!   produces the record layout.
//! - Elsewhere: the `notify` crate's recommended watcher, with events
//!   re-encoded by [`RecordWriter`](crate::changes::RecordWriter).
//!
//! Teardown goes through a [`SourceCloser`] taken before the source moves
//! onto the watcher thread: closing it invalidates the watch, and the
//! blocked read returns an error.

use std::fmt;
use std::io;
use std::path::Path;

/// Blocking producer of raw change buffers.
pub trait ChangeSource: Send {
    /// Waits for changes and writes records into `buf`.
    ///
    /// Returns the number of bytes written; `Ok(0)` signals overflow. An
    /// error means the watch is gone for good.
    fn read_changes(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Handle that invalidates this source from another thread.
    ///
    /// The default does nothing; such a source only stops by failing on
    /// its own.
    fn closer(&self) -> SourceCloser {
        SourceCloser::noop()
    }
}

/// One-shot teardown of a change source.
pub struct SourceCloser(Option<Box<dyn FnOnce() + Send>>);

impl SourceCloser {
    pub fn new(close: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(close)))
    }

    pub fn noop() -> Self {
        Self(None)
    }

    /// Invalidates the source. Pending and later reads fail.
    pub fn close(mut self) {
        if let Some(close) = self.0.take() {
            close();
        }
    }
}

impl fmt::Debug for SourceCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCloser")
            .field("armed", &self.0.is_some())
            .finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "change source closed")
}

#[cfg(windows)]
pub use windows_impl::DirectoryChangeSource as PlatformChangeSource;

#[cfg(not(windows))]
pub use notify_impl::NotifyChangeSource as PlatformChangeSource;

/// Opens the platform change source for `root`.
pub fn open_platform_source(root: &Path) -> io::Result<PlatformChangeSource> {
    PlatformChangeSource::open(root)
}

/// NUL-terminated UTF-16 form of a path for wide Win32 calls.
#[cfg(windows)]
pub(crate) fn to_wide(path: &Path) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;

    path.as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

#[cfg(windows)]
mod windows_impl {
    use super::{closed_error, to_wide, ChangeSource, SourceCloser};
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tracing::debug;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::Storage::FileSystem::{
        CreateFileW, ReadDirectoryChangesW, FILE_FLAG_BACKUP_SEMANTICS, FILE_LIST_DIRECTORY,
        FILE_NOTIFY_CHANGE_ATTRIBUTES, FILE_NOTIFY_CHANGE_CREATION, FILE_NOTIFY_CHANGE_DIR_NAME,
        FILE_NOTIFY_CHANGE_FILE_NAME, FILE_NOTIFY_CHANGE_LAST_WRITE, FILE_NOTIFY_CHANGE_SECURITY,
        FILE_NOTIFY_CHANGE_SIZE, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
        OPEN_EXISTING,
    };
    use windows_sys::Win32::System::IO::CancelIoEx;

    const FILTER: u32 = FILE_NOTIFY_CHANGE_FILE_NAME
        | FILE_NOTIFY_CHANGE_DIR_NAME
        | FILE_NOTIFY_CHANGE_ATTRIBUTES
        | FILE_NOTIFY_CHANGE_SIZE
        | FILE_NOTIFY_CHANGE_LAST_WRITE
        | FILE_NOTIFY_CHANGE_CREATION
        | FILE_NOTIFY_CHANGE_SECURITY;

    /// Directory handle closed when the last owner drops it.
    struct DirHandle(HANDLE);

    // SAFETY: a kernel handle may be used from any thread; the only
    // cross-thread use is CancelIoEx, which is thread-safe.
    unsafe impl Send for DirHandle {}
    unsafe impl Sync for DirHandle {}

    impl Drop for DirHandle {
        fn drop(&mut self) {
            // SAFETY: the handle came from CreateFileW and is closed once.
            unsafe {
                CloseHandle(self.0);
            }
        }
    }

    /// Recursive `ReadDirectoryChangesW` watch on one directory handle.
    pub struct DirectoryChangeSource {
        handle: Arc<DirHandle>,
        closed: Arc<AtomicBool>,
        // ReadDirectoryChangesW needs a DWORD-aligned buffer
        scratch: Vec<u32>,
    }

    impl DirectoryChangeSource {
        /// Opens `root` for change listening with maximal sharing.
        pub fn open(root: &Path) -> io::Result<Self> {
            let wide = to_wide(root);
            // SAFETY: `wide` is NUL-terminated and outlives the call.
            let handle = unsafe {
                CreateFileW(
                    wide.as_ptr(),
                    FILE_LIST_DIRECTORY,
                    FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                    std::ptr::null(),
                    OPEN_EXISTING,
                    FILE_FLAG_BACKUP_SEMANTICS,
                    std::ptr::null_mut(),
                )
            };
            if handle == INVALID_HANDLE_VALUE {
                return Err(io::Error::last_os_error());
            }
            debug!(root = %root.display(), "Opened directory change handle");
            Ok(Self {
                handle: Arc::new(DirHandle(handle)),
                closed: Arc::new(AtomicBool::new(false)),
                scratch: Vec::new(),
            })
        }
    }

    impl ChangeSource for DirectoryChangeSource {
        fn read_changes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.closed.load(Ordering::Acquire) {
                return Err(closed_error());
            }
            let words = buf.len() / 4;
            self.scratch.resize(words, 0);
            let len = u32::try_from(words * 4).unwrap_or(u32::MAX & !3);
            let mut returned = 0u32;
            // SAFETY: the scratch buffer is live, aligned and `len` bytes
            // long; the call is synchronous (no OVERLAPPED).
            let ok = unsafe {
                ReadDirectoryChangesW(
                    self.handle.0,
                    self.scratch.as_mut_ptr().cast(),
                    len,
                    1,
                    FILTER,
                    &mut returned,
                    std::ptr::null_mut(),
                    None,
                )
            };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(closed_error());
            }

            let n = (returned as usize).min(words * 4);
            for (chunk, word) in buf[..n].chunks_mut(4).zip(&self.scratch) {
                let bytes = word.to_ne_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
            Ok(n)
        }

        fn closer(&self) -> SourceCloser {
            let handle = Arc::clone(&self.handle);
            let closed = Arc::clone(&self.closed);
            SourceCloser::new(move || {
                closed.store(true, Ordering::Release);
                // SAFETY: the handle is kept open by the Arc clone; a null
                // OVERLAPPED cancels every request on it.
                unsafe {
                    CancelIoEx(handle.0, std::ptr::null());
                }
            })
        }
    }
}

#[cfg(not(windows))]
mod notify_impl {
    use super::{closed_error, ChangeSource, SourceCloser};
    use crate::changes::{action, RecordWriter};
    use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
    use notify::event::{EventKind, ModifyKind, RenameMode};
    use notify::{RecommendedWatcher, RecursiveMode, Watcher};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tracing::{debug, warn};

    /// Action code used for events whose nature the backend does not report.
    const UNKNOWN_ACTION: u32 = 0;

    /// Recursive watch through the platform's `notify` backend.
    pub struct NotifyChangeSource {
        // taken and dropped by the closer, which ends the native watch
        watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
        root: PathBuf,
        events: Receiver<notify::Result<notify::Event>>,
        shutdown_tx: Sender<()>,
        shutdown: Receiver<()>,
        closed: bool,
        pending: VecDeque<(u32, String)>,
        overflowed: bool,
    }

    impl NotifyChangeSource {
        /// Starts a recursive watch on `root`.
        pub fn open(root: &Path) -> io::Result<Self> {
            let root = root.canonicalize()?;
            let (tx, events) = crossbeam_channel::unbounded();
            let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                let _ = tx.send(res);
            })
            .map_err(io::Error::other)?;
            watcher
                .watch(&root, RecursiveMode::Recursive)
                .map_err(io::Error::other)?;
            debug!(root = %root.display(), "Started notify watch");

            let (shutdown_tx, shutdown) = crossbeam_channel::bounded(1);
            Ok(Self {
                watcher: Arc::new(Mutex::new(Some(watcher))),
                root,
                events,
                shutdown_tx,
                shutdown,
                closed: false,
                pending: VecDeque::new(),
                overflowed: false,
            })
        }

        fn enqueue(&mut self, res: notify::Result<notify::Event>) {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "notify backend error, assuming lost events");
                    self.overflowed = true;
                    return;
                }
            };
            if event.need_rescan() {
                self.overflowed = true;
                return;
            }

            let code = match event.kind {
                EventKind::Create(_) => action::ADDED,
                EventKind::Remove(_) => action::REMOVED,
                EventKind::Modify(ModifyKind::Name(RenameMode::From)) => action::RENAMED_OLD_NAME,
                EventKind::Modify(ModifyKind::Name(RenameMode::To)) => action::RENAMED_NEW_NAME,
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                    let mut paths = event.paths.iter();
                    if let Some(from) = paths.next() {
                        self.push_path(action::RENAMED_OLD_NAME, from);
                    }
                    for to in paths {
                        self.push_path(action::RENAMED_NEW_NAME, to);
                    }
                    return;
                }
                EventKind::Modify(ModifyKind::Name(_)) | EventKind::Any | EventKind::Other => {
                    UNKNOWN_ACTION
                }
                EventKind::Modify(_) => action::MODIFIED,
                EventKind::Access(_) => return,
            };
            for path in &event.paths {
                self.push_path(code, path);
            }
        }

        fn push_path(&mut self, code: u32, path: &Path) {
            match path.strip_prefix(&self.root) {
                Ok(relative) if !relative.as_os_str().is_empty() => {
                    self.pending
                        .push_back((code, relative.to_string_lossy().into_owned()));
                }
                _ => {}
            }
        }

        fn fill(&mut self) -> io::Result<()> {
            select! {
                recv(self.events) -> first => match first {
                    Ok(res) => self.enqueue(res),
                    Err(_) => return Err(self.disconnected()),
                },
                recv(self.shutdown) -> _ => {
                    self.closed = true;
                    return Err(closed_error());
                }
            }
            loop {
                match self.events.try_recv() {
                    Ok(res) => self.enqueue(res),
                    Err(TryRecvError::Empty) => return Ok(()),
                    Err(TryRecvError::Disconnected) => return Err(self.disconnected()),
                }
            }
        }

        // the closer signals before dropping the watcher, so a pending
        // shutdown explains the disconnect
        fn disconnected(&mut self) -> io::Error {
            if self.shutdown.try_recv().is_ok() {
                self.closed = true;
                closed_error()
            } else {
                io::Error::new(io::ErrorKind::BrokenPipe, "notify watcher disconnected")
            }
        }
    }

    impl ChangeSource for NotifyChangeSource {
        fn read_changes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.closed || self.shutdown.try_recv().is_ok() {
                self.closed = true;
                return Err(closed_error());
            }
            while self.pending.is_empty() && !self.overflowed {
                self.fill()?;
            }
            if self.overflowed {
                self.overflowed = false;
                self.pending.clear();
                return Ok(0);
            }

            let mut writer = RecordWriter::new(buf);
            while let Some((code, name)) = self.pending.front() {
                if !writer.push(*code, name) {
                    break;
                }
                self.pending.pop_front();
            }
            if writer.is_empty() {
                // a single record larger than the whole buffer
                self.pending.pop_front();
                return Ok(0);
            }
            Ok(writer.len())
        }

        fn closer(&self) -> SourceCloser {
            let watcher = Arc::clone(&self.watcher);
            let shutdown = self.shutdown_tx.clone();
            SourceCloser::new(move || {
                let _ = shutdown.try_send(());
                drop(watcher.lock().take());
                debug!("Closed notify watch");
            })
        }
    }
}
