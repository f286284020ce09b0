//! Test doubles for the native seam, the change source and the host.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use symfs_core::native::DiskSpace;
use symfs_core::{
    ChangeSource, Disposition, NativeFs, NativeHandle, NotifyError, NotifyFlags, NotifyHost,
    OpenParams, RecordWriter, StdFs, StdHandle, SymFs, SymfsConfig,
};
use tempfile::TempDir;

/// A SymFs over a fresh temporary root with the watcher disabled.
pub struct TestMount {
    pub dir: TempDir,
    pub fs: SymFs,
}

impl TestMount {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let fs = SymFs::new(dir.path(), SymfsConfig::default().watch(false));
        Self { dir, fs }
    }

    pub fn real(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    pub fn seed(&self, name: &str, content: &[u8]) {
        std::fs::write(self.real(name), content).expect("failed to seed file");
    }
}

/// Builds the error a scripted native call fails with.
pub type Fault = fn() -> io::Error;

/// Generic native failure; classified as `FsError::Native(EIO)`.
pub fn io_failure() -> io::Error {
    io::Error::other("scripted native failure")
}

pub fn access_denied() -> io::Error {
    io::Error::from(io::ErrorKind::PermissionDenied)
}

/// The platform's "object cannot be flushed" sync failure.
#[cfg(unix)]
pub fn flush_unsupported() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

/// The platform's "object cannot be flushed" sync failure.
#[cfg(windows)]
pub fn flush_unsupported() -> io::Error {
    // ERROR_ACCESS_DENIED
    io::Error::from_raw_os_error(5)
}

/// Native calls that fail instead of reaching [`StdFs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub set_len: Option<Fault>,
    pub sync: Option<Fault>,
    pub close: Option<Fault>,
    /// Opens with `Disposition::TruncateExisting`.
    pub truncating_open: Option<Fault>,
}

impl Faults {
    pub fn set_len(mut self, fault: Fault) -> Self {
        self.set_len = Some(fault);
        self
    }

    pub fn sync(mut self, fault: Fault) -> Self {
        self.sync = Some(fault);
        self
    }

    pub fn close(mut self, fault: Fault) -> Self {
        self.close = Some(fault);
        self
    }

    pub fn truncating_open(mut self, fault: Fault) -> Self {
        self.truncating_open = Some(fault);
        self
    }
}

/// Native backend over [`StdFs`] with scripted failures.
///
/// Every open records its disposition and every close is counted, whether
/// or not it fails.
#[derive(Default)]
pub struct ScriptedFs {
    pub opens: Mutex<Vec<Disposition>>,
    closes: Arc<AtomicUsize>,
    faults: Faults,
}

impl ScriptedFs {
    pub fn new(faults: Faults) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    /// Handles refuse in-place truncation with a permission error.
    pub fn deny_truncate() -> Self {
        Self::new(Faults::default().set_len(access_denied))
    }

    pub fn opens(&self) -> Vec<Disposition> {
        self.opens.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ScriptedHandle {
    inner: StdHandle,
    faults: Faults,
    closes: Arc<AtomicUsize>,
}

impl NativeFs for ScriptedFs {
    type Handle = ScriptedHandle;

    fn open(&self, path: &Path, params: &OpenParams) -> io::Result<ScriptedHandle> {
        self.opens.lock().push(params.disposition);
        if params.disposition == Disposition::TruncateExisting
            && let Some(fault) = self.faults.truncating_open
        {
            return Err(fault());
        }
        Ok(ScriptedHandle {
            inner: StdFs.open(path, params)?,
            faults: self.faults,
            closes: Arc::clone(&self.closes),
        })
    }

    fn disk_space(&self, path: &Path) -> io::Result<DiskSpace> {
        StdFs.disk_space(path)
    }
}

impl NativeHandle for ScriptedHandle {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.inner.read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.inner.write_at(buf, offset)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        match self.faults.set_len {
            Some(fault) => Err(fault()),
            None => self.inner.set_len(len),
        }
    }

    fn sync(&self) -> io::Result<()> {
        match self.faults.sync {
            Some(fault) => Err(fault()),
            None => self.inner.sync(),
        }
    }

    fn close(self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()?;
        match self.faults.close {
            Some(fault) => Err(fault()),
            None => Ok(()),
        }
    }
}

/// Change source replaying canned buffers, then failing.
pub struct ScriptedSource {
    reads: VecDeque<io::Result<Vec<u8>>>,
}

impl ScriptedSource {
    pub fn new(reads: impl IntoIterator<Item = io::Result<Vec<u8>>>) -> Self {
        Self {
            reads: reads.into_iter().collect(),
        }
    }
}

impl ChangeSource for ScriptedSource {
    fn read_changes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            Some(Ok(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "script exhausted")),
        }
    }
}

/// Host that records every notification, optionally refusing from the
/// n-th call on.
#[derive(Default)]
pub struct RecordingHost {
    pub events: Mutex<Vec<(String, NotifyFlags)>>,
    pub refuse_after: Option<usize>,
}

impl RecordingHost {
    pub fn refusing_after(n: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            refuse_after: Some(n),
        }
    }

    pub fn events(&self) -> Vec<(String, NotifyFlags)> {
        self.events.lock().clone()
    }
}

impl NotifyHost for RecordingHost {
    fn notify(&self, path: &str, flags: NotifyFlags) -> Result<(), NotifyError> {
        let mut events = self.events.lock();
        if self.refuse_after.is_some_and(|n| events.len() >= n) {
            return Err(NotifyError {
                path: path.to_string(),
                reason: "host unmounted".to_string(),
            });
        }
        events.push((path.to_string(), flags));
        Ok(())
    }
}

/// Encodes `(action, name)` pairs into one change buffer.
pub fn encode_records(records: &[(u32, &str)]) -> Vec<u8> {
    let mut buf = vec![0u8; 4096];
    let mut writer = RecordWriter::new(&mut buf);
    for (code, name) in records {
        assert!(writer.push(*code, name), "record does not fit");
    }
    let len = writer.len();
    buf.truncate(len);
    buf
}
