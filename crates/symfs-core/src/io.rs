//! Positioned I/O on open native handles.

use crate::error::{FsError, FsResult};
use crate::native::{
    is_flush_unsupported, Access, Disposition, NativeFs, NativeHandle, OpenParams, ShareMode,
};
use std::io;
use std::path::Path;
use tracing::{debug, trace};

/// Reads into `buf` at `offset` with a single native call.
///
/// End of file is not an error: the count may be short or zero.
pub fn read<H: NativeHandle>(handle: &H, buf: &mut [u8], offset: u64) -> FsResult<usize> {
    match handle.read_at(buf, offset) {
        Ok(n) => {
            trace!(offset, len = buf.len(), n, "read");
            Ok(n)
        }
        Err(e) if is_eof(&e) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Writes `buf` at `offset` with a single native call.
pub fn write<H: NativeHandle>(handle: &H, buf: &[u8], offset: u64) -> FsResult<usize> {
    let n = handle.write_at(buf, offset)?;
    trace!(offset, len = buf.len(), n, "write");
    Ok(n)
}

/// Flushes buffered data on close of a host file descriptor.
///
/// Always succeeds; failures are logged and left for [`fsync`] to report.
pub fn flush<H: NativeHandle>(handle: &H) -> FsResult<()> {
    if let Err(e) = handle.sync() {
        debug!(error = %e, "flush failed, ignoring");
    }
    Ok(())
}

/// Forces the handle's data to stable storage.
///
/// Objects that cannot be flushed at all (directories, special files)
/// report success; every other failure propagates.
pub fn fsync<H: NativeHandle>(handle: &H) -> FsResult<()> {
    match handle.sync() {
        Ok(()) => Ok(()),
        Err(e) if is_flush_unsupported(&e) => {
            debug!(error = %e, "fsync unsupported on this object, treating as success");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Sets the file length, on the open handle when one is supplied and on
/// `real_path` otherwise. The path case opens a short-lived write handle
/// through `native`.
pub fn truncate<N: NativeFs>(
    native: &N,
    real_path: &Path,
    size: u64,
    handle: Option<&N::Handle>,
) -> FsResult<()> {
    if let Some(h) = handle {
        return Ok(h.set_len(size)?);
    }
    let params = OpenParams {
        access: Access::WRITE,
        share: ShareMode::all(),
        disposition: Disposition::OpenExisting,
        mode: 0,
    };
    let h = native.open(real_path, &params)?;
    match h.set_len(size) {
        Ok(()) => Ok(h.close()?),
        Err(e) => {
            let _ = h.close();
            Err(e.into())
        }
    }
}

/// Closes the handle. Ownership guarantees this happens once.
pub fn release<H: NativeHandle>(handle: H) -> FsResult<()> {
    handle.close().map_err(FsError::from)
}

#[cfg(windows)]
fn is_eof(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::UnexpectedEof
        || e.raw_os_error() == Some(windows_sys::Win32::Foundation::ERROR_HANDLE_EOF as i32)
}

#[cfg(not(windows))]
fn is_eof(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::UnexpectedEof
}
