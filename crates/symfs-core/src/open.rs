//! Handle acquisition: open intents to native open parameters.
//!
//! The host hands over POSIX-style open flags; [`OpenIntent`] captures them
//! and [`derive_params`] picks access rights, sharing and the creation
//! disposition. [`acquire`] issues the native call and, for a plain
//! truncating open, shrinks the file after opening with a reopen fallback
//! when the OS refuses the in-place truncation.

use crate::error::FsResult;
use crate::native::{
    is_truncate_denied, Access, Disposition, NativeFs, NativeHandle, OpenParams, ShareMode,
};
use std::path::Path;
use tracing::debug;

/// Nominal access mode of an open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// An abstract open/create request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenIntent {
    pub access: AccessMode,
    /// Create the file if it is missing.
    pub create: bool,
    /// With `create`: fail if the file already exists.
    pub exclusive: bool,
    /// Truncate to zero length on open.
    pub truncate: bool,
    /// Writes always go to the end of file.
    pub append: bool,
    /// Permission bits, applied only when the file is created.
    pub mode: u32,
}

impl OpenIntent {
    /// A plain open with the given access mode and no flags.
    pub fn new(access: AccessMode) -> Self {
        Self {
            access,
            create: false,
            exclusive: false,
            truncate: false,
            append: false,
            mode: 0,
        }
    }

    /// Decodes POSIX open flags as passed by FUSE hosts.
    pub fn from_flags(flags: i32, mode: u32) -> Self {
        let access = match flags & (libc::O_RDONLY | libc::O_WRONLY | libc::O_RDWR) {
            libc::O_WRONLY => AccessMode::WriteOnly,
            libc::O_RDWR => AccessMode::ReadWrite,
            _ => AccessMode::ReadOnly,
        };
        Self {
            access,
            create: flags & libc::O_CREAT != 0,
            exclusive: flags & libc::O_EXCL != 0,
            truncate: flags & libc::O_TRUNC != 0,
            append: flags & libc::O_APPEND != 0,
            mode,
        }
    }

    #[must_use]
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    #[must_use]
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    #[must_use]
    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    #[must_use]
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// Native parameters for an intent, plus whether the handle must be
/// truncated after it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPlan {
    pub params: OpenParams,
    pub truncate_after_open: bool,
}

/// Derives native open parameters from an intent.
pub fn derive_params(intent: &OpenIntent) -> OpenPlan {
    let mut access = match intent.access {
        AccessMode::ReadOnly => Access::READ,
        AccessMode::WriteOnly => Access::WRITE,
        AccessMode::ReadWrite => Access::READ | Access::WRITE,
    };
    // native creation needs write access whatever the nominal mode
    if intent.create {
        access |= Access::WRITE;
    }
    if intent.append {
        access.remove(Access::WRITE);
        access |= Access::APPEND;
    }

    let (disposition, truncate_after_open) = match intent {
        OpenIntent {
            create: true,
            exclusive: true,
            ..
        } => (Disposition::CreateNew, false),
        OpenIntent {
            create: true,
            truncate: true,
            ..
        } => (Disposition::CreateAlways, false),
        OpenIntent { create: true, .. } => (Disposition::OpenAlways, false),
        OpenIntent { truncate: true, .. } => (Disposition::OpenExisting, true),
        _ => (Disposition::OpenExisting, false),
    };

    OpenPlan {
        params: OpenParams {
            access,
            share: ShareMode::READ | ShareMode::WRITE | ShareMode::DELETE,
            disposition,
            mode: intent.mode,
        },
        truncate_after_open,
    }
}

/// Opens `path` according to `intent`; the caller owns the returned handle.
pub fn acquire<N: NativeFs>(native: &N, path: &Path, intent: &OpenIntent) -> FsResult<N::Handle> {
    let plan = derive_params(intent);
    debug!(path = %path.display(), ?plan, "Opening native handle");

    let handle = native.open(path, &plan.params)?;
    if !plan.truncate_after_open {
        return Ok(handle);
    }

    match handle.set_len(0) {
        Ok(()) => Ok(handle),
        Err(e) if is_truncate_denied(&e) => {
            debug!(path = %path.display(), error = %e, "In-place truncate denied, reopening with truncation");
            // the fallback's result is what the caller sees, not the close
            let _ = handle.close();
            let params = OpenParams {
                disposition: Disposition::TruncateExisting,
                ..plan.params
            };
            Ok(native.open(path, &params)?)
        }
        Err(e) => {
            let _ = handle.close();
            Err(e.into())
        }
    }
}
