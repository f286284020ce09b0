//! Notification dispatch into the virtual file-system host.
//!
//! Each decoded change invalidates the changed entry and, unless it sits
//! directly under the root, its parent directory listing.

use crate::changes::{ChangeAction, ChangeRecord};
use crate::path::{parent, ROOT};
use bitflags::bitflags;
use thiserror::Error;
use tracing::trace;

bitflags! {
    /// Invalidation kinds understood by FUSE-style hosts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NotifyFlags: u32 {
        const MKDIR = 0x0001;
        const RMDIR = 0x0002;
        const CREATE = 0x0004;
        const UNLINK = 0x0008;
        const CHMOD = 0x0010;
        const CHOWN = 0x0020;
        const UTIME = 0x0040;
        const CHFLAGS = 0x0080;
        const TRUNCATE = 0x0100;

        /// An entry appeared (file or directory; the OS does not say which).
        const APPEARED = Self::CREATE.bits() | Self::MKDIR.bits();
        /// An entry disappeared.
        const DISAPPEARED = Self::UNLINK.bits() | Self::RMDIR.bits();
        /// Attributes, size or times changed.
        const CHANGED = Self::CHMOD.bits() | Self::CHOWN.bits() | Self::UTIME.bits() | Self::TRUNCATE.bits();
        /// Nature of the change unknown: invalidate as much as possible.
        const UNKNOWN = Self::CREATE.bits() | Self::UNLINK.bits() | Self::TRUNCATE.bits();
    }
}

/// The host refused a notification; the watch is considered dead.
#[derive(Debug, Error)]
#[error("host notification failed for {path}: {reason}")]
pub struct NotifyError {
    pub path: String,
    pub reason: String,
}

/// The virtual file-system host's invalidation callback.
pub trait NotifyHost: Send + Sync {
    /// Invalidates cached state for `path`.
    fn notify(&self, path: &str, flags: NotifyFlags) -> Result<(), NotifyError>;
}

/// Notification mask for a change action.
pub fn flags_for(action: ChangeAction) -> NotifyFlags {
    match action {
        ChangeAction::Created | ChangeAction::RenamedTo => NotifyFlags::APPEARED,
        ChangeAction::Removed | ChangeAction::RenamedFrom => NotifyFlags::DISAPPEARED,
        ChangeAction::Modified => NotifyFlags::CHANGED,
        ChangeAction::Unknown(_) => NotifyFlags::UNKNOWN,
    }
}

/// Notifies the changed path and, unless it is the root, its parent.
pub fn dispatch<H: NotifyHost + ?Sized>(host: &H, record: &ChangeRecord) -> Result<(), NotifyError> {
    let flags = flags_for(record.action);
    trace!(path = %record.path, ?flags, "notify");
    host.notify(&record.path, flags)?;

    let dir = parent(&record.path);
    if dir != ROOT {
        host.notify(dir, flags)?;
    }
    Ok(())
}
