//! Error handling and errno mapping for passthrough operations.
//!
//! Every native call result is translated exactly once, at the boundary,
//! into an [`FsError`]. The host adapter converts it to the negative errno
//! convention with [`FsError::neg_errno`] or [`errno_status`].

use std::io;
use thiserror::Error;

/// Errors returned by passthrough operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path (or a component of it) does not exist.
    #[error("No such file or directory")]
    NotFound,

    /// The OS refused access to the object.
    #[error("Permission denied")]
    PermissionDenied,

    /// The target already exists (exclusive create, mkdir, link).
    #[error("File already exists")]
    AlreadyExists,

    /// A directory operation was attempted on a non-directory.
    #[error("Not a directory")]
    NotADirectory,

    /// The native handle is not usable for this operation.
    #[error("Invalid file handle")]
    InvalidHandle,

    /// Operation not implemented by this file system.
    #[error("Operation not supported")]
    Unsupported,

    /// Any other native failure, carrying the platform error code.
    #[error("Native call failed with code {0}")]
    Native(i32),
}

/// Result type for passthrough operations.
pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Converts this error to a positive libc error code.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::PermissionDenied => libc::EACCES,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::InvalidHandle => libc::EBADF,
            FsError::Unsupported => libc::ENOSYS,
            FsError::Native(code) => native_code_to_errno(*code),
        }
    }

    /// Negative errno as expected by FUSE-style hosts.
    pub fn neg_errno(&self) -> i32 {
        -self.to_errno()
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        io_error_to_fs_error(&e)
    }
}

/// Classifies an [`io::Error`] into the [`FsError`] taxonomy.
pub fn io_error_to_fs_error(e: &io::Error) -> FsError {
    match e.kind() {
        io::ErrorKind::NotFound => FsError::NotFound,
        io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
        io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
        io::ErrorKind::NotADirectory => FsError::NotADirectory,
        io::ErrorKind::Unsupported => FsError::Unsupported,
        _ => match e.raw_os_error() {
            Some(code) if is_bad_handle(code) => FsError::InvalidHandle,
            Some(code) => FsError::Native(code),
            None => FsError::Native(libc::EIO),
        },
    }
}

/// Host status code for an operation result: 0 on success, negative errno otherwise.
pub fn errno_status<T>(result: &FsResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.neg_errno(),
    }
}

#[cfg(unix)]
fn is_bad_handle(code: i32) -> bool {
    code == libc::EBADF
}

#[cfg(windows)]
fn is_bad_handle(code: i32) -> bool {
    code == windows_sys::Win32::Foundation::ERROR_INVALID_HANDLE as i32
}

#[cfg(unix)]
fn native_code_to_errno(code: i32) -> i32 {
    code
}

// Win32 codes have no errno meaning; the host only understands POSIX values.
#[cfg(windows)]
fn native_code_to_errno(code: i32) -> i32 {
    use windows_sys::Win32::Foundation::{
        ERROR_DIR_NOT_EMPTY, ERROR_DISK_FULL, ERROR_HANDLE_DISK_FULL, ERROR_INVALID_NAME,
        ERROR_NOT_SAME_DEVICE, ERROR_SHARING_VIOLATION, ERROR_WRITE_PROTECT,
    };
    match code as u32 {
        ERROR_DIR_NOT_EMPTY => libc::ENOTEMPTY,
        ERROR_DISK_FULL | ERROR_HANDLE_DISK_FULL => libc::ENOSPC,
        ERROR_INVALID_NAME => libc::EINVAL,
        ERROR_NOT_SAME_DEVICE => libc::EXDEV,
        ERROR_SHARING_VIOLATION => libc::EBUSY,
        ERROR_WRITE_PROTECT => libc::EROFS,
        _ => libc::EIO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert!(matches!(
            FsError::from(io::Error::from(io::ErrorKind::NotFound)),
            FsError::NotFound
        ));
        assert!(matches!(
            FsError::from(io::Error::from(io::ErrorKind::PermissionDenied)),
            FsError::PermissionDenied
        ));
        assert!(matches!(
            FsError::from(io::Error::from(io::ErrorKind::AlreadyExists)),
            FsError::AlreadyExists
        ));
        assert!(matches!(
            FsError::from(io::Error::from(io::ErrorKind::Unsupported)),
            FsError::Unsupported
        ));
    }

    #[test]
    fn test_custom_error_without_os_code() {
        let e = FsError::from(io::Error::other("custom error"));
        assert!(matches!(e, FsError::Native(code) if code == libc::EIO));
        assert_eq!(e.to_errno(), libc::EIO);
    }

    #[test]
    fn test_errno_values() {
        assert_eq!(FsError::NotFound.to_errno(), libc::ENOENT);
        assert_eq!(FsError::PermissionDenied.to_errno(), libc::EACCES);
        assert_eq!(FsError::AlreadyExists.to_errno(), libc::EEXIST);
        assert_eq!(FsError::NotADirectory.to_errno(), libc::ENOTDIR);
        assert_eq!(FsError::InvalidHandle.to_errno(), libc::EBADF);
        assert_eq!(FsError::Unsupported.to_errno(), libc::ENOSYS);
    }

    #[test]
    fn test_negative_convention() {
        assert_eq!(FsError::NotFound.neg_errno(), -libc::ENOENT);
        assert_eq!(errno_status(&Ok::<_, FsError>(42)), 0);
        assert_eq!(
            errno_status::<()>(&Err(FsError::AlreadyExists)),
            -libc::EEXIST
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_raw_os_errors_pass_through() {
        let codes = [libc::ENOSPC, libc::EROFS, libc::ENOTEMPTY, libc::EXDEV];
        for code in codes {
            let e = FsError::from(io::Error::from_raw_os_error(code));
            assert_eq!(e.to_errno(), code, "errno {code} should pass through");
        }
        let e = FsError::from(io::Error::from_raw_os_error(libc::EBADF));
        assert!(matches!(e, FsError::InvalidHandle));
        let e = FsError::from(io::Error::from_raw_os_error(libc::ENOTDIR));
        assert!(matches!(e, FsError::NotADirectory));
    }

    #[test]
    fn test_display() {
        assert!(FsError::Native(28).to_string().contains("28"));
        assert_eq!(FsError::Unsupported.to_string(), "Operation not supported");
    }
}
