//! Passthrough file-system core for SymFS.
//!
//! This crate mirrors an existing directory tree through a virtual
//! file-system host (FUSE, WinFsp) and pushes live change notifications
//! back into the host, so changes made outside the mount show up inside it.
//!
//! # Features
//!
//! - Open/create intents translated to native access rights, sharing and
//!   creation disposition, with a reopen fallback for denied truncation
//! - Positioned I/O straight on native handles; no caching, no handle table
//! - Decoding of the OS change-record buffer and per-path invalidation of
//!   the changed entry and its parent directory
//! - Overflow detection that invalidates the whole mount
//! - One background watcher per mount (`ReadDirectoryChangesW` on Windows,
//!   the `notify` crate elsewhere)
//!
//! # Usage
//!
//! ```ignore
//! use symfs_core::{SymFs, SymfsConfig};
//!
//! let fs = SymFs::new("/srv/data", SymfsConfig::default());
//! fs.init(host);
//! let handle = fs.open("/docs/readme.txt", libc::O_RDONLY)?;
//! ```

pub mod attr;
pub mod changes;
pub mod config;
pub mod error;
pub mod fs;
pub mod io;
pub mod native;
pub mod notification;
pub mod open;
pub mod path;
pub mod source;
pub mod watcher;

pub use attr::{FileKind, FileStat, StatFs};
pub use changes::{ChangeAction, ChangeDecoder, ChangeRecord, DecodeError, RecordWriter};
pub use config::{ConfigError, SymfsConfig};
pub use error::{errno_status, FsError, FsResult};
pub use fs::SymFs;
pub use native::{Access, Disposition, NativeFs, NativeHandle, OpenParams, ShareMode, StdFs, StdHandle};
pub use notification::{dispatch, flags_for, NotifyError, NotifyFlags, NotifyHost};
pub use open::{acquire, derive_params, AccessMode, OpenIntent, OpenPlan};
pub use path::{PathResolver, ROOT};
pub use source::{open_platform_source, ChangeSource, PlatformChangeSource, SourceCloser};
pub use watcher::{WatchError, WatchExit, WatchTask, DEFAULT_BUFFER_SIZE};
