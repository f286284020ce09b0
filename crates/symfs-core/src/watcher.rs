//! Background watcher translating native change records into host
//! invalidations.
//!
//! The watcher runs on its own thread for the life of the mount. It never
//! retries: once the change source fails or the host refuses a
//! notification, the thread ends and live invalidation stops while the
//! mount keeps serving requests. Teardown closes the source, which makes
//! the blocked read fail and ends the loop the same way.

use crate::changes::ChangeDecoder;
use crate::notification::{dispatch, NotifyFlags, NotifyHost};
use crate::path::ROOT;
use crate::source::{ChangeSource, SourceCloser};
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Size of the change buffer handed to the native source.
pub const DEFAULT_BUFFER_SIZE: usize = 16384;

/// Error type for watcher startup.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The root could not be opened for change listening
    #[error("failed to open change source for {root}: {source}")]
    Source {
        root: String,
        #[source]
        source: io::Error,
    },

    /// The watcher thread could not be spawned
    #[error("failed to spawn watcher thread: {0}")]
    Spawn(#[source] io::Error),

    /// A watcher is already running for this mount
    #[error("watcher already started")]
    AlreadyStarted,
}

/// Why a watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The change source reported an error.
    SourceFailed,
    /// The host refused a notification.
    HostRefused,
}

/// Handle to a running watcher thread.
///
/// Dropping it closes the change source without waiting for the thread;
/// [`WatchTask::stop`] closes and waits.
#[derive(Debug)]
pub struct WatchTask {
    thread: Option<JoinHandle<WatchExit>>,
    closer: Option<SourceCloser>,
}

impl WatchTask {
    /// Starts the watch loop on a dedicated thread.
    pub fn spawn<S, H>(source: S, host: Arc<H>, buffer_size: usize) -> Result<Self, WatchError>
    where
        S: ChangeSource + 'static,
        H: NotifyHost + ?Sized + 'static,
    {
        let closer = source.closer();
        let thread = std::thread::Builder::new()
            .name("symfs-watcher".into())
            .spawn(move || run(source, &*host, buffer_size))
            .map_err(WatchError::Spawn)?;
        Ok(Self {
            thread: Some(thread),
            closer: Some(closer),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the loop to end on its own. `None` if the thread panicked.
    pub fn join(mut self) -> Option<WatchExit> {
        self.thread.take()?.join().ok()
    }

    /// Closes the change source and waits for the loop to end.
    ///
    /// No notification reaches the host once this returns.
    pub fn stop(mut self) -> Option<WatchExit> {
        if let Some(closer) = self.closer.take() {
            closer.close();
        }
        self.join()
    }
}

impl Drop for WatchTask {
    fn drop(&mut self) {
        if let Some(closer) = self.closer.take() {
            closer.close();
        }
    }
}

/// Runs the watch loop on the current thread until it terminates.
///
/// Per buffer: a zero-length read means the OS dropped events, so the
/// root is invalidated with [`NotifyFlags::UNKNOWN`]; otherwise records are
/// decoded in order and dispatched. A malformed record abandons the rest
/// of that buffer only.
#[instrument(level = "debug", skip_all, fields(buffer_size = buffer_size))]
pub fn run<S, H>(mut source: S, host: &H, buffer_size: usize) -> WatchExit
where
    S: ChangeSource,
    H: NotifyHost + ?Sized,
{
    let mut buf = vec![0u8; buffer_size];
    info!("Watcher started");

    loop {
        let n = match source.read_changes(&mut buf) {
            Ok(n) => n.min(buf.len()),
            Err(e) => {
                debug!(error = %e, "Change source failed, watcher exiting");
                return WatchExit::SourceFailed;
            }
        };

        if n == 0 {
            warn!("Change buffer overflowed, invalidating root");
            if let Err(e) = host.notify(ROOT, NotifyFlags::UNKNOWN) {
                debug!(error = %e, "Host refused root invalidation, watcher exiting");
                return WatchExit::HostRefused;
            }
            continue;
        }

        for record in ChangeDecoder::new(&buf[..n]) {
            match record {
                Ok(record) => {
                    if let Err(e) = dispatch(host, &record) {
                        debug!(error = %e, "Host refused notification, watcher exiting");
                        return WatchExit::HostRefused;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Malformed change buffer, skipping remainder");
                    break;
                }
            }
        }
    }
}
