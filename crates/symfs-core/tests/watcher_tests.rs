//! Change decoding and dispatch through the watch loop.

mod common;

use common::{encode_records, RecordingHost, ScriptedSource, TestMount};
use std::io;
use std::sync::Arc;
use symfs_core::changes::action;
use symfs_core::watcher::run;
use symfs_core::{NotifyFlags, SymfsConfig, WatchError, WatchExit};

fn event(path: &str, flags: NotifyFlags) -> (String, NotifyFlags) {
    (path.to_string(), flags)
}

#[test]
fn test_records_dispatch_in_order_with_parents() {
    let buf = encode_records(&[
        (action::ADDED, "a.txt"),
        (action::MODIFIED, "docs/b.txt"),
        (action::REMOVED, "docs/old/c.txt"),
    ]);
    let host = RecordingHost::default();

    let exit = run(ScriptedSource::new([Ok(buf)]), &host, 16384);

    assert_eq!(exit, WatchExit::SourceFailed);
    assert_eq!(
        host.events(),
        vec![
            event("/a.txt", NotifyFlags::CREATE | NotifyFlags::MKDIR),
            event("/docs/b.txt", NotifyFlags::CHANGED),
            event("/docs", NotifyFlags::CHANGED),
            event("/docs/old/c.txt", NotifyFlags::UNLINK | NotifyFlags::RMDIR),
            event("/docs/old", NotifyFlags::UNLINK | NotifyFlags::RMDIR),
        ]
    );
}

#[test]
fn test_rename_pair() {
    let buf = encode_records(&[
        (action::RENAMED_OLD_NAME, "dir/before"),
        (action::RENAMED_NEW_NAME, "dir/after"),
    ]);
    let host = RecordingHost::default();

    run(ScriptedSource::new([Ok(buf)]), &host, 16384);

    let events = host.events();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], event("/dir/before", NotifyFlags::DISAPPEARED));
    assert_eq!(events[2], event("/dir/after", NotifyFlags::APPEARED));
}

#[test]
fn test_empty_name_yields_nothing() {
    let buf = encode_records(&[(action::ADDED, "")]);
    let host = RecordingHost::default();

    run(ScriptedSource::new([Ok(buf)]), &host, 16384);

    assert!(host.events().is_empty());
}

#[test]
fn test_unknown_action_uses_conservative_union() {
    let buf = encode_records(&[(42, "mystery")]);
    let host = RecordingHost::default();

    run(ScriptedSource::new([Ok(buf)]), &host, 16384);

    assert_eq!(
        host.events(),
        vec![event(
            "/mystery",
            NotifyFlags::CREATE | NotifyFlags::UNLINK | NotifyFlags::TRUNCATE
        )]
    );
}

#[test]
fn test_overflow_invalidates_root_and_continues() {
    let host = RecordingHost::default();
    let source = ScriptedSource::new([
        Ok(Vec::new()),
        Ok(encode_records(&[(action::ADDED, "after-overflow")])),
    ]);

    run(source, &host, 16384);

    assert_eq!(
        host.events(),
        vec![
            event("/", NotifyFlags::UNKNOWN),
            event("/after-overflow", NotifyFlags::APPEARED),
        ]
    );
}

#[test]
fn test_malformed_buffer_skipped_then_next_read_processed() {
    let mut bad = encode_records(&[(action::ADDED, "good"), (action::ADDED, "cut-short")]);
    bad.truncate(bad.len() - 6);
    let host = RecordingHost::default();
    let source = ScriptedSource::new([
        Ok(bad),
        Ok(encode_records(&[(action::REMOVED, "later")])),
    ]);

    run(source, &host, 16384);

    assert_eq!(
        host.events(),
        vec![
            event("/good", NotifyFlags::APPEARED),
            event("/later", NotifyFlags::DISAPPEARED),
        ]
    );
}

#[test]
fn test_host_refusal_ends_watch() {
    let host = RecordingHost::refusing_after(1);
    let source = ScriptedSource::new([
        Ok(encode_records(&[(action::MODIFIED, "x/y")])),
        Ok(encode_records(&[(action::MODIFIED, "never")])),
    ]);

    let exit = run(source, &host, 16384);

    assert_eq!(exit, WatchExit::HostRefused);
    assert_eq!(host.events(), vec![event("/x/y", NotifyFlags::CHANGED)]);
}

#[test]
fn test_source_error_ends_watch_silently() {
    let host = RecordingHost::default();
    let source = ScriptedSource::new([Err(io::Error::other("handle closed"))]);

    assert_eq!(run(source, &host, 16384), WatchExit::SourceFailed);
    assert!(host.events().is_empty());
}

#[test]
fn test_mount_starts_watcher_once() {
    let mount = TestMount::new();
    let host = Arc::new(RecordingHost::default());
    let source = ScriptedSource::new([Ok(encode_records(&[(action::ADDED, "f")]))]);

    mount.fs.start_watcher_with(source, host.clone()).unwrap();
    let second = mount
        .fs
        .start_watcher_with(ScriptedSource::new([]), host.clone());
    assert!(matches!(second, Err(WatchError::AlreadyStarted)));

    // the scripted source fails after one buffer, ending the loop
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while mount.fs.watcher_running() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert!(!mount.fs.watcher_running());
    assert_eq!(host.events(), vec![event("/f", NotifyFlags::APPEARED)]);
    mount.fs.destroy();
}

#[cfg(not(windows))]
#[test]
fn test_destroy_ends_live_watch() {
    use std::time::{Duration, Instant};

    let mount = TestMount::new();
    let host = Arc::new(RecordingHost::default());
    mount.fs.start_watcher(host.clone()).unwrap();

    // wait until the native watch is delivering events
    let deadline = Instant::now() + Duration::from_secs(10);
    mount.seed("before.txt", b"x");
    while !host.events().iter().any(|(path, _)| path == "/before.txt") {
        assert!(Instant::now() < deadline, "watch never delivered an event");
        std::thread::sleep(Duration::from_millis(20));
    }

    mount.fs.destroy();
    assert!(!mount.fs.watcher_running());
    let seen = host.events().len();

    mount.seed("after-destroy.txt", b"y");
    std::thread::sleep(Duration::from_millis(500));

    assert_eq!(host.events().len(), seen);
    assert!(
        !host
            .events()
            .iter()
            .any(|(path, _)| path == "/after-destroy.txt")
    );
}

#[test]
fn test_smallest_buffer_still_carries_records() {
    let size = SymfsConfig::default().watch_buffer_size(0).watch_buffer_size;
    let host = RecordingHost::default();

    run(
        ScriptedSource::new([Ok(encode_records(&[(action::ADDED, "a")]))]),
        &host,
        size,
    );

    assert_eq!(host.events(), vec![event("/a", NotifyFlags::APPEARED)]);
}
