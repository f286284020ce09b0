//! Fuzz target for the change-record buffer decoder
//!
//! Arbitrary bytes stand in for a buffer filled by the OS. Decoding must
//! terminate without panicking, and every yielded path must be absolute.

#![no_main]

use libfuzzer_sys::fuzz_target;
use symfs_core::ChangeDecoder;

fuzz_target!(|data: &[u8]| {
    // Limit input size to the largest buffer a watcher would hand out
    if data.len() > 1024 * 1024 {
        return;
    }

    let mut records = 0usize;
    for item in ChangeDecoder::new(data) {
        match item {
            Ok(record) => {
                assert!(record.path.starts_with('/'));
                records += 1;
            }
            Err(_) => break,
        }
    }
    // each yielded record consumes at least one header
    assert!(records <= data.len() / 12 + 1);
});
