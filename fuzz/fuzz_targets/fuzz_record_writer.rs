//! Fuzz target for RecordWriter -> ChangeDecoder consistency
//!
//! Whatever the writer accepts, the decoder must read back in order with
//! the same action codes.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use symfs_core::{ChangeAction, ChangeDecoder, RecordWriter};

#[derive(Debug, Arbitrary)]
struct Input {
    buffer_size: u16,
    records: Vec<(u8, String)>,
}

fuzz_target!(|input: Input| {
    let mut buf = vec![0u8; usize::from(input.buffer_size)];
    let mut writer = RecordWriter::new(&mut buf);
    let mut written = Vec::new();
    for (code, name) in &input.records {
        if !writer.push(u32::from(*code), name) {
            break;
        }
        if !name.is_empty() {
            written.push(u32::from(*code));
        }
    }
    let len = writer.len();

    let decoded: Vec<u32> = ChangeDecoder::new(&buf[..len])
        .map(|r| r.expect("writer output must decode").action)
        .map(ChangeAction::code)
        .collect();
    assert_eq!(decoded, written);
});
