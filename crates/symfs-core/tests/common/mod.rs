//! Common test utilities for symfs-core integration tests.

pub mod harness;

pub use harness::{
    access_denied, encode_records, flush_unsupported, io_failure, Faults, RecordingHost,
    ScriptedFs, ScriptedSource, TestMount,
};
